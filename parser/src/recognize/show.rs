use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, GrantTarget, ShowIndexesOpts, ShowKind, Statement, StatementDetail};

pub fn try_recognize(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("show") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;

    let kind = if s.eat_keyword("databases") {
        s.skip_ws_and_comments()?;
        let all = s.eat_keyword("all");
        ShowKind::Databases { all }
    } else if s.eat_keyword("tables") {
        s.skip_ws_and_comments()?;
        let schema = if s.eat_keyword("from") || s.eat_keyword("in") {
            s.skip_ws_and_comments()?;
            Some(s.read_identifier()?)
        } else {
            None
        };
        s.skip_ws_and_comments()?;
        let like = if s.eat_keyword("like") {
            s.skip_ws_and_comments()?;
            Some(s.read_identifier()?)
        } else {
            None
        };
        ShowKind::Tables { schema, like }
    } else if s.eat_keyword("columns") || s.eat_keyword("fields") {
        s.skip_ws_and_comments()?;
        let _ = s.eat_keyword("from") || s.eat_keyword("in");
        s.skip_ws_and_comments()?;
        let table = s.read_identifier()?;
        s.skip_ws_and_comments()?;
        let schema = if s.eat_keyword("from") || s.eat_keyword("in") {
            s.skip_ws_and_comments()?;
            Some(s.read_identifier()?)
        } else {
            None
        };
        ShowKind::Columns { table, schema }
    } else if s.eat_keyword("create") {
        s.skip_ws_and_comments()?;
        if s.eat_keyword("table") {
            s.skip_ws_and_comments()?;
            ShowKind::CreateTable { name: s.read_identifier()? }
        } else if s.eat_keyword("index") {
            s.skip_ws_and_comments()?;
            ShowKind::CreateIndex { name: s.read_identifier()? }
        } else {
            return Err(SqliteServerError::parse(s.pos, "expected TABLE or INDEX after SHOW CREATE"));
        }
    } else if s.eat_keyword("grants") {
        s.skip_ws_and_comments()?;
        let target = if s.eat_keyword("for") {
            s.skip_ws_and_comments()?;
            Some(parse_grant_target(&mut s)?)
        } else {
            None
        };
        ShowKind::Grants { target }
    } else if s.eat_keyword("index") || s.eat_keyword("indexes") || s.eat_keyword("keys") {
        parse_show_indexes(&mut s)?
    } else if s.eat_keyword("processlist") {
        ShowKind::ProcessList { full: false }
    } else if s.eat_keyword("full") {
        s.skip_ws_and_comments()?;
        if !s.eat_keyword("processlist") {
            return Err(SqliteServerError::parse(s.pos, "expected PROCESSLIST after SHOW FULL"));
        }
        ShowKind::ProcessList { full: true }
    } else if s.eat_keyword("status") {
        ShowKind::Status
    } else if s.eat_keyword("users") {
        s.skip_ws_and_comments()?;
        let pattern = if s.eat_keyword("where") {
            s.skip_ws_and_comments()?;
            Some(s.read_identifier()?)
        } else {
            None
        };
        ShowKind::Users { pattern }
    } else {
        return Err(SqliteServerError::parse(s.pos, "unrecognized SHOW sub-grammar"));
    };

    Ok(Some(Statement::new(CommandTag::Show, body, StatementDetail::Show { kind })))
}

fn parse_grant_target(s: &mut Scanner) -> Result<GrantTarget, SqliteServerError> {
    match s.peek() {
        Some(b'\'') | Some(b'"') => Ok(GrantTarget::QuotedUser(s.read_identifier()?)),
        _ => {
            if s.eat_keyword("current_user") {
                s.skip_ws_and_comments()?;
                if s.peek() == Some(b'(') {
                    s.advance();
                    s.skip_ws_and_comments()?;
                    if s.peek() != Some(b')') {
                        return Err(SqliteServerError::parse(s.pos, "expected ) after CURRENT_USER("));
                    }
                    s.advance();
                }
                return Ok(GrantTarget::CurrentUser);
            }
            let user = s.read_identifier()?;
            s.skip_ws_and_comments()?;
            if s.peek() == Some(b'@') {
                s.advance();
                s.skip_ws_and_comments()?;
                let host = s.read_identifier()?;
                Ok(GrantTarget::UserHost(user, host))
            } else {
                Ok(GrantTarget::UserHost(user, "%".to_string()))
            }
        }
    }
}

fn parse_show_indexes(s: &mut Scanner) -> Result<ShowKind, SqliteServerError> {
    let mut opts = ShowIndexesOpts::default();
    s.skip_ws_and_comments()?;
    if s.eat_keyword("extended") {
        opts.extended = true;
        s.skip_ws_and_comments()?;
    }
    if s.eat_keyword("columns") {
        opts.columns = true;
        s.skip_ws_and_comments()?;
    }
    if s.eat_keyword("from") || s.eat_keyword("in") {
        s.skip_ws_and_comments()?;
        opts.target = Some(s.read_identifier()?);
        s.skip_ws_and_comments()?;
        if s.peek() == Some(b'.') {
            s.advance();
            s.skip_ws_and_comments()?;
            opts.from_schema = opts.target.take();
            opts.target = Some(s.read_identifier()?);
        } else if s.eat_keyword("from") || s.eat_keyword("in") {
            s.skip_ws_and_comments()?;
            opts.from_schema = Some(s.read_identifier()?);
        }
    }
    s.skip_ws_and_comments()?;
    if s.eat_keyword("where") {
        s.skip_ws_and_comments()?;
        opts.pattern = Some(s.rest().trim_end().to_string());
        return Ok(ShowKind::Indexes(opts));
    }
    Ok(ShowKind::Indexes(opts))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn show_databases_all() {
        let body = "show databases all";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Show { kind: ShowKind::Databases { all: true } });
    }

    #[test]
    fn show_grants_for_current_user_when_no_for_clause() {
        let body = "show grants";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Show { kind: ShowKind::Grants { target: None } });
    }

    #[test]
    fn show_grants_for_user_at_host() {
        let body = "show grants for bob@localhost";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Show { kind: ShowKind::Grants { target: Some(GrantTarget::UserHost(u, h)) } } => {
                assert_eq!(u, "bob");
                assert_eq!(h, "localhost");
            }
            other => panic!("wrong detail: {other:?}"),
        }
    }

    #[test]
    fn show_grants_for_current_user_with_parens() {
        let body = "show grants for current_user()";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Show { kind: ShowKind::Grants { target: Some(GrantTarget::CurrentUser) } });
    }

    #[test]
    fn show_full_processlist() {
        let body = "show full processlist";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Show { kind: ShowKind::ProcessList { full: true } });
    }

    #[test]
    fn show_fields_is_an_alias_for_columns() {
        let body = "show fields from t";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        assert_eq!(
            stmt.detail,
            StatementDetail::Show { kind: ShowKind::Columns { table: "t".to_string(), schema: None } }
        );
    }

    #[test]
    fn show_indexes_extended_columns_sets_both_flags() {
        let body = "show indexes extended columns from t";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Show { kind: ShowKind::Indexes(opts) } => {
                assert!(opts.extended);
                assert!(opts.columns);
                assert_eq!(opts.target, Some("t".to_string()));
            }
            other => panic!("wrong detail: {other:?}"),
        }
    }

    #[test]
    fn show_indexes_columns_without_extended() {
        let body = "show indexes columns from t";
        let s = Scanner::new(body);
        let stmt = try_recognize(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Show { kind: ShowKind::Indexes(opts) } => {
                assert!(!opts.extended);
                assert!(opts.columns);
            }
            other => panic!("wrong detail: {other:?}"),
        }
    }
}
