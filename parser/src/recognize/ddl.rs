use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, DropUserTarget, Privilege, Statement, StatementDetail};

/// Rejects unconsumed trailing input at the end of a fully-structured
/// recognizer — everything in this module's grammar is typed, unlike
/// SELECT's opaque passthrough, so leftover text after a matched form is
/// always a mistake rather than a clause the engine would interpret.
fn expect_eof(s: &mut Scanner) -> Result<(), SqliteServerError> {
    s.skip_ws_and_comments()?;
    if !s.is_eof() {
        return Err(SqliteServerError::parse(s.pos, "unexpected trailing input"));
    }
    Ok(())
}

pub fn try_recognize(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    if let Some(stmt) = try_attach(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_detach(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_database_ddl(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_user_ddl(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_grant_revoke(s, body)? {
        return Ok(Some(stmt));
    }
    Ok(None)
}

fn try_attach(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("attach") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("database");
    s.skip_ws_and_comments()?;
    let path = s.read_identifier()?;
    s.skip_ws_and_comments()?;
    if !s.eat_keyword("as") {
        return Err(SqliteServerError::parse(s.pos, "expected AS in ATTACH"));
    }
    s.skip_ws_and_comments()?;
    let schema = s.read_identifier()?;
    expect_eof(&mut s)?;
    Ok(Some(Statement::new(CommandTag::Attach, body, StatementDetail::Attach { path, schema })))
}

fn try_detach(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("detach") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("database");
    s.skip_ws_and_comments()?;
    let schema = s.read_identifier()?;
    expect_eof(&mut s)?;
    Ok(Some(Statement::new(CommandTag::Detach, body, StatementDetail::Detach { schema })))
}

fn try_database_ddl(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    let create = if s.eat_keyword("create") {
        true
    } else if s.eat_keyword("drop") {
        false
    } else {
        return Ok(None);
    };
    s.skip_ws_and_comments()?;
    if !(s.eat_keyword("database") || s.eat_keyword("schema")) {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;

    let if_exists_or_not = if create {
        s.eat_keyword("if") && {
            s.skip_ws_and_comments()?;
            let _ = s.eat_keyword("not");
            s.skip_ws_and_comments()?;
            s.eat_keyword("exists")
        }
    } else {
        s.eat_keyword("if") && {
            s.skip_ws_and_comments()?;
            s.eat_keyword("exists")
        }
    };
    s.skip_ws_and_comments()?;
    let name = s.read_identifier()?.to_ascii_lowercase();
    s.skip_ws_and_comments()?;

    let location = if create && (s.eat_keyword("location") || s.eat_keyword("directory")) {
        s.skip_ws_and_comments()?;
        Some(s.read_identifier()?)
    } else {
        None
    };
    expect_eof(&mut s)?;

    let tag = if create { CommandTag::CreateDatabase } else { CommandTag::DropDatabase };
    Ok(Some(Statement::new(
        tag,
        body,
        StatementDetail::DatabaseDdl { create, if_exists_or_not, name, location },
    )))
}

fn try_user_ddl(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    let is_create = s.eat_keyword("create");
    let is_alter = !is_create && s.eat_keyword("alter");
    if is_create || is_alter {
        s.skip_ws_and_comments()?;
        if !s.eat_keyword("user") {
            return Ok(None);
        }
        return parse_create_or_alter_user(s, body, is_create);
    }

    let mut s = Scanner::at(s.text, s.pos);
    if s.eat_keyword("drop") {
        s.skip_ws_and_comments()?;
        if !s.eat_keyword("user") {
            return Ok(None);
        }
        return parse_drop_user(s, body);
    }

    Ok(None)
}

fn parse_create_or_alter_user(
    mut s: Scanner,
    body: &str,
    is_create: bool,
) -> Result<Option<Statement>, SqliteServerError> {
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("if") && {
        s.skip_ws_and_comments()?;
        let _ = s.eat_keyword("not");
        s.skip_ws_and_comments()?;
        s.eat_keyword("exists")
    };
    s.skip_ws_and_comments()?;

    let user = s.read_identifier()?;
    s.skip_ws_and_comments()?;
    let host = if s.peek() == Some(b'@') {
        s.advance();
        s.skip_ws_and_comments()?;
        s.read_identifier()?
    } else {
        "%".to_string()
    };
    s.skip_ws_and_comments()?;

    // Bare `WITH` is an optional connective before the attribute list,
    // distinct from the `IDENTIFIED WITH protocol` form below.
    let _ = s.eat_keyword("with");
    s.skip_ws_and_comments()?;

    let mut superuser = None;
    let mut identified_by = None;
    let mut identified_with = None;
    let mut identified_count = 0u32;

    loop {
        if s.eat_keyword("superuser") {
            superuser = Some(true);
        } else if s.eat_keyword("nosuperuser") {
            superuser = Some(false);
        } else if s.eat_keyword("identified") {
            identified_count += 1;
            if identified_count > 1 {
                return Err(SqliteServerError::parse(s.pos, "multiple IDENTIFIED clauses are not allowed"));
            }
            s.skip_ws_and_comments()?;
            if s.eat_keyword("by") {
                s.skip_ws_and_comments()?;
                identified_by = Some(s.read_identifier()?);
            } else if s.eat_keyword("with") {
                s.skip_ws_and_comments()?;
                let protocol = s.read_identifier()?;
                s.skip_ws_and_comments()?;
                let _ = s.eat_keyword("by");
                s.skip_ws_and_comments()?;
                let auth_method = s.read_identifier()?;
                identified_with = Some((protocol, auth_method));
            } else {
                return Err(SqliteServerError::parse(s.pos, "expected BY or WITH after IDENTIFIED"));
            }
        } else {
            break;
        }
        s.skip_ws_and_comments()?;
    }
    expect_eof(&mut s)?;

    let detail = StatementDetail::CreateUser {
        user: user.clone(),
        host: host.clone(),
        superuser,
        identified_by: identified_by.clone(),
        identified_with: identified_with.clone(),
    };
    let (tag, detail) = if is_create {
        (CommandTag::CreateUser, detail)
    } else {
        (
            CommandTag::AlterUser,
            StatementDetail::AlterUser { user, host, superuser, identified_by, identified_with },
        )
    };
    Ok(Some(Statement::new(tag, body, detail)))
}

fn parse_drop_user(mut s: Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("if") && {
        s.skip_ws_and_comments()?;
        s.eat_keyword("exists")
    };
    s.skip_ws_and_comments()?;

    let mut targets = Vec::new();
    loop {
        let user = s.read_identifier()?;
        s.skip_ws_and_comments()?;
        let host = if s.peek() == Some(b'@') {
            s.advance();
            s.skip_ws_and_comments()?;
            s.read_identifier()?
        } else {
            "%".to_string()
        };
        s.skip_ws_and_comments()?;
        let protocol = if s.eat_keyword("identified") {
            s.skip_ws_and_comments()?;
            if !s.eat_keyword("with") {
                return Err(SqliteServerError::parse(s.pos, "expected WITH after IDENTIFIED"));
            }
            s.skip_ws_and_comments()?;
            Some(s.read_identifier()?)
        } else {
            None
        };
        targets.push(DropUserTarget { user, host, protocol });
        s.skip_ws_and_comments()?;
        if s.peek() == Some(b',') {
            s.advance();
            s.skip_ws_and_comments()?;
            continue;
        }
        break;
    }

    Ok(Some(Statement::new(CommandTag::DropUser, body, StatementDetail::DropUser { targets })))
}

fn try_grant_revoke(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    let is_grant = if s.eat_keyword("grant") {
        true
    } else if s.eat_keyword("revoke") {
        false
    } else {
        return Ok(None);
    };
    s.skip_ws_and_comments()?;

    let mut privileges = Vec::new();
    loop {
        let word = s.read_identifier()?;
        let privilege = Privilege::parse(&word)
            .ok_or_else(|| SqliteServerError::parse(s.pos, format!("unknown privilege '{word}'")))?;
        privileges.push(privilege);
        s.skip_ws_and_comments()?;
        if s.peek() == Some(b',') {
            s.advance();
            s.skip_ws_and_comments()?;
            continue;
        }
        break;
    }

    if is_grant {
        if !s.eat_keyword("on") {
            return Err(SqliteServerError::parse(s.pos, "expected ON in GRANT"));
        }
    } else if !s.eat_keyword("on") {
        return Err(SqliteServerError::parse(s.pos, "expected ON in REVOKE"));
    }
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("database");
    s.skip_ws_and_comments()?;

    let mut dbs = Vec::new();
    loop {
        dbs.push(s.read_identifier()?);
        s.skip_ws_and_comments()?;
        if s.peek() == Some(b',') {
            s.advance();
            s.skip_ws_and_comments()?;
            continue;
        }
        break;
    }

    if is_grant {
        if !s.eat_keyword("to") {
            return Err(SqliteServerError::parse(s.pos, "expected TO in GRANT"));
        }
    } else if !s.eat_keyword("from") {
        return Err(SqliteServerError::parse(s.pos, "expected FROM in REVOKE"));
    }
    s.skip_ws_and_comments()?;

    let mut users = Vec::new();
    loop {
        let user = s.read_identifier()?;
        s.skip_ws_and_comments()?;
        let host = if s.peek() == Some(b'@') {
            s.advance();
            s.skip_ws_and_comments()?;
            s.read_identifier()?
        } else {
            "%".to_string()
        };
        users.push((host, user));
        s.skip_ws_and_comments()?;
        if s.peek() == Some(b',') {
            s.advance();
            s.skip_ws_and_comments()?;
            continue;
        }
        break;
    }

    let tag = if is_grant { CommandTag::Grant } else { CommandTag::Revoke };
    let detail = if is_grant {
        StatementDetail::Grant { privileges, dbs, users }
    } else {
        StatementDetail::Revoke { privileges, dbs, users }
    };
    Ok(Some(Statement::new(tag, body, detail)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_database_if_not_exists() {
        let body = "create database if not exists shop";
        let s = Scanner::new(body);
        let stmt = try_database_ddl(&s, body).unwrap().unwrap();
        assert_eq!(stmt.tag, CommandTag::CreateDatabase);
        match stmt.detail {
            StatementDetail::DatabaseDdl { if_exists_or_not, name, .. } => {
                assert!(if_exists_or_not);
                assert_eq!(name, "shop");
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn grant_rejects_ambiguous_empty_privilege_list() {
        let body = "grant all , on on database shop to bob";
        let s = Scanner::new(body);
        assert!(try_grant_revoke(&s, body).is_err());
    }

    #[test]
    fn grant_parses_multiple_privileges_and_users() {
        let body = "grant select, insert on shop to bob@'%', alice@localhost";
        let s = Scanner::new(body);
        let stmt = try_grant_revoke(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Grant { privileges, dbs, users } => {
                assert_eq!(privileges, vec![Privilege::Select, Privilege::Insert]);
                assert_eq!(dbs, vec!["shop".to_string()]);
                assert_eq!(users.len(), 2);
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn create_user_identified_by() {
        let body = "create user bob@localhost identified by 'secret'";
        let s = Scanner::new(body);
        let stmt = try_user_ddl(&s, body).unwrap().unwrap();
        assert_eq!(stmt.tag, CommandTag::CreateUser);
    }

    #[test]
    fn drop_user_multiple_targets() {
        let body = "drop user bob, alice@localhost";
        let s = Scanner::new(body);
        let stmt = try_user_ddl(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::DropUser { targets } => assert_eq!(targets.len(), 2),
            _ => panic!("wrong detail"),
        }
    }
}
