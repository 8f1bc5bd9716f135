use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, IsolationLevel, Statement, StatementDetail, TransactionMode, TxBehavior};

pub fn try_recognize(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    if let Some(stmt) = try_begin(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_commit(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_rollback(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_savepoint(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_release(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_set_transaction(s, body)? {
        return Ok(Some(stmt));
    }
    Ok(None)
}

/// `BEGIN|START [DEFERRED|IMMEDIATE|EXCLUSIVE] [TRANSACTION|WORK]
/// [<tx-mode-list>]` (§4.1). The behavior keyword precedes
/// `TRANSACTION`/`WORK`, matching §8 scenario 1's `"begin deferred
/// transaction"` / `"begin deferred ... work"` forms.
fn try_begin(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !(s.eat_keyword("begin") || s.eat_keyword("start")) {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;

    let mut behavior = TxBehavior::Deferred;
    if s.eat_keyword("deferred") {
        behavior = TxBehavior::Deferred;
    } else if s.eat_keyword("immediate") {
        behavior = TxBehavior::Immediate;
    } else if s.eat_keyword("exclusive") {
        behavior = TxBehavior::Exclusive;
    }
    s.skip_ws_and_comments()?;

    let _ = s.eat_keyword("transaction") || s.eat_keyword("work");
    s.skip_ws_and_comments()?;

    let (read_only, isolation) = parse_tx_mode_list(&mut s)?;

    let mode = TransactionMode { read_only, isolation, behavior };
    Ok(Some(Statement::new(CommandTag::Begin, body, StatementDetail::Begin { mode })))
}

/// Parses the comma-separated `READ ONLY | READ WRITE | ISOLATION LEVEL
/// (...)` list shared by `BEGIN`'s optional tail and `SET [SESSION
/// CHARACTERISTICS AS] TRANSACTION` (§4.1). Returns the session-inherited
/// defaults (`None`, SERIALIZABLE) when no clause is present.
fn parse_tx_mode_list(s: &mut Scanner) -> Result<(Option<bool>, IsolationLevel), SqliteServerError> {
    let mut isolation = IsolationLevel::Serializable;
    let mut read_only = None;
    loop {
        if s.eat_keyword("isolation") {
            s.skip_ws_and_comments()?;
            let _ = s.eat_keyword("level");
            s.skip_ws_and_comments()?;
            isolation = if s.eat_keyword("read") {
                s.skip_ws_and_comments()?;
                if s.eat_keyword("uncommitted") {
                    IsolationLevel::ReadUncommitted
                } else if s.eat_keyword("committed") {
                    IsolationLevel::ReadCommitted
                } else {
                    IsolationLevel::ReadCommitted
                }
            } else if s.eat_keyword("repeatable") {
                s.skip_ws_and_comments()?;
                let _ = s.eat_keyword("read");
                IsolationLevel::RepeatableRead
            } else if s.eat_keyword("serializable") {
                IsolationLevel::Serializable
            } else {
                isolation
            };
        } else if s.eat_keyword("read") {
            s.skip_ws_and_comments()?;
            if s.eat_keyword("only") {
                read_only = Some(true);
            } else if s.eat_keyword("write") {
                read_only = Some(false);
            }
        } else {
            break;
        }
        s.skip_ws_and_comments()?;
        if s.peek() == Some(b',') {
            s.advance();
            s.skip_ws_and_comments()?;
            continue;
        }
        break;
    }
    Ok((read_only, isolation))
}

fn try_commit(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    let is_commit = s.eat_keyword("commit");
    if is_commit {
        s.skip_ws_and_comments()?;
        let _ = s.eat_keyword("transaction");
        s.skip_ws_and_comments()?;
        let chain = s.eat_keyword("and") && {
            s.skip_ws_and_comments()?;
            s.eat_keyword("chain")
        };
        return Ok(Some(Statement::new(CommandTag::Commit, body, StatementDetail::Commit { chain })));
    }

    let mut s = Scanner::at(s.text, s.pos);
    if s.eat_keyword("end") {
        s.skip_ws_and_comments()?;
        let _ = s.eat_keyword("transaction");
        s.skip_ws_and_comments()?;
        let chain = s.eat_keyword("and") && {
            s.skip_ws_and_comments()?;
            s.eat_keyword("chain")
        };
        return Ok(Some(Statement::new(CommandTag::End, body, StatementDetail::End { chain })));
    }
    Ok(None)
}

fn try_rollback(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("rollback") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("transaction");
    s.skip_ws_and_comments()?;
    let savepoint = if s.eat_keyword("to") {
        s.skip_ws_and_comments()?;
        let _ = s.eat_keyword("savepoint");
        s.skip_ws_and_comments()?;
        Some(s.read_identifier()?)
    } else {
        None
    };
    Ok(Some(Statement::new(CommandTag::Rollback, body, StatementDetail::Rollback { savepoint })))
}

fn try_savepoint(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("savepoint") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let name = s.read_identifier()?;
    Ok(Some(Statement::new(CommandTag::Savepoint, body, StatementDetail::Savepoint { name })))
}

fn try_release(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("release") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("savepoint");
    s.skip_ws_and_comments()?;
    let name = s.read_identifier()?;
    Ok(Some(Statement::new(CommandTag::Release, body, StatementDetail::Release { name })))
}

/// `SET TRANSACTION <tx-mode-list>` sets the next transaction only; `SET
/// SESSION CHARACTERISTICS AS TRANSACTION <tx-mode-list>` sets the session
/// default instead (§4.1) — the two are distinct literal grammars, not
/// `SESSION` as an optional modifier on the former.
fn try_set_transaction(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("set") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;

    let session = if s.eat_keyword("session") {
        s.skip_ws_and_comments()?;
        if !s.eat_keyword("characteristics") {
            return Ok(None);
        }
        s.skip_ws_and_comments()?;
        if !s.eat_keyword("as") {
            return Ok(None);
        }
        s.skip_ws_and_comments()?;
        true
    } else {
        false
    };

    if !s.eat_keyword("transaction") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;

    let (read_only, isolation) = parse_tx_mode_list(&mut s)?;

    let mode = TransactionMode { read_only, isolation, behavior: TxBehavior::Deferred };
    Ok(Some(Statement::new(
        CommandTag::SetTransaction,
        body,
        StatementDetail::SetTransaction { mode, session },
    )))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn begin_defaults_to_deferred() {
        let body = "begin";
        let s = Scanner::new(body);
        let stmt = try_begin(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Begin { mode } => assert_eq!(mode.behavior, TxBehavior::Deferred),
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn set_transaction_isolation_serializable_default() {
        let body = "set transaction isolation level serializable";
        let s = Scanner::new(body);
        let stmt = try_set_transaction(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::SetTransaction { mode, .. } => {
                assert_eq!(mode.isolation, IsolationLevel::Serializable);
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn rollback_to_savepoint_captures_name() {
        let body = "rollback to savepoint sp1";
        let s = Scanner::new(body);
        let stmt = try_rollback(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Rollback { savepoint: Some("sp1".to_string()) });
    }

    #[test]
    fn start_is_accepted_as_a_begin_alias() {
        let body = "start transaction";
        let s = Scanner::new(body);
        let stmt = try_begin(&s, body).unwrap().unwrap();
        assert_eq!(stmt.tag, CommandTag::Begin);
    }

    #[test]
    fn begin_work_keyword_is_accepted() {
        let body = "begin immediate work";
        let s = Scanner::new(body);
        let stmt = try_begin(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Begin { mode } => assert_eq!(mode.behavior, TxBehavior::Immediate),
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn begin_tx_mode_list_is_parsed() {
        let body = "begin deferred transaction read only, isolation level repeatable read";
        let s = Scanner::new(body);
        let stmt = try_begin(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::Begin { mode } => {
                assert_eq!(mode.read_only, Some(true));
                assert_eq!(mode.isolation, IsolationLevel::RepeatableRead);
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn set_session_characteristics_sets_session_scope() {
        let body = "set session characteristics as transaction read write";
        let s = Scanner::new(body);
        let stmt = try_set_transaction(&s, body).unwrap().unwrap();
        match stmt.detail {
            StatementDetail::SetTransaction { mode, session } => {
                assert!(session);
                assert_eq!(mode.read_only, Some(false));
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn set_session_without_characteristics_as_is_rejected() {
        let body = "set session transaction read only";
        let s = Scanner::new(body);
        assert!(try_set_transaction(&s, body).unwrap().is_none());
    }

    #[test]
    fn spec_scenario_one_splits_two_begin_statements() {
        let batch = "begIn deferred transaction;/*tx*/begin deferred/*tx*/work--;";
        let mut p = crate::cursor::StatementParser::new(batch);
        let a = p.next().unwrap().unwrap();
        let b = p.next().unwrap().unwrap();
        assert!(p.next().unwrap().is_none());
        for stmt in [&a, &b] {
            assert_eq!(stmt.tag, CommandTag::Begin);
            match &stmt.detail {
                StatementDetail::Begin { mode } => {
                    assert_eq!(mode.behavior, TxBehavior::Deferred);
                    assert_eq!(mode.isolation, IsolationLevel::Serializable);
                    assert_eq!(mode.read_only, None);
                }
                other => panic!("expected Begin, got {other:?}"),
            }
        }
    }
}
