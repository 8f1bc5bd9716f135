use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, Statement, StatementDetail};

pub fn try_recognize(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    try_kill(s, body)
}

fn try_kill(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("kill") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let connection = s.eat_keyword("connection");
    if connection {
        s.skip_ws_and_comments()?;
    } else {
        let _ = s.eat_keyword("query");
        s.skip_ws_and_comments()?;
    }
    let start = s.pos;
    let negative = s.peek() == Some(b'-');
    if negative {
        s.advance();
    }
    while matches!(s.peek(), Some(c) if c.is_ascii_digit()) {
        s.advance();
    }
    let text = s.slice(start, s.pos);
    let id = text
        .parse::<i64>()
        .map_err(|_| SqliteServerError::parse(start, "expected a connection id after KILL"))?;
    Ok(Some(Statement::new(CommandTag::Kill, body, StatementDetail::Kill { connection, id })))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kill_connection_id() {
        let body = "kill connection 42";
        let s = Scanner::new(body);
        let stmt = try_kill(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Kill { connection: true, id: 42 });
    }

    #[test]
    fn kill_bare_id_defaults_to_query_kill() {
        let body = "kill 7";
        let s = Scanner::new(body);
        let stmt = try_kill(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Kill { connection: false, id: 7 });
    }
}
