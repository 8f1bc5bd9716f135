mod ddl;
mod dml;
mod misc;
mod pragma;
mod show;
mod txn;

use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, Statement, StatementDetail};

/// Dispatches a single already-split statement body (no trailing `;`) to
/// its command recognizer (§4.1 "Recognized commands"). Anything that
/// doesn't match one of the enumerated grammars is `Other`, carried through
/// opaque (spec Non-goals: only the enumerated commands are structured).
pub fn recognize(body: &str) -> Result<Statement, SqliteServerError> {
    let mut s = Scanner::new(body);
    let saw_comment = s.skip_ws_and_comments()?;
    if s.is_eof() {
        return Ok(Statement::empty(body, saw_comment));
    }

    if let Some(stmt) = dml::try_recognize(&s, body)? {
        return Ok(stmt);
    }
    if let Some(stmt) = txn::try_recognize(&s, body)? {
        return Ok(stmt);
    }
    if let Some(stmt) = ddl::try_recognize(&s, body)? {
        return Ok(stmt);
    }
    if let Some(stmt) = show::try_recognize(&s, body)? {
        return Ok(stmt);
    }
    if let Some(stmt) = pragma::try_recognize(&s, body)? {
        return Ok(stmt);
    }
    if let Some(stmt) = misc::try_recognize(&s, body)? {
        return Ok(stmt);
    }

    let word = leading_word(&s).unwrap_or_default().to_ascii_uppercase();
    Ok(Statement::new(CommandTag::Other(word), body, StatementDetail::Other))
}

/// Reads the bare identifier (if any) at the scanner's current position, for
/// tagging an unrecognized statement with its first word (§4.1).
fn leading_word(s: &Scanner) -> Option<String> {
    let mut s = Scanner::at(s.text, s.pos);
    s.read_identifier().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unrecognized_statement_is_other() {
        let stmt = recognize("VACUUM").unwrap();
        assert_eq!(stmt.tag, CommandTag::Other("VACUUM".to_string()));
    }

    #[test]
    fn unrecognized_statement_word_is_uppercased() {
        let stmt = recognize("vacuum").unwrap();
        assert_eq!(stmt.tag, CommandTag::Other("VACUUM".to_string()));
        assert_eq!(stmt.tag.to_string(), "VACUUM");
    }

    #[test]
    fn empty_batch_is_empty() {
        let stmt = recognize("   -- just a comment\n").unwrap();
        assert_eq!(stmt.tag, CommandTag::Empty);
        assert!(stmt.is_comment());
    }

    #[test]
    fn whitespace_only_batch_is_empty_but_not_comment() {
        let stmt = recognize("   \n\t").unwrap();
        assert_eq!(stmt.tag, CommandTag::Empty);
        assert!(!stmt.is_comment());
    }
}
