use common::err::SqliteServerError;

use crate::recognize;
use crate::scanner::Scanner;
use crate::statement::Statement;

/// Forward-only iterator over a batch of `;`-separated statements (§4.1
/// "Statement splitting"). Mirrors the spec's "remove() side-channel"
/// redesign note: a caller that wants to drop a already-handled leading
/// statement (e.g. after an implicit-commit boundary) calls `mark_removed`
/// instead of the parser re-splitting the remaining text.
pub struct StatementParser<'a> {
    text: &'a str,
    pos: usize,
    removed_through: usize,
    produced: bool,
}

impl<'a> StatementParser<'a> {
    pub fn new(text: &'a str) -> Self {
        StatementParser { text, pos: 0, removed_through: 0, produced: false }
    }

    pub fn has_next(&self) -> bool {
        let mut s = Scanner::at(self.text, self.pos);
        let _ = s.skip_ws_and_comments();
        !s.is_eof()
    }

    /// Parses and returns the next statement, advancing past its trailing
    /// `;` if present. Returns `Ok(None)` once only whitespace/comments
    /// remain.
    pub fn next(&mut self) -> Result<Option<Statement>, SqliteServerError> {
        let mut s = Scanner::at(self.text, self.pos);
        let saw_comment = s.skip_ws_and_comments()?;
        if s.is_eof() {
            self.pos = s.pos;
            return Ok(None);
        }

        let body_start = s.pos;
        let body_end = s.scan_to_statement_end()?;
        let body = s.slice(body_start, body_end);

        let mut after = Scanner::at(self.text, body_end);
        if after.peek() == Some(b';') {
            after.advance();
        }
        self.pos = after.pos;

        // The leading skip already consumed any comment attributed to this
        // statement (§3 partition rule) — if nothing else remains before
        // the terminator, this is an explicit empty/comment statement
        // rather than the tail of the batch. `recognize` alone can't tell
        // the difference since it never sees what was skipped upstream.
        if body.is_empty() {
            self.produced = true;
            return Ok(Some(Statement::empty(body, saw_comment)));
        }

        let stmt = recognize::recognize(body)?;
        self.produced = true;
        Ok(Some(stmt))
    }

    /// Marks everything up to and including the statement just returned as
    /// consumed, so a caller driving an implicit-commit boundary doesn't
    /// need the parser to re-scan from the start of the batch. Fails with
    /// `IllegalState` if no statement has been produced yet (§4.1 error
    /// semantics).
    pub fn mark_removed(&mut self) -> Result<(), SqliteServerError> {
        if !self.produced {
            return Err(SqliteServerError::IllegalState(
                "mark_removed called before any statement was produced".to_string(),
            ));
        }
        self.removed_through = self.pos;
        Ok(())
    }

    pub fn removed_through(&self) -> usize {
        self.removed_through
    }

    pub fn remaining(&self) -> &'a str {
        &self.text[self.pos..]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::statement::CommandTag;

    #[test]
    fn splits_two_statements_on_semicolon() {
        let mut p = StatementParser::new("select 1; select 2;");
        let a = p.next().unwrap().unwrap();
        assert_eq!(a.tag, CommandTag::Select);
        let b = p.next().unwrap().unwrap();
        assert_eq!(b.tag, CommandTag::Select);
        assert!(p.next().unwrap().is_none());
    }

    #[test]
    fn semicolon_inside_string_does_not_split() {
        let mut p = StatementParser::new("select ';' as x; select 2;");
        let a = p.next().unwrap().unwrap();
        assert_eq!(a.raw, "select ';' as x");
        let b = p.next().unwrap().unwrap();
        assert_eq!(b.raw, "select 2");
        assert!(p.next().unwrap().is_none());
    }

    #[test]
    fn trailing_comment_only_batch_yields_nothing() {
        let mut p = StatementParser::new("select 1; -- trailing comment\n");
        let _ = p.next().unwrap().unwrap();
        assert!(p.next().unwrap().is_none());
    }

    #[test]
    fn explicit_empty_statement_between_semicolons_is_not_a_comment() {
        let mut p = StatementParser::new(";select 1;");
        let a = p.next().unwrap().unwrap();
        assert!(a.is_empty());
        assert!(!a.is_comment());
        let b = p.next().unwrap().unwrap();
        assert_eq!(b.tag, CommandTag::Select);
    }

    #[test]
    fn comment_only_statement_terminated_by_semicolon_is_comment_and_empty() {
        let mut p = StatementParser::new("-- just a note\n;select 1;");
        let a = p.next().unwrap().unwrap();
        assert!(a.is_empty());
        assert!(a.is_comment());
        let b = p.next().unwrap().unwrap();
        assert_eq!(b.tag, CommandTag::Select);
    }

    #[test]
    fn mark_removed_before_any_statement_is_illegal_state() {
        let mut p = StatementParser::new("select 1;");
        let err = p.mark_removed().unwrap_err();
        assert!(matches!(err, SqliteServerError::IllegalState(_)));
    }

    #[test]
    fn mark_removed_after_next_tracks_position() {
        let mut p = StatementParser::new("select 1; select 2;");
        let _ = p.next().unwrap().unwrap();
        p.mark_removed().unwrap();
        assert_eq!(p.removed_through(), "select 1;".len());
    }
}
