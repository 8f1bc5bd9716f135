use common::err::SqliteServerError;

/// Byte-position scanner over the raw SQL text, grounded in the teacher's
/// `common::parse::parse::InputBuf` cursor-over-a-slice style
/// (`read_array`/`jump_to`) generalized from binary frames to UTF-8 text:
/// this tracks a single `pos` cursor and exposes the handful of lookahead
/// operations the per-command recognizers need (§4.1 tokenization rules).
pub struct Scanner<'a> {
    pub text: &'a str,
    pub bytes: &'a [u8],
    pub pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Scanner { text, bytes: text.as_bytes(), pos: 0 }
    }

    pub fn at(text: &'a str, pos: usize) -> Self {
        Scanner { text, bytes: text.as_bytes(), pos }
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    fn err(&self, pos: usize, reason: impl Into<String>) -> SqliteServerError {
        SqliteServerError::parse(pos, reason)
    }

    /// Skips ASCII whitespace, `--` line comments, and nested `/* ... */`
    /// block comments. Returns an error at the opening `/*` of an
    /// unterminated block comment (§4.1 "An unterminated block comment ...
    /// is a parse error"), otherwise whether at least one comment (as
    /// opposed to bare whitespace) was skipped — callers use this to tell
    /// a comment-only statement from a whitespace-only one (§3).
    pub fn skip_ws_and_comments(&mut self) -> Result<bool, SqliteServerError> {
        let mut saw_comment = false;
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => self.advance(),
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    saw_comment = true;
                    self.pos += 2;
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    saw_comment = true;
                    self.skip_block_comment()?;
                }
                _ => break,
            }
        }
        Ok(saw_comment)
    }

    fn skip_block_comment(&mut self) -> Result<(), SqliteServerError> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b'/'), Some(b'*')) => {
                    depth += 1;
                    self.pos += 2;
                }
                (Some(b'*'), Some(b'/')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                (Some(_), _) => self.advance(),
                (None, _) => return Err(self.err(start, "unterminated block comment")),
            }
        }
    }

    /// Consumes a `'...'` or `"..."` string literal with doubled-quote
    /// escaping, starting at the opening quote. Errors at the opening quote
    /// on an unterminated literal.
    pub fn skip_string_literal(&mut self) -> Result<(), SqliteServerError> {
        let start = self.pos;
        let quote = self.peek().expect("caller checked for a quote");
        self.advance();
        loop {
            match self.peek() {
                None => return Err(self.err(start, "unterminated string literal")),
                Some(c) if c == quote => {
                    self.advance();
                    if self.peek() == Some(quote) {
                        self.advance();
                        continue;
                    }
                    return Ok(());
                }
                Some(_) => self.advance(),
            }
        }
    }

    pub fn is_identifier_start(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    pub fn is_identifier_part(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_'
    }

    /// True if the byte at `pos` can't continue a bare identifier/keyword —
    /// whitespace, comment start, `;`, EOF, or another operator (§4.1
    /// keyword-match boundary rule).
    pub fn is_boundary(&self, pos: usize) -> bool {
        match self.bytes.get(pos) {
            None => true,
            Some(c) => !Self::is_identifier_part(*c),
        }
    }

    /// Case-insensitively matches `kw` as a whole identifier at the current
    /// position (not a prefix of a longer identifier), advancing past it on
    /// success.
    pub fn eat_keyword(&mut self, kw: &str) -> bool {
        let end = self.pos + kw.len();
        if end > self.bytes.len() {
            return false;
        }
        if !self.bytes[self.pos..end].eq_ignore_ascii_case(kw.as_bytes()) {
            return false;
        }
        if !self.is_boundary(end) {
            return false;
        }
        self.pos = end;
        true
    }

    /// Non-consuming version of `eat_keyword`.
    pub fn peek_keyword(&self, kw: &str) -> bool {
        let end = self.pos + kw.len();
        end <= self.bytes.len()
            && self.bytes[self.pos..end].eq_ignore_ascii_case(kw.as_bytes())
            && self.is_boundary(end)
    }

    /// Reads a bare, single-quoted, or double-quoted identifier.
    pub fn read_identifier(&mut self) -> Result<String, SqliteServerError> {
        match self.peek() {
            Some(b'\'') | Some(b'"') => {
                let start = self.pos;
                let quote = self.peek().unwrap();
                self.advance();
                let content_start = self.pos;
                loop {
                    match self.peek() {
                        None => return Err(self.err(start, "unterminated quoted identifier")),
                        Some(c) if c == quote => {
                            let content = self.text[content_start..self.pos].to_string();
                            self.advance();
                            return Ok(content);
                        }
                        Some(_) => self.advance(),
                    }
                }
            }
            Some(c) if Self::is_identifier_start(c) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if Self::is_identifier_part(c) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                Ok(self.text[start..self.pos].to_string())
            }
            _ => Err(self.err(self.pos, "expected identifier")),
        }
    }

    /// Finds the next top-level occurrence of `needle` (case-insensitive,
    /// whole-keyword) at or after the current position, skipping over
    /// strings and comments, without consuming input. Returns the byte
    /// offset of the match.
    pub fn find_top_level_keyword(&self, needle: &str) -> Result<Option<usize>, SqliteServerError> {
        let mut s = Scanner::at(self.text, self.pos);
        loop {
            s.skip_ws_and_comments()?;
            if s.is_eof() {
                return Ok(None);
            }
            if s.peek_keyword(needle) {
                return Ok(Some(s.pos));
            }
            match s.peek() {
                Some(b'\'') | Some(b'"') => s.skip_string_literal()?,
                Some(b';') => return Ok(None),
                Some(_) => s.advance(),
                None => return Ok(None),
            }
        }
    }

    /// Scans to the end of the current top-level statement: the next `;`
    /// outside strings/comments, or end of input. Returns the byte offset
    /// one past the statement body (before the `;`, if present).
    pub fn scan_to_statement_end(&mut self) -> Result<usize, SqliteServerError> {
        loop {
            match self.peek() {
                None => return Ok(self.pos),
                Some(b';') => return Ok(self.pos),
                Some(b'\'') | Some(b'"') => self.skip_string_literal()?,
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    self.pos += 2;
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => self.skip_block_comment()?,
                Some(_) => self.advance(),
            }
        }
    }

    /// Returns the byte offset one past the last non-whitespace,
    /// non-comment content in `text` — i.e. `text` with any trailing
    /// comments/whitespace stripped. Comments can't be trimmed by scanning
    /// backward directly (a `--` or `*/` found walking right-to-left
    /// doesn't tell you where its matching opener is), so this scans
    /// forward once, remembering the position after the last real token
    /// (§4.1 SLEEP() trailing-item check).
    pub fn trailing_content_end(text: &str) -> Result<usize, SqliteServerError> {
        let mut s = Scanner::new(text);
        let mut last_end = 0usize;
        loop {
            s.skip_ws_and_comments()?;
            if s.is_eof() {
                break;
            }
            match s.peek() {
                Some(b'\'') | Some(b'"') => s.skip_string_literal()?,
                Some(_) => s.advance(),
                None => break,
            }
            last_end = s.pos;
        }
        Ok(last_end)
    }

    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[start..end]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn skips_nested_block_comments() {
        let mut s = Scanner::new("/* a /* b */ c */select");
        s.skip_ws_and_comments().unwrap();
        assert_eq!(s.rest(), "select");
    }

    #[test]
    fn unterminated_block_comment_errors_at_open() {
        let mut s = Scanner::new("/* never closes");
        assert!(s.skip_ws_and_comments().is_err());
    }

    #[test]
    fn string_literal_handles_doubled_quote_escape() {
        let mut s = Scanner::new("'it''s here' rest");
        s.skip_string_literal().unwrap();
        assert_eq!(s.rest(), " rest");
    }

    #[test]
    fn keyword_match_requires_boundary() {
        let mut s = Scanner::new("selection");
        assert!(!s.eat_keyword("select"));
        let mut s2 = Scanner::new("select ");
        assert!(s2.eat_keyword("select"));
    }

    #[test]
    fn find_top_level_keyword_ignores_strings_and_comments() {
        let s = Scanner::new("'for update' /* for update */ for update");
        let found = s.find_top_level_keyword("for").unwrap();
        assert!(found.is_some());
        assert!(found.unwrap() > 30);
    }
}
