use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, PragmaValue, Statement, StatementDetail};

/// PRAGMA grammar (§4.1): `PRAGMA [schema.]name [= value | (value)]`, where
/// `value` is an integer, a `0x`-prefixed hex integer, a decimal, or a
/// bare/quoted string — typed here so the engine never re-parses the
/// literal.
pub fn try_recognize(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("pragma") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let first = s.read_identifier()?;
    s.skip_ws_and_comments()?;

    let (schema, name) = if s.peek() == Some(b'.') {
        s.advance();
        s.skip_ws_and_comments()?;
        (Some(first), s.read_identifier()?)
    } else {
        (None, first)
    };
    s.skip_ws_and_comments()?;

    let value = if s.peek() == Some(b'=') {
        s.advance();
        s.skip_ws_and_comments()?;
        Some(read_pragma_value(&mut s)?)
    } else if s.peek() == Some(b'(') {
        s.advance();
        s.skip_ws_and_comments()?;
        let v = read_pragma_value(&mut s)?;
        s.skip_ws_and_comments()?;
        if s.peek() != Some(b')') {
            return Err(SqliteServerError::parse(s.pos, "expected ')' closing PRAGMA value"));
        }
        s.advance();
        Some(v)
    } else {
        None
    };

    s.skip_ws_and_comments()?;
    if !s.is_eof() {
        return Err(SqliteServerError::parse(s.pos, "unexpected trailing input after PRAGMA"));
    }

    Ok(Some(Statement::new(CommandTag::Pragma, body, StatementDetail::Pragma { schema, name, value })))
}

fn read_pragma_value(s: &mut Scanner) -> Result<PragmaValue, SqliteServerError> {
    match s.peek() {
        Some(b'\'') | Some(b'"') => Ok(PragmaValue::Str(s.read_identifier()?)),
        Some(b'-') | Some(b'+') | Some(b'.') | Some(b'0'..=b'9') => read_numeric(s),
        Some(c) if Scanner::is_identifier_start(c) => Ok(PragmaValue::Str(s.read_identifier()?)),
        _ => Err(SqliteServerError::parse(s.pos, "expected a PRAGMA value")),
    }
}

/// Signed or unsigned decimal integer, `0x`-prefixed hex integer, or
/// decimal with any digits on either side of the point (including the
/// bare `.0`/`-.0`/`+.0` forms) — §4.1 PRAGMA grammar, §8 boundary
/// behaviors (`.0.0` with two decimal points is rejected).
fn read_numeric(s: &mut Scanner) -> Result<PragmaValue, SqliteServerError> {
    let start = s.pos;
    if matches!(s.peek(), Some(b'-') | Some(b'+')) {
        s.advance();
    }
    if s.peek() == Some(b'0') && matches!(s.peek_at(1), Some(b'x') | Some(b'X')) {
        s.advance();
        s.advance();
        let hex_start = s.pos;
        while matches!(s.peek(), Some(c) if c.is_ascii_hexdigit()) {
            s.advance();
        }
        let text = s.slice(hex_start, s.pos);
        let value = u64::from_str_radix(text, 16)
            .map_err(|e| SqliteServerError::parse(start, format!("invalid hex literal: {e}")))?;
        return Ok(PragmaValue::HexInteger(value));
    }

    let mut is_decimal = false;
    let mut saw_digit = false;
    while let Some(c) = s.peek() {
        if c.is_ascii_digit() {
            saw_digit = true;
            s.advance();
        } else if c == b'.' {
            if is_decimal {
                return Err(SqliteServerError::parse(s.pos, "a PRAGMA value may have at most one decimal point"));
            }
            is_decimal = true;
            s.advance();
        } else {
            break;
        }
    }
    if !saw_digit {
        return Err(SqliteServerError::parse(start, "expected digits in PRAGMA numeric value"));
    }
    let text = s.slice(start, s.pos);
    if is_decimal {
        let value = text
            .parse::<f64>()
            .map_err(|e| SqliteServerError::parse(start, format!("invalid decimal literal: {e}")))?;
        Ok(PragmaValue::Decimal(value))
    } else {
        let value = text
            .parse::<i64>()
            .map_err(|e| SqliteServerError::parse(start, format!("invalid integer literal: {e}")))?;
        Ok(PragmaValue::Integer(value))
    }
}
