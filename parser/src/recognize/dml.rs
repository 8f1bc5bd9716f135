use common::err::SqliteServerError;

use crate::scanner::Scanner;
use crate::statement::{CommandTag, Statement, StatementDetail};

pub fn try_recognize(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    if let Some(stmt) = try_select(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_insert(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_replace(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_update(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_delete(s, body)? {
        return Ok(Some(stmt));
    }
    if let Some(stmt) = try_truncate(s, body)? {
        return Ok(Some(stmt));
    }
    Ok(None)
}

/// SELECT is recognized as a statement whose tail, after stripping a
/// trailing `FOR UPDATE`, is otherwise passed through opaque (§4.1: "a
/// trailing `FOR UPDATE` clause is recognized and stripped before the
/// statement reaches the engine; everything else about a SELECT is
/// opaque"). The select-list is additionally checked for the sole
/// recognized function shape `[expr ,] SLEEP(number)` as its trailing item.
fn try_select(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("select") {
        return Ok(None);
    }
    let list_start = s.pos;

    let for_update_pos = trailing_for_update_pos(body)?;
    let for_update = for_update_pos.is_some();
    let executable_len = for_update_pos.unwrap_or(body.len());

    let sleep_seconds = try_trailing_sleep(&body[list_start..executable_len])?;

    Ok(Some(Statement::new(
        CommandTag::Select,
        body,
        StatementDetail::Select { for_update, executable_len, sleep_seconds },
    )))
}

/// Returns the byte offset of a trailing, top-level `FOR UPDATE` clause —
/// one that runs to the end of the statement with nothing after it —
/// or `None` if there isn't one.
fn trailing_for_update_pos(body: &str) -> Result<Option<usize>, SqliteServerError> {
    let mut last_for: Option<usize> = None;
    let mut cur = 0;
    loop {
        let found = Scanner::at(body, cur).find_top_level_keyword("for")?;
        match found {
            Some(pos) => {
                last_for = Some(pos);
                cur = pos + 3;
            }
            None => break,
        }
    }
    let Some(for_pos) = last_for else { return Ok(None) };
    let mut after = Scanner::at(body, for_pos + 3);
    after.skip_ws_and_comments()?;
    if !after.eat_keyword("update") {
        return Ok(None);
    }
    after.skip_ws_and_comments()?;
    if !after.is_eof() {
        return Ok(None);
    }
    Ok(Some(for_pos))
}

/// Recognizes `[expr ,] SLEEP(number)` as the trailing (and, per §4.1, only
/// allowed) item of a select-list: no other position for `SLEEP(...)` and
/// no clause after it is accepted — anything else leaves `sleep_seconds`
/// unset and the statement executes as an ordinary opaque SELECT.
fn try_trailing_sleep(list_text: &str) -> Result<Option<f64>, SqliteServerError> {
    let mut cur = 0usize;
    let mut last_pos = None;
    loop {
        match Scanner::at(list_text, cur).find_top_level_keyword("sleep")? {
            Some(pos) => {
                last_pos = Some(pos);
                cur = pos + 5;
            }
            None => break,
        }
    }
    let Some(pos) = last_pos else { return Ok(None) };

    let mut after = Scanner::at(list_text, pos + 5);
    after.skip_ws_and_comments()?;
    if after.peek() != Some(b'(') {
        return Ok(None);
    }
    after.advance();
    after.skip_ws_and_comments()?;

    let num_start = after.pos;
    if matches!(after.peek(), Some(b'-') | Some(b'+')) {
        after.advance();
    }
    let mut saw_digit = false;
    while let Some(c) = after.peek() {
        if c.is_ascii_digit() {
            saw_digit = true;
            after.advance();
        } else if c == b'.' {
            after.advance();
        } else {
            break;
        }
    }
    if !saw_digit {
        return Ok(None);
    }
    let num_text = &list_text[num_start..after.pos];

    after.skip_ws_and_comments()?;
    if after.peek() != Some(b')') {
        return Ok(None);
    }
    after.advance();
    after.skip_ws_and_comments()?;
    if !after.is_eof() {
        // trailing clause after sleep(...) - not the recognized shape.
        return Ok(None);
    }

    let before_end = Scanner::trailing_content_end(&list_text[..pos])?;
    let before = &list_text[..pos][..before_end];
    if !before.is_empty() && !before.ends_with(',') {
        // sleep() wasn't the trailing select-list item.
        return Ok(None);
    }

    let seconds: f64 = num_text
        .parse()
        .map_err(|_| SqliteServerError::parse(num_start, "invalid sleep() argument"))?;
    Ok(Some(seconds))
}

fn try_insert(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("insert") {
        return Ok(None);
    }
    let is_select = Scanner::at(body, s.pos).find_top_level_keyword("select")?.is_some();
    let returning = trailing_returning(body, s.pos)?;
    Ok(Some(Statement::new(
        CommandTag::Insert,
        body,
        StatementDetail::Insert { is_select, returning },
    )))
}

/// `REPLACE INTO` is SQLite's insert-or-replace shorthand; it re-tags as
/// `Insert` the same way `TRUNCATE` re-tags as `Delete`, since its
/// observable effect is an insert.
fn try_replace(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("replace") {
        return Ok(None);
    }
    let is_select = Scanner::at(body, s.pos).find_top_level_keyword("select")?.is_some();
    let returning = trailing_returning(body, s.pos)?;
    Ok(Some(Statement::new(CommandTag::Insert, body, StatementDetail::Insert { is_select, returning })))
}

/// Finds a top-level `RETURNING` keyword (ignoring occurrences inside
/// strings/comments) and captures the column list following it verbatim,
/// including trailing whitespace and embedded comments (§3: "the
/// columns-text is preserved verbatim").
fn trailing_returning(body: &str, from: usize) -> Result<Option<String>, SqliteServerError> {
    let Some(pos) = Scanner::at(body, from).find_top_level_keyword("returning")? else {
        return Ok(None);
    };
    let after = Scanner::at(body, pos + "returning".len());
    Ok(Some(after.rest().to_string()))
}

fn try_update(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("update") {
        return Ok(None);
    }
    Ok(Some(Statement::new(CommandTag::Update, body, StatementDetail::Update)))
}

fn try_delete(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("delete") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let (schema, table) = parse_optional_from_qualified_name(&mut s)?;
    Ok(Some(Statement::new(
        CommandTag::Delete,
        body,
        StatementDetail::Delete { schema, table },
    )))
}

/// TRUNCATE re-tags as DELETE (§4.1): its observable effect is "delete
/// every row in the named table", so it's carried as a Delete detail with
/// schema/table populated from its own grammar rather than DELETE's.
fn try_truncate(s: &Scanner, body: &str) -> Result<Option<Statement>, SqliteServerError> {
    let mut s = Scanner::at(s.text, s.pos);
    if !s.eat_keyword("truncate") {
        return Ok(None);
    }
    s.skip_ws_and_comments()?;
    let _ = s.eat_keyword("table");
    s.skip_ws_and_comments()?;
    let first = s.read_identifier()?;
    s.skip_ws_and_comments()?;
    let (schema, table) = if s.peek() == Some(b'.') {
        s.advance();
        s.skip_ws_and_comments()?;
        let second = s.read_identifier()?;
        (Some(first), Some(second))
    } else {
        (None, Some(first))
    };
    Ok(Some(Statement::new(
        CommandTag::Delete,
        body,
        StatementDetail::Delete { schema, table },
    )))
}

fn parse_optional_from_qualified_name(
    s: &mut Scanner,
) -> Result<(Option<String>, Option<String>), SqliteServerError> {
    if !s.eat_keyword("from") {
        return Ok((None, None));
    }
    s.skip_ws_and_comments()?;
    let first = s.read_identifier()?;
    s.skip_ws_and_comments()?;
    if s.peek() == Some(b'.') {
        s.advance();
        s.skip_ws_and_comments()?;
        let second = s.read_identifier()?;
        Ok((Some(first), Some(second)))
    } else {
        Ok((None, Some(first)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn select_for_update_is_flagged_and_stripped_detail() {
        let body = "select * from t for update";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.executable_sql(), "select * from t ");
        match &stmt.detail {
            StatementDetail::Select { for_update, .. } => assert!(*for_update),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn select_for_update_inside_string_is_not_flagged() {
        let body = "select 'for update' from t";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.executable_sql(), body);
        match &stmt.detail {
            StatementDetail::Select { for_update, .. } => assert!(!*for_update),
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn select_for_update_strips_trailing_clause_per_spec_example() {
        let body = "select *from t/**for update*/for update --;";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.executable_sql(), "select *from t/**for update*/");
        assert_eq!(stmt.sleep_seconds(), None);
    }

    #[test]
    fn sleep_as_sole_select_item_is_recognized() {
        let body = "select sleep(10)";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.sleep_seconds(), Some(10.0));
    }

    #[test]
    fn sleep_after_a_leading_expr_is_recognized() {
        let body = "select 1, sleep(0.5)";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.sleep_seconds(), Some(0.5));
    }

    #[test]
    fn sleep_with_a_trailing_clause_is_not_recognized() {
        let body = "select sleep(1) from t";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.sleep_seconds(), None);
    }

    #[test]
    fn sleep_not_as_trailing_item_is_not_recognized() {
        let body = "select sleep(1), 2";
        let s = Scanner::new(body);
        let stmt = try_select(&s, body).unwrap().unwrap();
        assert_eq!(stmt.sleep_seconds(), None);
    }

    #[test]
    fn truncate_retags_as_delete() {
        let body = "truncate table main.events";
        let s = Scanner::new(body);
        let stmt = try_truncate(&s, body).unwrap().unwrap();
        assert_eq!(stmt.tag, CommandTag::Delete);
        assert_eq!(
            stmt.detail,
            StatementDetail::Delete { schema: Some("main".to_string()), table: Some("events".to_string()) }
        );
    }

    #[test]
    fn insert_select_is_flagged() {
        let body = "insert into t select * from u";
        let s = Scanner::new(body);
        let stmt = try_insert(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Insert { is_select: true, returning: None });
    }

    #[test]
    fn insert_returning_captures_columns_verbatim() {
        let body = "insert into t(a) values(1) returning a, b";
        let s = Scanner::new(body);
        let stmt = try_insert(&s, body).unwrap().unwrap();
        assert_eq!(
            stmt.detail,
            StatementDetail::Insert { is_select: false, returning: Some(" a, b".to_string()) }
        );
    }

    #[test]
    fn insert_returning_inside_string_is_not_flagged() {
        let body = "insert into t(a) values('returning a')";
        let s = Scanner::new(body);
        let stmt = try_insert(&s, body).unwrap().unwrap();
        assert_eq!(stmt.detail, StatementDetail::Insert { is_select: false, returning: None });
    }

    #[test]
    fn replace_returning_is_recognized() {
        let body = "replace into t(a) values(1) returning a";
        let s = Scanner::new(body);
        let stmt = try_replace(&s, body).unwrap().unwrap();
        assert_eq!(stmt.tag, CommandTag::Insert);
        assert_eq!(
            stmt.detail,
            StatementDetail::Insert { is_select: false, returning: Some(" a".to_string()) }
        );
    }
}
