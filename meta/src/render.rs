use common::err::SqliteServerError;
use parser::statement::{Statement, StatementDetail};

/// Renders a meta-affecting `Statement` into the exact SQL text to run
/// against the meta database under `alias` (§4.2 "Rendering rules"). The
/// textual forms below are deliberately literal — no extra whitespace
/// beyond what's shown here — because a client comparing rendered output
/// (e.g. the `SHOW GRANTS` test harness) depends on the exact bytes.
pub fn render(stmt: &Statement, alias: &str) -> Result<String, SqliteServerError> {
    let sql = match &stmt.detail {
        StatementDetail::CreateUser { user, host, superuser, identified_by, identified_with } => {
            render_insert_user(alias, user, host, *superuser, identified_by.as_deref(), identified_with.as_ref())
        }
        StatementDetail::AlterUser { user, host, superuser, identified_by, identified_with } => {
            render_update_user(alias, user, host, *superuser, identified_by.as_deref(), identified_with.as_ref())
        }
        StatementDetail::DropUser { targets } => render_drop_user(alias, targets),
        StatementDetail::DatabaseDdl { create: true, name, location, .. } => {
            render_create_database(alias, name, location.as_deref())
        }
        StatementDetail::DatabaseDdl { create: false, name, .. } => render_drop_database(alias, name),
        StatementDetail::Grant { privileges, dbs, users } => render_grant(alias, privileges, dbs, users),
        StatementDetail::Revoke { privileges, dbs, users } => render_revoke(alias, privileges, dbs, users),
        other => {
            return Err(SqliteServerError::Protocol(format!("{other:?} has no meta rendering")));
        }
    };

    verify_reparses_as_single_command(&sql)?;
    Ok(sql)
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn render_insert_user(
    alias: &str,
    user: &str,
    host: &str,
    superuser: Option<bool>,
    identified_by: Option<&str>,
    identified_with: Option<&(String, String)>,
) -> String {
    let protocol = identified_with.map(|(p, _)| p.as_str()).unwrap_or("pg");
    let auth_method = identified_with.map(|(_, m)| m.as_str()).unwrap_or("md5");
    let password = identified_by.unwrap_or("");
    let sa = if superuser.unwrap_or(false) { 1 } else { 0 };
    format!(
        "insert into {alias}.user(host, user, password, protocol, auth_method, sa) values({}, {}, {}, {}, {}, {sa})",
        quote(host),
        quote(user),
        quote(password),
        quote(protocol),
        quote(auth_method),
    )
}

fn render_update_user(
    alias: &str,
    user: &str,
    host: &str,
    superuser: Option<bool>,
    identified_by: Option<&str>,
    identified_with: Option<&(String, String)>,
) -> String {
    let mut assignments = Vec::new();
    if let Some(password) = identified_by {
        assignments.push(format!("password = {}", quote(password)));
    }
    if let Some((protocol, auth_method)) = identified_with {
        assignments.push(format!("protocol = {}", quote(protocol)));
        assignments.push(format!("auth_method = {}", quote(auth_method)));
    }
    if let Some(sa) = superuser {
        assignments.push(format!("sa = {}", if sa { 1 } else { 0 }));
    }
    let protocol = identified_with.map(|(p, _)| p.as_str()).unwrap_or("pg");
    format!(
        "update {alias}.user set {} where host = {} and user = {} and protocol = {}",
        assignments.join(", "),
        quote(host),
        quote(user),
        quote(protocol),
    )
}

fn render_drop_user(alias: &str, targets: &[parser::statement::DropUserTarget]) -> String {
    let clauses: Vec<String> = targets
        .iter()
        .map(|t| {
            let protocol = t.protocol.as_deref().unwrap_or("pg");
            format!("(host={} and user={} and protocol={})", quote(&t.host), quote(&t.user), quote(protocol))
        })
        .collect();
    format!("delete from {alias}.user where {}", clauses.join(" or "))
}

fn render_create_database(alias: &str, name: &str, location: Option<&str>) -> String {
    let dir = location.map(quote).unwrap_or_else(|| "NULL".to_string());
    format!("insert into {alias}.catalog(db, dir) values({}, {dir})", quote(&name.to_ascii_lowercase()))
}

fn render_drop_database(alias: &str, name: &str) -> String {
    format!("delete from {alias}.catalog where db = {}", quote(&name.to_ascii_lowercase()))
}

/// The `db` table's third column stores the granted privilege name, not
/// the database name the GRANT targeted (§8 scenario 3: `GRANT ALL ON
/// DATABASE testdb ...` renders with `'all'`, not `'testdb'`, as the third
/// value) — the db-list instead gates which catalogs the privilege check
/// applies membership against, outside of this row's own columns.
fn render_grant(alias: &str, privileges: &[parser::statement::Privilege], dbs: &[String], users: &[(String, String)]) -> String {
    let _ = dbs;
    let priv_name = render_privilege_name(privileges);
    let rows: Vec<String> =
        users.iter().map(|(host, user)| [quote(host), quote(user), quote(&priv_name)].join(",")).collect();
    format!("replace into {alias}.db(host, user, db)values({})", rows.join("),("))
}

fn render_revoke(alias: &str, privileges: &[parser::statement::Privilege], dbs: &[String], users: &[(String, String)]) -> String {
    let _ = dbs;
    let priv_name = render_privilege_name(privileges);
    let mut clauses = Vec::new();
    for (host, user) in users {
        clauses.push(format!("(host={} and user={} and db={})", quote(host), quote(user), quote(&priv_name)));
    }
    format!("delete from {alias}.db where {}", clauses.join(" or "))
}

fn render_privilege_name(privileges: &[parser::statement::Privilege]) -> String {
    privileges.iter().map(|p| p.as_str().to_ascii_lowercase()).collect::<Vec<_>>().join(",")
}

/// Per §4.2: "if not, emit ParseError(originalSQL)" — every rendered
/// statement must itself parse back as exactly one INSERT/UPDATE/DELETE
/// (REPLACE re-tags as INSERT, §4.1).
fn verify_reparses_as_single_command(sql: &str) -> Result<(), SqliteServerError> {
    use parser::cursor::StatementParser;
    use parser::statement::CommandTag;

    let mut p = StatementParser::new(sql);
    let first = p.next().map_err(|_| SqliteServerError::parse(0, sql.to_string()))?;
    let Some(first) = first else {
        return Err(SqliteServerError::parse(0, sql.to_string()));
    };
    if !matches!(first.tag, CommandTag::Insert | CommandTag::Update | CommandTag::Delete) {
        return Err(SqliteServerError::parse(0, sql.to_string()));
    }
    if p.next().map_err(|_| SqliteServerError::parse(0, sql.to_string()))?.is_some() {
        return Err(SqliteServerError::parse(0, sql.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use parser::statement::{CommandTag, DropUserTarget, Privilege};

    #[test]
    fn grant_renders_the_documented_form() {
        let stmt = Statement::new(
            CommandTag::Grant,
            "grant all on database testdb to test@localhost",
            StatementDetail::Grant {
                privileges: vec![Privilege::All],
                dbs: vec!["testdb".to_string()],
                users: vec![("localhost".to_string(), "test".to_string())],
            },
        );
        let rendered = render(&stmt, "'meta'").unwrap();
        assert_eq!(rendered, "replace into 'meta'.db(host, user, db)values('localhost','test','all')");
    }

    #[test]
    fn create_database_renders_insert_with_null_dir() {
        let stmt = Statement::new(
            CommandTag::CreateDatabase,
            "create database shop",
            StatementDetail::DatabaseDdl {
                create: true,
                if_exists_or_not: false,
                name: "Shop".to_string(),
                location: None,
            },
        );
        let rendered = render(&stmt, "'meta'").unwrap();
        assert_eq!(rendered, "insert into 'meta'.catalog(db, dir) values('shop', NULL)");
    }

    #[test]
    fn drop_user_renders_or_joined_delete() {
        let stmt = Statement::new(
            CommandTag::DropUser,
            "drop user bob, alice@localhost",
            StatementDetail::DropUser {
                targets: vec![
                    DropUserTarget { user: "bob".to_string(), host: "%".to_string(), protocol: None },
                    DropUserTarget { user: "alice".to_string(), host: "localhost".to_string(), protocol: None },
                ],
            },
        );
        let rendered = render(&stmt, "'meta'").unwrap();
        assert!(rendered.starts_with("delete from 'meta'.user where"));
        assert!(rendered.contains(" or "));
    }
}
