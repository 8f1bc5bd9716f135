//! The shared meta database handle (spec §4.2). Reads are lock-free
//! snapshots; writes are serialized by a `RwLock` the way spec §5 describes
//! ("Meta database: serialized by the engine's own connection semantics;
//! only the process-wide write lock need be held across write-affecting
//! meta statements" — here realized with an in-process lock standing in for
//! that serialization since this workspace has no real storage engine to
//! delegate to).

use std::fs;
use std::path::Path;
use std::sync::RwLock;

use common::err::{SqliteServerError, SsResult};
use meta::model::{AuthMethod, Catalog, Grant, MetaRegistry, User, UserKey};
use parser::statement::{Privilege, Statement, StatementDetail};

/// Name of the file `initdb` leaves behind in the data directory so a later
/// `sqlited-server` run can re-bootstrap the same super-admin row. The meta
/// database itself is in-process only (no storage engine is implemented
/// here), so this one hash is the only state that actually survives a
/// restart.
const BOOTSTRAP_FILE_NAME: &str = "meta_bootstrap";

/// Persists the super-admin password hash `initdb` produced, to be picked
/// back up by `load_bootstrap_hash` at server startup.
pub fn write_bootstrap_hash(data_dir: &Path, password_hash: &str) -> SsResult<()> {
    fs::write(data_dir.join(BOOTSTRAP_FILE_NAME), password_hash).map_err(SqliteServerError::Io)
}

/// Reads back the hash `write_bootstrap_hash` wrote, if `initdb` has been run
/// against this data directory.
pub fn load_bootstrap_hash(data_dir: &Path) -> Option<String> {
    fs::read_to_string(data_dir.join(BOOTSTRAP_FILE_NAME)).ok()
}

/// Deterministic schema alias the meta tables are attached under (spec
/// §4.2 "Attach to any processor's connection under a deterministic schema
/// alias").
pub const META_ALIAS: &str = "meta";

pub struct MetaDb {
    registry: RwLock<MetaRegistry>,
}

impl Default for MetaDb {
    fn default() -> Self {
        MetaDb { registry: RwLock::new(MetaRegistry::new()) }
    }
}

impl MetaDb {
    pub fn new() -> Self {
        MetaDb::default()
    }

    /// Bootstraps the super-admin row `initdb` creates (spec §6 CLI).
    pub fn bootstrap_super_admin(&self, password_hash: String) {
        let mut reg = self.registry.write().unwrap();
        reg.users.push(User {
            key: UserKey::new("%", "root", "pg"),
            stored_password: password_hash,
            auth_method: AuthMethod::Md5,
            superuser: true,
        });
    }

    pub fn find_user(&self, host: &str, user: &str, protocol: &str) -> Option<User> {
        self.registry.read().unwrap().find_user(host, user, protocol).cloned()
    }

    pub fn host_allowed(&self, host: &str) -> bool {
        self.registry.read().unwrap().host_allowed(host)
    }

    pub fn has_privilege(&self, host: &str, user: &str, db: &str, privilege: Privilege) -> bool {
        let reg = self.registry.read().unwrap();
        reg.users.iter().any(|u| u.key.host == host && u.key.user == user && u.superuser)
            || reg.has_privilege(host, user, db, privilege)
    }

    pub fn find_catalog(&self, db: &str) -> Option<Catalog> {
        self.registry.read().unwrap().find_catalog(db).cloned()
    }

    /// The SQL text `render` produces for `stmt` against `META_ALIAS`,
    /// exposed so the processor can log/replay it the way the design's
    /// "render the statement's effect as SQL against that registry"
    /// contract describes (spec §4.2 responsibilities).
    pub fn render(&self, stmt: &Statement) -> SsResult<String> {
        meta::render::render(stmt, &format!("'{}'", META_ALIAS))
    }

    /// Applies a meta-affecting statement's effect to the in-memory
    /// registry. This is the server's stand-in for actually running
    /// `render`'s SQL against a real attached meta database file (spec §1
    /// Non-goals: no storage engine is implemented here).
    pub fn apply(&self, stmt: &Statement) -> SsResult<()> {
        // Exercise the rendering contract on every write so a regression
        // there (e.g. a non-reparsing template) surfaces immediately,
        // matching §4.2 "if not, emit ParseError(originalSQL)".
        let _ = self.render(stmt)?;

        let mut reg = self.registry.write().unwrap();
        match &stmt.detail {
            StatementDetail::CreateUser { user, host, superuser, identified_by, identified_with } => {
                let protocol = identified_with.as_ref().map(|(p, _)| p.clone()).unwrap_or_else(|| "pg".to_string());
                let auth_method = identified_with
                    .as_ref()
                    .and_then(|(_, m)| AuthMethod::parse(m))
                    .unwrap_or(AuthMethod::Md5);
                reg.users.push(User {
                    key: UserKey::new(host.clone(), user.clone(), protocol),
                    stored_password: identified_by.clone().unwrap_or_default(),
                    auth_method,
                    superuser: superuser.unwrap_or(false),
                });
                Ok(())
            }
            StatementDetail::AlterUser { user, host, superuser, identified_by, identified_with } => {
                let found = reg.users.iter_mut().find(|u| &u.key.user == user && &u.key.host == host);
                let Some(u) = found else {
                    return Err(SqliteServerError::PermissionDenied(format!("no such user {user}@{host}")));
                };
                if let Some(sa) = superuser {
                    u.superuser = *sa;
                }
                if let Some(pw) = identified_by {
                    u.stored_password = pw.clone();
                }
                if let Some((_, method)) = identified_with {
                    if let Some(m) = AuthMethod::parse(method) {
                        u.auth_method = m;
                    }
                }
                Ok(())
            }
            StatementDetail::DropUser { targets } => {
                reg.users.retain(|u| {
                    !targets.iter().any(|t| t.user == u.key.user && t.host == u.key.host)
                });
                Ok(())
            }
            StatementDetail::DatabaseDdl { create: true, name, location, .. } => {
                let db = name.to_ascii_lowercase();
                if reg.catalogs.iter().any(|c| c.db == db) {
                    return Err(SqliteServerError::UniqueViolation(format!("database {db} already exists")));
                }
                reg.catalogs.push(Catalog { db, dir: location.clone() });
                Ok(())
            }
            StatementDetail::DatabaseDdl { create: false, name, .. } => {
                let db = name.to_ascii_lowercase();
                reg.catalogs.retain(|c| c.db != db);
                Ok(())
            }
            StatementDetail::Grant { privileges, dbs, users } => {
                for (host, user) in users {
                    for db in dbs {
                        for privilege in privileges {
                            reg.grants.insert((host.clone(), user.clone(), db.clone(), privilege.as_str()));
                        }
                    }
                }
                Ok(())
            }
            StatementDetail::Revoke { privileges, dbs, users } => {
                for (host, user) in users {
                    for db in dbs {
                        for privilege in privileges {
                            reg.grants.remove(&(host.clone(), user.clone(), db.clone(), privilege.as_str()));
                        }
                    }
                }
                Ok(())
            }
            other => Err(SqliteServerError::Protocol(format!("{other:?} is not a meta-affecting statement"))),
        }
    }

    pub fn snapshot(&self) -> MetaRegistry {
        self.registry.read().unwrap().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parser::statement::CommandTag;

    fn stmt(tag: CommandTag, raw: &str, detail: StatementDetail) -> Statement {
        Statement::new(tag, raw, detail)
    }

    #[test]
    fn full_user_and_database_lifecycle_returns_to_empty_state() {
        let db = MetaDb::new();

        db.apply(&stmt(
            CommandTag::CreateUser,
            "create user 'u'@'%'",
            StatementDetail::CreateUser {
                user: "u".to_string(),
                host: "%".to_string(),
                superuser: None,
                identified_by: None,
                identified_with: None,
            },
        ))
        .unwrap();

        db.apply(&stmt(
            CommandTag::CreateDatabase,
            "create database d",
            StatementDetail::DatabaseDdl { create: true, if_exists_or_not: false, name: "d".to_string(), location: None },
        ))
        .unwrap();

        db.apply(&stmt(
            CommandTag::Grant,
            "grant all on database d to u@%",
            StatementDetail::Grant {
                privileges: vec![Privilege::All],
                dbs: vec!["d".to_string()],
                users: vec![("%".to_string(), "u".to_string())],
            },
        ))
        .unwrap();
        assert!(db.has_privilege("%", "u", "d", Privilege::All));

        db.apply(&stmt(
            CommandTag::Revoke,
            "revoke all on database d from u@%",
            StatementDetail::Revoke {
                privileges: vec![Privilege::All],
                dbs: vec!["d".to_string()],
                users: vec![("%".to_string(), "u".to_string())],
            },
        ))
        .unwrap();

        db.apply(&stmt(
            CommandTag::DropUser,
            "drop user u",
            StatementDetail::DropUser {
                targets: vec![parser::statement::DropUserTarget { user: "u".to_string(), host: "%".to_string(), protocol: None }],
            },
        ))
        .unwrap();

        db.apply(&stmt(
            CommandTag::DropDatabase,
            "drop database d",
            StatementDetail::DatabaseDdl { create: false, if_exists_or_not: false, name: "d".to_string(), location: None },
        ))
        .unwrap();

        let snapshot = db.snapshot();
        assert!(snapshot.users.is_empty());
        assert!(snapshot.catalogs.is_empty());
        assert!(snapshot.grants.is_empty());
    }

    #[test]
    fn duplicate_database_is_a_unique_violation() {
        let db = MetaDb::new();
        let create = stmt(
            CommandTag::CreateDatabase,
            "create database d",
            StatementDetail::DatabaseDdl { create: true, if_exists_or_not: false, name: "d".to_string(), location: None },
        );
        db.apply(&create).unwrap();
        assert!(db.apply(&create).is_err());
    }
}
