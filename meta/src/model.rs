use std::collections::BTreeSet;

use parser::statement::Privilege;

/// Auth method a stored user is validated with (§3 "User").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Md5,
    Password,
    Trust,
}

impl AuthMethod {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "md5" => AuthMethod::Md5,
            "password" => AuthMethod::Password,
            "trust" => AuthMethod::Trust,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Md5 => "md5",
            AuthMethod::Password => "password",
            AuthMethod::Trust => "trust",
        }
    }
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Md5
    }
}

/// (host, user, protocol) is the identity key (§3 "User").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserKey {
    pub host: String,
    pub user: String,
    pub protocol: String,
}

impl UserKey {
    pub fn new(host: impl Into<String>, user: impl Into<String>, protocol: impl Into<String>) -> Self {
        UserKey { host: host.into(), user: user.into(), protocol: protocol.into() }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub key: UserKey,
    pub stored_password: String,
    pub auth_method: AuthMethod,
    pub superuser: bool,
}

/// A (host, user, db, privilege) grant (§3 "User" — Privileges).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grant {
    pub host: String,
    pub user: String,
    pub db: String,
    pub privilege: Privilege,
}

/// `(db-name) -> optional data directory override` (§3 "Catalog").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub db: String,
    pub dir: Option<String>,
}

/// In-memory mirror of the meta database's three tables, used by the
/// server crate's privilege/allow-list checks and by the renderer's
/// round-trip test (§4.2 "Responsibilities").
#[derive(Debug, Clone, Default)]
pub struct MetaRegistry {
    pub users: Vec<User>,
    pub grants: BTreeSet<(String, String, String, &'static str)>,
    pub catalogs: Vec<Catalog>,
}

impl MetaRegistry {
    pub fn new() -> Self {
        MetaRegistry::default()
    }

    pub fn find_user(&self, host: &str, user: &str, protocol: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.key.host == host && u.key.user == user && u.key.protocol == protocol)
    }

    pub fn host_allowed(&self, host: &str) -> bool {
        self.users.iter().any(|u| u.key.host == host || u.key.host == "%")
    }

    pub fn has_privilege(&self, host: &str, user: &str, db: &str, privilege: Privilege) -> bool {
        let name = privilege.as_str();
        self.grants.contains(&(host.to_string(), user.to_string(), db.to_string(), name))
            || (privilege != Privilege::All
                && self.grants.contains(&(host.to_string(), user.to_string(), db.to_string(), "ALL")))
    }

    pub fn find_catalog(&self, db: &str) -> Option<&Catalog> {
        self.catalogs.iter().find(|c| c.db == db)
    }
}
