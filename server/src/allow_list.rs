//! The server's host allow list (spec §4.6 "Holds the allow list (host ->
//! permitted)"), consulted by the accept loop before a channel is ever
//! handed to a worker (SPEC_FULL §"Supplemental features").

use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Default)]
pub struct AllowList {
    hosts: RwLock<HashSet<String>>,
}

impl AllowList {
    pub fn new() -> Self {
        AllowList::default()
    }

    pub fn from_hosts(hosts: impl IntoIterator<Item = String>) -> Self {
        AllowList { hosts: RwLock::new(hosts.into_iter().collect()) }
    }

    pub fn allow(&self, host: impl Into<String>) {
        self.hosts.write().unwrap().insert(host.into());
    }

    /// An empty allow list permits every host (the default, unconfigured
    /// state); a non-empty one permits only listed hosts or the `%`
    /// wildcard.
    pub fn is_permitted(&self, host: &str) -> bool {
        let hosts = self.hosts.read().unwrap();
        hosts.is_empty() || hosts.contains(host) || hosts.contains("%")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_allow_list_permits_everything() {
        let list = AllowList::new();
        assert!(list.is_permitted("10.0.0.1"));
    }

    #[test]
    fn non_empty_list_rejects_unlisted_hosts() {
        let list = AllowList::from_hosts(["10.0.0.1".to_string()]);
        assert!(list.is_permitted("10.0.0.1"));
        assert!(!list.is_permitted("10.0.0.2"));
    }

    #[test]
    fn wildcard_entry_permits_everything() {
        let list = AllowList::from_hosts(["%".to_string()]);
        assert!(list.is_permitted("anything"));
    }
}
