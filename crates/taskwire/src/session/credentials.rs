/*
[INPUT]:  Credentials registered per protection space
[OUTPUT]: Session-wide default credential lookup for challenges
[POS]:    Session layer - credential store
[UPDATE]: When changing credential matching
*/

use std::collections::HashMap;
use std::sync::RwLock;

use crate::sync::{read, write};
use crate::types::{Credential, ProtectionSpace};

/// Default credentials shared by every task of a session
#[derive(Debug, Default)]
pub struct CredentialStore {
    defaults: RwLock<HashMap<ProtectionSpace, Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the default credential for `space`, returning the previous one
    pub fn set_default(&self, space: ProtectionSpace, credential: Credential) -> Option<Credential> {
        write(&self.defaults).insert(space, credential)
    }

    pub fn remove_default(&self, space: &ProtectionSpace) -> Option<Credential> {
        write(&self.defaults).remove(space)
    }

    /// Exact match first, then an entry for the same host, port and scheme
    /// stored without a realm
    pub fn default_for(&self, space: &ProtectionSpace) -> Option<Credential> {
        let defaults = read(&self.defaults);
        if let Some(credential) = defaults.get(space) {
            return Some(credential.clone());
        }
        let any_realm = ProtectionSpace {
            realm: None,
            ..space.clone()
        };
        defaults.get(&any_realm).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.defaults).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthenticationMethod;

    fn space(realm: Option<&str>) -> ProtectionSpace {
        ProtectionSpace {
            host: "api.example.com".to_string(),
            port: Some(443),
            realm: realm.map(str::to_string),
            method: AuthenticationMethod::HttpBasic,
        }
    }

    #[test]
    fn test_realmless_entry_matches_any_realm() {
        let store = CredentialStore::new();
        store.set_default(space(None), Credential::user_password("u", "p"));

        assert_eq!(
            store.default_for(&space(Some("admin"))),
            Some(Credential::user_password("u", "p"))
        );
    }

    #[test]
    fn test_exact_realm_wins() {
        let store = CredentialStore::new();
        store.set_default(space(None), Credential::user_password("any", "1"));
        store.set_default(space(Some("admin")), Credential::user_password("admin", "2"));

        assert_eq!(
            store.default_for(&space(Some("admin"))),
            Some(Credential::user_password("admin", "2"))
        );
        assert_eq!(store.len(), 2);
        store.remove_default(&space(None));
        assert!(store.default_for(&space(Some("other"))).is_none());
    }
}
