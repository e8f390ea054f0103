//! Client registry
//!
//! Maps connection identifiers to client records and resolves display
//! names. Owned by the `ChatServer` actor, so every operation here is
//! atomic with respect to the others.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::client::ClientRecord;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::types::ConnId;

/// Registry of connected clients
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ConnId, ClientRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client under its default identity
    pub fn register(
        &mut self,
        id: ConnId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), AppError> {
        if self.clients.contains_key(&id) {
            return Err(AppError::AlreadyConnected(id));
        }
        self.clients.insert(id.clone(), ClientRecord::new(id, sender));
        Ok(())
    }

    /// Anonymous rename
    ///
    /// Returns the previous name if the name actually changed. Names
    /// held by another client's registered identity are refused.
    pub fn set_name(&mut self, id: &ConnId, name: &str) -> Result<Option<String>, AppError> {
        match self.clients.get(id) {
            Some(client) if client.name != name => {}
            _ => return Ok(None),
        }

        let protected = self
            .clients
            .values()
            .any(|c| &c.id != id && c.is_registered() && c.name == name);
        if protected {
            return Err(AppError::NameTaken(name.to_string()));
        }

        let Some(client) = self.clients.get_mut(id) else {
            return Ok(None);
        };
        let old = client.name.clone();
        client.set_name(name.to_string());
        Ok(Some(old))
    }

    /// Register a password-protected identity for a client
    ///
    /// Fails if any client currently uses the name, including the caller.
    pub fn set_credential(
        &mut self,
        id: &ConnId,
        name: &str,
        digest: String,
    ) -> Result<(), AppError> {
        if self.lookup_by_name(name).is_some() {
            return Err(AppError::NameTaken(name.to_string()));
        }
        if let Some(client) = self.clients.get_mut(id) {
            client.set_identity(name.to_string(), digest);
        }
        Ok(())
    }

    /// Take a registered identity whose digest was verified
    ///
    /// The digest must still be held under that name, otherwise the
    /// identity changed since verification. Returns the previous name
    /// if it changed.
    pub fn claim(
        &mut self,
        id: &ConnId,
        name: &str,
        digest: &str,
    ) -> Result<Option<String>, AppError> {
        if self.credential_for(name) != Some(digest) {
            return Err(AppError::NotRegistered(name.to_string()));
        }
        let Some(client) = self.clients.get_mut(id) else {
            return Ok(None);
        };
        let old = client.name.clone();
        client.set_identity(name.to_string(), digest.to_string());
        Ok((old != name).then_some(old))
    }

    /// Find a client by display name (linear scan)
    pub fn lookup_by_name(&self, name: &str) -> Option<&ClientRecord> {
        self.clients.values().find(|c| c.name == name)
    }

    /// Digest of the registered identity with this name
    pub fn credential_for(&self, name: &str) -> Option<&str> {
        self.clients
            .values()
            .filter(|c| c.name == name)
            .find_map(|c| c.credential.as_deref())
    }

    pub fn get(&self, id: &ConnId) -> Option<&ClientRecord> {
        self.clients.get(id)
    }

    /// Remove a client; no-op if absent
    pub fn remove(&mut self, id: &ConnId) -> Option<ClientRecord> {
        self.clients.remove(id)
    }

    /// Display name for a client, or the raw identifier once it is gone
    pub fn resolve_display_name(&self, id: &ConnId) -> String {
        self.clients
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Snapshot of every outbound channel, taken for one broadcast
    pub fn recipients(&self) -> Vec<(ConnId, mpsc::Sender<ServerMessage>)> {
        self.clients
            .values()
            .map(|c| (c.id.clone(), c.sender.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u16) -> ConnId {
        ConnId::new(format!("127.0.0.1:{}", 5000 + n))
    }

    fn registry_with(n: u16) -> (Registry, Vec<mpsc::Receiver<ServerMessage>>) {
        let mut registry = Registry::new();
        let mut receivers = Vec::new();
        for i in 0..n {
            let (tx, rx) = mpsc::channel(8);
            registry.register(id(i), tx).unwrap();
            receivers.push(rx);
        }
        (registry, receivers)
    }

    #[test]
    fn test_default_name_is_conn_id() {
        let (registry, _rx) = registry_with(3);
        for i in 0..3 {
            assert_eq!(registry.resolve_display_name(&id(i)), id(i).to_string());
        }
    }

    #[test]
    fn test_register_twice_fails() {
        let (mut registry, _rx) = registry_with(1);
        let (tx, _rx2) = mpsc::channel(8);

        assert!(matches!(
            registry.register(id(0), tx),
            Err(AppError::AlreadyConnected(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_name_reports_change() {
        let (mut registry, _rx) = registry_with(1);

        assert_eq!(
            registry.set_name(&id(0), "alice").unwrap(),
            Some(id(0).to_string())
        );
        assert_eq!(registry.set_name(&id(0), "alice").unwrap(), None);
        assert_eq!(registry.resolve_display_name(&id(0)), "alice");
    }

    #[test]
    fn test_anonymous_names_may_collide() {
        let (mut registry, _rx) = registry_with(2);

        registry.set_name(&id(0), "alice").unwrap();
        assert!(registry.set_name(&id(1), "alice").unwrap().is_some());
    }

    #[test]
    fn test_registered_name_is_protected() {
        let (mut registry, _rx) = registry_with(2);
        registry
            .set_credential(&id(0), "alice", "digest".into())
            .unwrap();

        assert!(matches!(
            registry.set_name(&id(1), "alice"),
            Err(AppError::NameTaken(_))
        ));
        assert_eq!(registry.resolve_display_name(&id(1)), id(1).to_string());
    }

    #[test]
    fn test_shared_registered_name_is_own_name() {
        let (mut registry, _rx) = registry_with(2);
        registry
            .set_credential(&id(0), "alice", "digest".into())
            .unwrap();
        registry.claim(&id(1), "alice", "digest").unwrap();

        assert_eq!(registry.set_name(&id(0), "alice").unwrap(), None);
        assert_eq!(registry.set_name(&id(1), "alice").unwrap(), None);
        assert!(registry.get(&id(1)).unwrap().is_registered());
    }

    #[test]
    fn test_set_credential_name_taken_leaves_state() {
        let (mut registry, _rx) = registry_with(2);
        registry
            .set_credential(&id(0), "alice", "first".into())
            .unwrap();

        assert!(matches!(
            registry.set_credential(&id(1), "alice", "second".into()),
            Err(AppError::NameTaken(_))
        ));
        assert_eq!(registry.credential_for("alice"), Some("first"));
        assert_eq!(registry.resolve_display_name(&id(1)), id(1).to_string());
        assert!(!registry.get(&id(1)).unwrap().is_registered());
    }

    #[test]
    fn test_claim_transfers_identity() {
        let (mut registry, _rx) = registry_with(2);
        registry
            .set_credential(&id(0), "alice", "digest".into())
            .unwrap();

        let old = registry.claim(&id(1), "alice", "digest").unwrap();
        assert_eq!(old, Some(id(1).to_string()));
        assert_eq!(registry.resolve_display_name(&id(1)), "alice");

        // Identity outlives the connection that registered it
        registry.remove(&id(0));
        assert_eq!(registry.credential_for("alice"), Some("digest"));
    }

    #[test]
    fn test_claim_with_stale_digest() {
        let (mut registry, _rx) = registry_with(2);
        registry
            .set_credential(&id(0), "alice", "digest".into())
            .unwrap();

        assert!(matches!(
            registry.claim(&id(1), "alice", "other"),
            Err(AppError::NotRegistered(_))
        ));
        assert!(matches!(
            registry.claim(&id(1), "nobody", "digest"),
            Err(AppError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_claim_own_name_is_unchanged() {
        let (mut registry, _rx) = registry_with(1);
        registry
            .set_credential(&id(0), "alice", "digest".into())
            .unwrap();

        assert_eq!(registry.claim(&id(0), "alice", "digest").unwrap(), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (mut registry, _rx) = registry_with(2);

        assert!(registry.remove(&id(0)).is_some());
        assert!(registry.remove(&id(0)).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve_display_name(&id(0)), id(0).to_string());
    }

    #[test]
    fn test_lookup_by_name() {
        let (mut registry, _rx) = registry_with(2);
        registry.set_name(&id(1), "bob").unwrap();

        assert_eq!(registry.lookup_by_name("bob").unwrap().id, id(1));
        assert!(registry.lookup_by_name("carol").is_none());
    }

    #[test]
    fn test_recipients_snapshot() {
        let (mut registry, _rx) = registry_with(3);
        let snapshot = registry.recipients();
        registry.remove(&id(0));

        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.recipients().len(), 2);
    }
}
