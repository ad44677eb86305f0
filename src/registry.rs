//! Membership registry: connection identity → display name.
//!
//! An owned registry with an explicit lifecycle — created empty at process
//! start, entries inserted on `register` and removed on `unregister` —
//! rather than an ambient mutable global. Entries are valid only while the
//! connection is live; the server unregisters on disconnect.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Maps live connections to their display names.
///
/// Usernames are not required to be unique; the connection id is the
/// identity.
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    users: RwLock<HashMap<Uuid, String>>,
}

impl MembershipRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a username for a connection.
    ///
    /// Idempotent per connection; a second call overwrites the previous
    /// name.
    pub async fn register(&self, connection_id: Uuid, username: impl Into<String>) {
        let mut users = self.users.write().await;
        users.insert(connection_id, username.into());
    }

    /// Remove a connection's entry. No-op when the id is already absent.
    pub async fn unregister(&self, connection_id: Uuid) {
        let mut users = self.users.write().await;
        users.remove(&connection_id);
    }

    /// Look up the display name for a connection.
    pub async fn username(&self, connection_id: &Uuid) -> Option<String> {
        self.users.read().await.get(connection_id).cloned()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = MembershipRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id, "alice").await;
        assert_eq!(registry.username(&id).await, Some("alice".to_string()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry = MembershipRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id, "alice").await;
        registry.register(id, "alicia").await;
        assert_eq!(registry.username(&id).await, Some("alicia".to_string()));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = MembershipRegistry::new();
        let id = Uuid::new_v4();

        registry.register(id, "alice").await;
        registry.unregister(id).await;
        assert_eq!(registry.username(&id).await, None);

        // Absent id: safe no-op.
        registry.unregister(id).await;
        registry.unregister(Uuid::new_v4()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_usernames_allowed() {
        let registry = MembershipRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.register(a, "alice").await;
        registry.register(b, "alice").await;
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.username(&a).await, registry.username(&b).await);
    }
}
