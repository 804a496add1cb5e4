//! Name-to-implementation lookup table with guarded registration.
//!
//! Used for both storage adapters and location transformers. Registration is
//! expected at process start-up; concurrent reads during normal operation are
//! safe. Clones share the underlying table.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Name {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Name {0} is not registered")]
    NotFound(String),
}

/// Mutable collection of named members.
///
/// Thread-safe via tokio's `RwLock`: multiple tasks can read members
/// simultaneously without blocking, while registration is serialized.
#[derive(Debug)]
pub struct Registry<V> {
    members: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> Clone for Registry<V> {
    fn clone(&self) -> Self {
        Registry {
            members: self.members.clone(),
        }
    }
}

impl<V: Clone> Registry<V> {
    pub fn new() -> Self {
        Registry {
            members: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a member to the registry.
    ///
    /// Fails if the name is already taken, unless `reset` is true, in which
    /// case the existing member is silently overwritten. The flag supports
    /// deliberate override scenarios, mostly in tests.
    pub async fn register(
        &self,
        name: impl Into<String>,
        member: V,
        reset: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let mut members = self.members.write().await;
        if !reset && members.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        members.insert(name, member);
        Ok(())
    }

    /// Get a member by name, failing with the missing key's name.
    pub async fn get(&self, name: &str) -> Result<V, RegistryError> {
        let members = self.members.read().await;
        members
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.members.read().await.contains_key(name)
    }

    /// Names of all registered members.
    pub async fn list(&self) -> Vec<String> {
        self.members.read().await.keys().cloned().collect()
    }

    pub async fn remove(&self, name: &str) -> Option<V> {
        self.members.write().await.remove(name)
    }

    /// Remove all members from the registry.
    pub async fn clear(&self) {
        self.members.write().await.clear();
    }
}

impl<V: Clone> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let registry: Registry<u32> = Registry::new();
        assert!(registry.list().await.is_empty());
        assert!(!registry.contains("one").await);
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = Registry::new();
        registry.register("one", 1, false).await.unwrap();
        assert_eq!(registry.get("one").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_names_the_key() {
        let registry: Registry<u32> = Registry::new();
        let err = registry.get("absent").await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound("absent".to_string()));
        assert!(err.to_string().contains("absent"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = Registry::new();
        registry.register("one", 1, false).await.unwrap();
        let err = registry.register("one", 2, false).await.unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("one".to_string()));
        assert_eq!(registry.get("one").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reset_overwrites() {
        let registry = Registry::new();
        registry.register("one", 1, false).await.unwrap();
        registry.register("one", 2, true).await.unwrap();
        assert_eq!(registry.get("one").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clone_shares_members() {
        let registry = Registry::new();
        let cloned = registry.clone();
        registry.register("one", 1, false).await.unwrap();
        assert_eq!(cloned.get("one").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let registry = Registry::new();
        registry.register("one", 1, false).await.unwrap();
        registry.register("two", 2, false).await.unwrap();
        assert_eq!(registry.remove("one").await, Some(1));
        assert_eq!(registry.remove("one").await, None);
        registry.clear().await;
        assert!(registry.list().await.is_empty());
    }
}
