//! Host storage abstraction.
//!
//! The engine never owns persistence; roles are kept wherever the host's
//! storage puts them. [`InMemoryStorage`] serves tests and standalone use.

use crate::error::ArtifactoryResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Key-value storage provided by the host.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Value stored under `key`, if any.
    async fn get(&self, key: &str) -> ArtifactoryResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> ArtifactoryResult<()>;

    /// Remove `key`; removing a missing key is not an error.
    async fn delete(&self, key: &str) -> ArtifactoryResult<()>;

    /// Keys directly under `prefix`, with the prefix stripped, in sorted order.
    async fn list(&self, prefix: &str) -> ArtifactoryResult<Vec<String>>;
}

/// Process-local storage backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn get(&self, key: &str) -> ArtifactoryResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> ArtifactoryResult<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ArtifactoryResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> ArtifactoryResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .map_while(|(key, _)| key.strip_prefix(prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = InMemoryStorage::new();
        assert!(storage.get("role/a").await.unwrap().is_none());

        storage.put("role/a", b"one".to_vec()).await.unwrap();
        storage.put("role/a", b"two".to_vec()).await.unwrap();
        assert_eq!(storage.get("role/a").await.unwrap(), Some(b"two".to_vec()));

        storage.delete("role/a").await.unwrap();
        storage.delete("role/a").await.unwrap();
        assert!(storage.get("role/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_scoped() {
        let storage = InMemoryStorage::new();
        for key in ["role/b", "role/a", "role/a/nested", "roles", "config"] {
            storage.put(key, Vec::new()).await.unwrap();
        }

        assert_eq!(storage.list("role/").await.unwrap(), vec!["a", "b"]);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }
}
