//! In-memory store backend.

use ahash::{AHashMap, AHashSet};
use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::Result;
use super::RemoteStore;

/// In-process implementation of [`RemoteStore`].
///
/// Backs tests and single-node deployments where no external store is
/// available. Sets and hashes live in separate keyspaces, mirroring how a
/// networked store types its keys.
#[derive(Default)]
pub struct MemoryStore {
    sets: RwLock<AHashMap<String, AHashSet<String>>>,
    hashes: RwLock<AHashMap<String, AHashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<()> {
        if let Some(set) = self.sets.write().get_mut(key) {
            for member in members {
                set.remove(member);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .read()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_delete(&self, key: &str) -> Result<()> {
        self.sets.write().remove(key);
        Ok(())
    }

    async fn hash_put(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hashes
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_remove(&self, key: &str, field: &str) -> Result<()> {
        if let Some(hash) = self.hashes.write().get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .hashes
            .read()
            .get(key)
            .map(|hash| hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryStore::new();

        store.set_add("topics", "a/b").await.unwrap();
        store.set_add("topics", "a/+").await.unwrap();
        store.set_add("topics", "a/b").await.unwrap();

        let mut members = store.set_members("topics").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a/+".to_string(), "a/b".to_string()]);

        store
            .set_remove("topics", &["a/b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.set_members("topics").await.unwrap(), vec!["a/+"]);

        store.set_delete("topics").await.unwrap();
        assert!(store.set_members("topics").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_remove_missing_key_is_noop() {
        let store = MemoryStore::new();
        store
            .set_remove("absent", &["x".to_string()])
            .await
            .unwrap();
        assert!(store.set_members("absent").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();

        store.hash_put("topic:t", "c1", "0").await.unwrap();
        store.hash_put("topic:t", "c2", "1").await.unwrap();
        // Re-put replaces the prior value
        store.hash_put("topic:t", "c1", "2").await.unwrap();

        let mut entries = store.hash_entries("topic:t").await.unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                ("c1".to_string(), "2".to_string()),
                ("c2".to_string(), "1".to_string())
            ]
        );

        store.hash_remove("topic:t", "c1").await.unwrap();
        let entries = store.hash_entries("topic:t").await.unwrap();
        assert_eq!(entries, vec![("c2".to_string(), "1".to_string())]);
    }
}
