//! Remote key-value store abstraction.
//!
//! The persistent half of the subscription index lives in a store shared by
//! every node of the cluster. The trait below captures the set and hash
//! operations the index needs, allowing different backends:
//! - `MemoryStore` - In-process store for tests and single-node deployments
//! - Redis or any other networked key-value service in production

mod error;
mod memory;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;

use async_trait::async_trait;

/// Async set/hash operations against the shared store.
///
/// All values are strings; QoS levels are stored as decimal ASCII. Removing
/// members from a missing key is a no-op, never an error.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    // ========================================================================
    // Sets
    // ========================================================================

    /// Add a member to the set at `key`
    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    /// Remove members from the set at `key`
    async fn set_remove(&self, key: &str, members: &[String]) -> Result<()>;

    /// All members of the set at `key` (empty if the key is missing)
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Delete the set at `key`
    async fn set_delete(&self, key: &str) -> Result<()>;

    // ========================================================================
    // Hashes
    // ========================================================================

    /// Set `field` to `value` in the hash at `key`, replacing any prior value
    async fn hash_put(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Remove `field` from the hash at `key`
    async fn hash_remove(&self, key: &str, field: &str) -> Result<()>;

    /// All `(field, value)` entries of the hash at `key`
    async fn hash_entries(&self, key: &str) -> Result<Vec<(String, String)>>;
}
