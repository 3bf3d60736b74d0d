// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - First cycle after a restart treats the IP as new (firewall rules are rewritten)
//
// ## When to Use
//
// - Testing environments
// - One-off runs where rewriting the rules on startup is harmless

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::state_store::{IpHistoryRecord, StateStore};

/// In-memory state store implementation
///
/// Clones share the same record.
///
/// # Example
///
/// ```rust
/// use dynfw_core::state::MemoryStateStore;
/// use dynfw_core::traits::state_store::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     assert!(store.check_and_update("1.2.3.4".parse()?).await?);
///     assert!(!store.check_and_update("1.2.3.4".parse()?).await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<IpHistoryRecord>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a record
    pub fn with_record(record: IpHistoryRecord) -> Self {
        Self {
            inner: Arc::new(RwLock::new(record)),
        }
    }

    /// Reset to the never-written state
    pub async fn clear(&self) {
        *self.inner.write().await = IpHistoryRecord::default();
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<IpHistoryRecord, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, record: &IpHistoryRecord) -> Result<(), Error> {
        *self.inner.write().await = record.clone();
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
