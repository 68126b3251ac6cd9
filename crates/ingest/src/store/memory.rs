use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::PersistenceError;
use crate::message::TickRow;
use crate::store::InsertStatement;
use crate::traits::{StoreSession, TickStore};

/// Tick store kept in process memory. Rows become visible on commit.
#[derive(Clone, Default)]
pub struct MemoryTickStore {
    rows: Arc<RwLock<Vec<TickRow>>>,
    commits: Arc<RwLock<u64>>,
}

impl MemoryTickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed rows in commit order
    pub async fn rows(&self) -> Vec<TickRow> {
        self.rows.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Number of committed sessions
    pub async fn commits(&self) -> u64 {
        *self.commits.read().await
    }
}

struct MemorySession {
    store: MemoryTickStore,
    pending: Vec<TickRow>,
}

#[async_trait]
impl TickStore for MemoryTickStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, PersistenceError> {
        Ok(Box::new(MemorySession {
            store: self.clone(),
            pending: Vec::new(),
        }))
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn execute(
        &mut self,
        _stmt: &InsertStatement,
        rows: &[TickRow],
    ) -> Result<(), PersistenceError> {
        self.pending.extend_from_slice(rows);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let MemorySession { store, pending } = *self;
        store.rows.write().await.extend(pending);
        *store.commits.write().await += 1;
        Ok(())
    }
}
