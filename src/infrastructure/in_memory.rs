use crate::domain::offline::OfflineRecord;
use crate::domain::ports::OfflineLogStore;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory offline log.
///
/// Clones share the same records. Nothing survives the process, so this is meant for
/// tests and for runs that never go offline.
#[derive(Debug, Default, Clone)]
pub struct InMemoryOfflineLog {
    records: Arc<RwLock<Vec<OfflineRecord>>>,
}

impl InMemoryOfflineLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfflineLogStore for InMemoryOfflineLog {
    async fn append(&self, record: OfflineRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn records(&self) -> Result<Vec<OfflineRecord>> {
        let records = self.records.read().await;
        Ok(records.clone())
    }
}
