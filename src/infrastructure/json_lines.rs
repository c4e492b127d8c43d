use crate::domain::offline::OfflineRecord;
use crate::domain::ports::OfflineLogStore;
use crate::error::{FlowError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// File-backed offline log: one JSON document per line, opened in append mode.
///
/// Records are never rewritten. Concurrent appends through one instance are serialized.
#[derive(Debug)]
pub struct JsonLinesOfflineLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesOfflineLog {
    /// Uses the file at `path`, creating it on the first append.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OfflineLogStore for JsonLinesOfflineLog {
    async fn append(&self, record: OfflineRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        tracing::debug!(path = %self.path.display(), reference = %record.reference, "offline record appended");
        Ok(())
    }

    async fn records(&self) -> Result<Vec<OfflineRecord>> {
        let _guard = self.lock.lock().await;
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str::<OfflineRecord>(line).map_err(FlowError::from))
            .collect()
    }
}
