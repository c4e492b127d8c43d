use crate::domain::offline::OfflineRecord;
use crate::domain::ports::OfflineLogStore;
use crate::error::{FlowError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Column Family holding offline records.
pub const CF_OFFLINE_RECORDS: &str = "offline_records";

/// A persistent offline log backed by RocksDB.
///
/// Keys are a big-endian sequence number followed by the record reference, so
/// iterating the column family returns records in append order and no key is ever
/// written twice.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbOfflineLog {
    db: Arc<DB>,
    next_seq: Arc<AtomicU64>,
}

impl RocksDbOfflineLog {
    /// Opens or creates a RocksDB instance at the specified path and resumes the
    /// sequence after the last stored record.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_records = ColumnFamilyDescriptor::new(CF_OFFLINE_RECORDS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_records])?;

        let next_seq = {
            let cf = column_family(&db)?;
            match db.iterator_cf(cf, IteratorMode::End).next() {
                Some(item) => {
                    let (key, _) = item?;
                    sequence_of(&key)? + 1
                }
                None => 0,
            }
        };

        Ok(Self {
            db: Arc::new(db),
            next_seq: Arc::new(AtomicU64::new(next_seq)),
        })
    }
}

fn column_family(db: &DB) -> Result<&ColumnFamily> {
    db.cf_handle(CF_OFFLINE_RECORDS).ok_or_else(|| {
        FlowError::InternalError(Box::new(std::io::Error::other(
            "Offline records column family not found",
        )))
    })
}

fn sequence_of(key: &[u8]) -> Result<u64> {
    key.get(..8)
        .and_then(|prefix| <[u8; 8]>::try_from(prefix).ok())
        .map(u64::from_be_bytes)
        .ok_or_else(|| {
            FlowError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Offline record key is shorter than its sequence prefix",
            )))
        })
}

#[async_trait]
impl OfflineLogStore for RocksDbOfflineLog {
    async fn append(&self, record: OfflineRecord) -> Result<()> {
        let cf = column_family(&self.db)?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut key = seq.to_be_bytes().to_vec();
        key.extend_from_slice(record.reference.as_bytes());
        let value = serde_json::to_vec(&record)?;

        self.db.put_cf(cf, key, value)?;

        Ok(())
    }

    async fn records(&self) -> Result<Vec<OfflineRecord>> {
        let cf = column_family(&self.db)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }

        Ok(records)
    }
}
