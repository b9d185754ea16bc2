//! RedbIndex - the durable metadata index backed by redb.
//!
//! One table maps raw key bytes to encoded records. Redb iterates keys in
//! lexicographic order, which is exactly what the prefix scans of the list
//! queries need. All database work runs on the blocking pool; redb commits
//! give the single-key durability the index contract asks for.

use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use volt_core::index::{IndexApi, prefix_end};
use volt_core::record::Record;

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("records");

#[derive(Clone)]
pub struct RedbIndex {
    db: Arc<Database>,
}

impl RedbIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = Database::create(path.join("index.redb"))?;

        // Ensure the records table exists before returning, so a fresh
        // database can take a read (e.g. a GET or list query) first.
        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(TABLE)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Arc::new(db) })
    }
}

impl std::fmt::Debug for RedbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbIndex").finish()
    }
}

#[async_trait::async_trait]
impl IndexApi for RedbIndex {
    async fn get(&self, key: &[u8]) -> anyhow::Result<Option<Record>> {
        let db = self.db.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Record>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;

            let maybe_record = table
                .get(key.as_slice())?
                .map(|guard| Record::decode(guard.value()))
                .transpose()?;

            Ok(maybe_record)
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb read task failed: {}", e))?
    }

    async fn put(&self, key: &[u8], record: &Record) -> anyhow::Result<()> {
        let db = self.db.clone();
        let key = key.to_vec();
        let encoded = record.encode()?;

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.insert(key.as_slice(), encoded.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb write task failed: {}", e))?
    }

    async fn remove(&self, key: &[u8]) -> anyhow::Result<()> {
        let db = self.db.clone();
        let key = key.to_vec();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(TABLE)?;
                table.remove(key.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb delete task failed: {}", e))?
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
    ) -> anyhow::Result<Vec<(Bytes, Record)>> {
        let db = self.db.clone();
        let lower = start.unwrap_or(prefix).to_vec();
        let upper = prefix_end(prefix);

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(Bytes, Record)>> {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(TABLE)?;

            let upper_bound = match upper.as_deref() {
                Some(end) => Bound::Excluded(end),
                None => Bound::Unbounded,
            };
            let mut out = Vec::new();
            for entry in table.range::<&[u8]>((Bound::Included(lower.as_slice()), upper_bound))? {
                let (key, value) = entry?;
                out.push((
                    Bytes::copy_from_slice(key.value()),
                    Record::decode(value.value())?,
                ));
            }
            Ok(out)
        })
        .await
        .map_err(|e| anyhow::anyhow!("redb scan task failed: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volt_core::record::Deleted;

    fn record(volumes: &[&str], deleted: Deleted) -> Record {
        Record::new(volumes.iter().map(|s| s.to_string()).collect(), deleted, None)
    }

    #[tokio::test]
    async fn test_point_ops_persist() {
        let dir = tempfile::tempdir().unwrap();
        let rec = record(&["v1/0", "v2/0"], Deleted::No);
        {
            let index = RedbIndex::open(dir.path()).unwrap();
            index.put(b"/hello", &rec).await.unwrap();
            assert_eq!(index.get(b"/hello").await.unwrap(), Some(rec.clone()));
        }
        // Reopen and read back.
        let index = RedbIndex::open(dir.path()).unwrap();
        assert_eq!(index.get(b"/hello").await.unwrap(), Some(rec));

        index.remove(b"/hello").await.unwrap();
        assert!(index.get(b"/hello").await.unwrap().is_none());
        index.remove(b"/hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let index = RedbIndex::open(dir.path()).unwrap();
        for key in ["/a", "/b", "/c"] {
            index
                .put(key.as_bytes(), &record(&["v1/0"], Deleted::No))
                .await
                .unwrap();
        }

        let all = index.scan_prefix(b"/", None).await.unwrap();
        let keys: Vec<_> = all.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec!["/a", "/b", "/c"]);

        let resumed = index.scan_prefix(b"/", Some(b"/b")).await.unwrap();
        assert_eq!(resumed.len(), 2);
        assert_eq!(resumed[0].0, "/b");
    }
}
