//! In-memory `IndexApi` implementation.
//!
//! Backed by a `BTreeMap` so prefix scans come out in lexicographic order,
//! matching the durable backends. Entries are stored in their encoded byte
//! form so the codec is exercised the same way the on-disk index exercises
//! it.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use bytes::Bytes;
use volt_core::index::{IndexApi, prefix_end};
use volt_core::record::Record;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(
    entries: &Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>> {
    entries
        .lock()
        .map_err(|_| anyhow::anyhow!("index mutex poisoned"))
}

#[async_trait::async_trait]
impl IndexApi for MemoryIndex {
    async fn get(&self, key: &[u8]) -> anyhow::Result<Option<Record>> {
        let entries = lock(&self.entries)?;
        entries
            .get(key)
            .map(|value| Record::decode(value))
            .transpose()
            .map_err(Into::into)
    }

    async fn put(&self, key: &[u8], record: &Record) -> anyhow::Result<()> {
        let encoded = record.encode()?;
        let mut entries = lock(&self.entries)?;
        entries.insert(key.to_vec(), encoded);
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> anyhow::Result<()> {
        let mut entries = lock(&self.entries)?;
        entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
    ) -> anyhow::Result<Vec<(Bytes, Record)>> {
        let lower = Bound::Included(start.unwrap_or(prefix).to_vec());
        let upper = match prefix_end(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        let entries = lock(&self.entries)?;
        let mut out = Vec::new();
        for (key, value) in entries.range((lower, upper)) {
            out.push((Bytes::copy_from_slice(key), Record::decode(value)?));
        }
        Ok(out)
    }
}
