//! The metadata index seam.
//!
//! The master stores one [`Record`] per key in an ordered persistent map.
//! Backends implement [`IndexApi`]; the master never sees anything beyond
//! this trait. Writes are durable and atomic at single-key granularity.
//! The index itself provides no cross-call exclusion; the key-lock
//! registry serializes multi-step read-modify-write sequences above it.

use async_trait::async_trait;
use bytes::Bytes;

use crate::record::Record;

#[async_trait]
pub trait IndexApi: Send + Sync + 'static {
    /// Point lookup. `Ok(None)` means the key has no record (hard-deleted
    /// or never written).
    async fn get(&self, key: &[u8]) -> anyhow::Result<Option<Record>>;

    /// Point write, replacing any existing record.
    async fn put(&self, key: &[u8], record: &Record) -> anyhow::Result<()>;

    /// Point delete. Removing an absent key is not an error.
    async fn remove(&self, key: &[u8]) -> anyhow::Result<()>;

    /// All entries with keys in `[start.unwrap_or(prefix), end-of-prefix)`,
    /// in lexicographic key order. `start` replaces the lower bound
    /// verbatim, so a resume key outside the prefix range yields an empty
    /// scan rather than escaping it.
    async fn scan_prefix(
        &self,
        prefix: &[u8],
        start: Option<&[u8]>,
    ) -> anyhow::Result<Vec<(Bytes, Record)>>;
}

/// Exclusive upper bound for the set of keys starting with `prefix`: the
/// shortest byte string greater than every such key. `None` when no bound
/// exists (the prefix is empty or all `0xff`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last() {
        if *last == 0xff {
            end.pop();
        } else {
            *end.last_mut()? += 1;
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_end() {
        assert_eq!(prefix_end(b"/"), Some(b"0".to_vec()));
        assert_eq!(prefix_end(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(prefix_end(b"a\xff"), Some(b"b".to_vec()));
        assert_eq!(prefix_end(b"\xff\xff"), None);
        assert_eq!(prefix_end(b""), None);
    }
}
