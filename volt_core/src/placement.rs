//! Deterministic key placement.
//!
//! Two independent derivations hang off every key:
//!
//! - [`key2path`] fixes where a blob lives *within* a volume: a 64-byte
//!   BLAKE3 digest of the key, rendered as `/aa/bb/<124 hex>` so volumes can
//!   fan files out across two directory levels. The `.key` sidecar next to
//!   the blob holds the raw key bytes.
//! - [`key2volume`] fixes *which* volumes hold the blob, via rendezvous
//!   (highest-random-weight) hashing: every `(key, volume)` pair scores
//!   independently and the top `replicas` volumes win. Adding or removing a
//!   volume therefore only reassigns the keys that volume would have won.
//!
//! Both are pinned by test vectors below. They are wire/disk-stable: a
//! change makes every existing blob invisible to the master.

/// On-volume path for a key: `/aa/bb/<remaining 124 hex chars>` of the
/// 64-byte BLAKE3 digest of the key.
pub fn key2path(key: &[u8]) -> String {
    let mut digest = [0u8; 64];
    blake3::Hasher::new()
        .update(key)
        .finalize_xof()
        .fill(&mut digest);
    let hex = hex::encode(digest);
    format!("/{}/{}/{}", &hex[0..2], &hex[2..4], &hex[4..])
}

/// Replica placement for a key: the `replicas` highest-scoring volumes in
/// descending score order, each with a subvolume index appended
/// (`"host:port/3"`).
///
/// The score for a `(key, volume)` pair is the big-endian `u64` of the first
/// eight bytes of `md5(key || volume)`; the subvolume index comes from bytes
/// 12..16 of the same digest, reduced modulo `subvolumes`. Scoring is stable
/// in the volume *name*, not its position in the configuration.
pub fn key2volume(key: &[u8], volumes: &[String], replicas: usize, subvolumes: u32) -> Vec<String> {
    let mut scored: Vec<(u64, String)> = volumes
        .iter()
        .map(|volume| {
            let mut buf = Vec::with_capacity(key.len() + volume.len());
            buf.extend_from_slice(key);
            buf.extend_from_slice(volume.as_bytes());
            let d = md5::compute(&buf).0;
            let score = u64::from_be_bytes([d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]]);
            let subvolume = u32::from_be_bytes([d[12], d[13], d[14], d[15]]) % subvolumes;
            (score, format!("{volume}/{subvolume}"))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(replicas)
        .map(|(_, volume)| volume)
        .collect()
}

/// True iff the stored replica set differs from the canonical one.
///
/// Order-insensitive: replica preference order may legitimately differ
/// between an old record and the current canonical derivation without any
/// data being on the wrong volume.
pub fn needs_rebalance(current: &[String], canonical: &[String]) -> bool {
    if current.len() != canonical.len() {
        return true;
    }
    let mut current = current.to_vec();
    let mut canonical = canonical.to_vec();
    current.sort();
    canonical.sort();
    current != canonical
}
