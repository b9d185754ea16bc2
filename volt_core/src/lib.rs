//! Core types and pure logic shared by all Volt crates.
//!
//! The master's behavior is built out of four small pieces that live here:
//!
//! - Placement (`placement`): deterministic key → on-volume path and
//!   key → replica-set derivation. These functions are pinned by test
//!   vectors; changing them moves every blob's on-disk location.
//! - The key record (`record`): the metadata value stored per key, with
//!   its legacy prefix-tag byte codec.
//! - The metadata index seam (`index::IndexApi`): an ordered persistent
//!   key → record mapping with prefix scans. Backends live in `indexes/`.
//! - The key-lock registry (`lock::KeyLocks`): process-wide mutual
//!   exclusion for mutating operations on a single key.

pub mod index;
pub mod lock;
pub mod placement;
pub mod record;

pub use index::IndexApi;
pub use lock::{KeyLockGuard, KeyLocks};
pub use placement::{key2path, key2volume, needs_rebalance};
pub use record::{Deleted, Record, RecordError};
