//! The per-key metadata record and its byte codec.
//!
//! A record names the volumes that hold (or are meant to hold) a key's
//! replicas, the key's lifecycle state, and an optional MD5 content digest.
//! On disk it is a single byte string with a prefix-tag grammar, consumed
//! left to right:
//!
//! ```text
//! record   := [ "DELETED" | "INIT" ]? [ "HASH" <32 hex chars> ]? volumes
//! volumes  := vol ( "," vol )*
//! ```
//!
//! The grammar has no delimiters between tags; it stays unambiguous because
//! every token is fixed-width (`"DELETED"`, `"INIT"`, `"HASH"` plus exactly
//! 32 hex characters). `Hard` is never encoded; a hard delete removes the
//! record from the index instead.

use std::fmt;

const TAG_DELETED: &[u8] = b"DELETED";
const TAG_INIT: &[u8] = b"INIT";
const TAG_HASH: &[u8] = b"HASH";

/// Length of an encoded content digest (MD5, lowercase hex).
pub const HASH_LEN: usize = 32;

/// Lifecycle state of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deleted {
    /// Live: the record's volumes held the blob at the last successful write.
    No,
    /// Soft-deleted: record retained, key unavailable, volumes may still
    /// hold data.
    Soft,
    /// Hard-deleted: the record is gone from the index. Only ever observed
    /// as the synthesized state of an absent record.
    Hard,
    /// Write in progress: replicas may be partially populated.
    Init,
}

/// Errors from the record codec.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    #[error("hard-deleted records are never encoded")]
    EncodeHard,

    #[error("invalid hash length: expected {HASH_LEN}, got {0}")]
    InvalidHashLength(usize),

    #[error("truncated hash: {0} bytes after HASH tag")]
    TruncatedHash(usize),

    #[error("record is not valid utf-8")]
    InvalidUtf8,
}

/// The metadata value stored under a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Volume endpoints (`"host:port/subvolume"`) holding the replicas, in
    /// replica-preference order.
    pub volumes: Vec<String>,
    /// Lifecycle state.
    pub deleted: Deleted,
    /// Lowercase hex MD5 of the content, if it was computed at write time.
    pub hash: Option<String>,
}

impl Record {
    pub fn new(volumes: Vec<String>, deleted: Deleted, hash: Option<String>) -> Self {
        Self {
            volumes,
            deleted,
            hash,
        }
    }

    /// The synthesized record for a key with no index entry.
    pub fn hard_deleted() -> Self {
        Self {
            volumes: Vec::new(),
            deleted: Deleted::Hard,
            hash: None,
        }
    }

    /// Encodes the record into its byte representation.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let mut out = Vec::new();
        match self.deleted {
            Deleted::No => {}
            Deleted::Soft => out.extend_from_slice(TAG_DELETED),
            Deleted::Init => out.extend_from_slice(TAG_INIT),
            Deleted::Hard => return Err(RecordError::EncodeHard),
        }
        if let Some(hash) = &self.hash {
            if hash.len() != HASH_LEN {
                return Err(RecordError::InvalidHashLength(hash.len()));
            }
            out.extend_from_slice(TAG_HASH);
            out.extend_from_slice(hash.as_bytes());
        }
        out.extend_from_slice(self.volumes.join(",").as_bytes());
        Ok(out)
    }

    /// Decodes a record from its byte representation.
    pub fn decode(data: &[u8]) -> Result<Self, RecordError> {
        let mut rest = data;
        let deleted = if let Some(tail) = rest.strip_prefix(TAG_DELETED) {
            rest = tail;
            Deleted::Soft
        } else if let Some(tail) = rest.strip_prefix(TAG_INIT) {
            rest = tail;
            Deleted::Init
        } else {
            Deleted::No
        };

        let mut hash = None;
        if let Some(tail) = rest.strip_prefix(TAG_HASH) {
            if tail.len() < HASH_LEN {
                return Err(RecordError::TruncatedHash(tail.len()));
            }
            let (digest, tail) = tail.split_at(HASH_LEN);
            let digest = std::str::from_utf8(digest).map_err(|_| RecordError::InvalidUtf8)?;
            hash = Some(digest.to_string());
            rest = tail;
        }

        let volumes = std::str::from_utf8(rest)
            .map_err(|_| RecordError::InvalidUtf8)?
            .split(',')
            .map(String::from)
            .collect();

        Ok(Self {
            volumes,
            deleted,
            hash,
        })
    }
}

impl fmt::Display for Deleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Deleted::No => "live",
            Deleted::Soft => "soft-deleted",
            Deleted::Hard => "hard-deleted",
            Deleted::Init => "initializing",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(volumes: &[&str], deleted: Deleted, hash: &str) -> Record {
        Record::new(
            volumes.iter().map(|s| s.to_string()).collect(),
            deleted,
            if hash.is_empty() {
                None
            } else {
                Some(hash.to_string())
            },
        )
    }

    fn roundtrip(rec: Record, encoded: &str) {
        let bytes = rec.encode().unwrap();
        assert_eq!(bytes, encoded.as_bytes(), "encoding of {rec:?}");
        assert_eq!(Record::decode(&bytes).unwrap(), rec);
    }

    const MD5_HELLO: &str = "5d41402abc4b2a76b9719d911017c592";

    #[test]
    fn test_record_roundtrip_vectors() {
        roundtrip(
            record(&["hello", "world"], Deleted::Soft, ""),
            "DELETEDhello,world",
        );
        roundtrip(record(&["hello", "world"], Deleted::No, ""), "hello,world");
        roundtrip(record(&["hello"], Deleted::No, ""), "hello");
        roundtrip(record(&["hello"], Deleted::Soft, ""), "DELETEDhello");
        roundtrip(
            record(&["hello"], Deleted::Soft, MD5_HELLO),
            "DELETEDHASH5d41402abc4b2a76b9719d911017c592hello",
        );
        roundtrip(
            record(&["hello"], Deleted::No, MD5_HELLO),
            "HASH5d41402abc4b2a76b9719d911017c592hello",
        );
        roundtrip(record(&["hello"], Deleted::Init, ""), "INIThello");
        roundtrip(
            record(&["hello"], Deleted::Init, MD5_HELLO),
            "INITHASH5d41402abc4b2a76b9719d911017c592hello",
        );
    }

    #[test]
    fn test_hard_never_encodes() {
        assert_eq!(
            record(&["hello"], Deleted::Hard, "").encode().unwrap_err(),
            RecordError::EncodeHard
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            Record::decode(b"HASHdeadbeef").unwrap_err(),
            RecordError::TruncatedHash(8)
        );
        assert_eq!(
            record(&["hello"], Deleted::No, "tooshort").encode().unwrap_err(),
            RecordError::InvalidHashLength(8)
        );
    }

    #[test]
    fn test_hard_deleted_default() {
        let rec = Record::hard_deleted();
        assert_eq!(rec.deleted, Deleted::Hard);
        assert!(rec.volumes.is_empty());
        assert!(rec.hash.is_none());
    }
}
