use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// CRL-related errors
#[derive(Error, Debug)]
pub enum CrlError {
    #[error("Invalid serial number: {0}")]
    Encoding(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt CRL state: {0}")]
    CorruptState(String),

    #[error("Failed to compress shard: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Failed to decompress shard: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Entity serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout while accessing the CRL store")]
    Timeout,

    #[error("CRL metadata of {ca:?} was modified concurrently (expected version {expected})")]
    VersionConflict { ca: String, expected: u64 },

    #[error("Invalid CRL configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Shards(#[from] ShardErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrlError {
    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CrlError::Store(e) => e.is_transient(),
            CrlError::Timeout => true,
            CrlError::Shards(e) => e.iter().all(|(_, err)| err.is_transient()),
            _ => false,
        }
    }
}

/// Per-shard outcome of a set update. Holds one slot per shard index.
#[derive(Debug)]
pub struct ShardErrors {
    errors: Vec<Option<CrlError>>,
}

impl ShardErrors {
    /// Returns `Ok(())` when no slot holds an error.
    pub fn from_slots(errors: Vec<Option<CrlError>>) -> Result<(), Self> {
        if errors.iter().all(Option::is_none) {
            Ok(())
        } else {
            Err(Self { errors })
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CrlError> {
        self.errors.get(index).and_then(Option::as_ref)
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.iter().map(|(idx, _)| idx).collect()
    }

    /// Iterates over failed shards only.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &CrlError)> {
        self.errors
            .iter()
            .enumerate()
            .filter_map(|(idx, err)| err.as_ref().map(|err| (idx, err)))
    }
}

impl fmt::Display for ShardErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self
            .iter()
            .map(|(idx, err)| format!("shard {idx}: {err}"))
            .collect();
        write!(
            f,
            "{} of {} shards failed ({})",
            failed.len(),
            self.errors.len(),
            failed.join("; ")
        )
    }
}

impl std::error::Error for ShardErrors {}

/// Convenient Result type alias
pub type CrlResult<T> = Result<T, CrlError>;
