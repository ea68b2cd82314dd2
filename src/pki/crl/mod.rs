//! Sharded Certificate Revocation List storage
//!
//! A CA's set of revoked serial numbers is split into a fixed number of
//! shards, each stored as a small header (content hash) and a compressed body
//! written together in one transaction.
//!
//! # Features
//! - Canonical serial number encoding and deterministic shard assignment
//! - Content-hash based skipping of unchanged shard writes
//! - Parallel set updates with per-shard failure reporting
//! - In-memory shard cache with TTL and single-flight, hash-gated refresh
//! - CRL import bookkeeping with optimistic concurrency

mod checker;
mod compression;
mod errors;
mod ingest;
mod metadata;
mod serial;
mod shard;
mod slot;
mod storage;
mod updater;

// Re-export public types
pub use checker::{CrlChecker, CrlCheckerConfig};
pub use compression::{zlib_compress, zlib_decompress};
pub use errors::{CrlError, CrlResult, ShardErrors};
pub use ingest::{IngestOutcome, ParsedCrl, ingest_crl};
pub use metadata::{CrlMetadata, CrlStatus, load_metadata, metadata_key, save_metadata};
pub use serial::{MAX_SERIAL_LEN, SerialNumber, serialize_sn};
pub use shard::{CRL_SHARD_COUNT, Shard, ShardSet, shard_index};
pub use slot::RefreshSlot;
pub use storage::{ShardBody, ShardStore, body_key, content_hash, header_key, shard_entity_id};
pub use updater::{update_crl_set, update_serialized_set};
