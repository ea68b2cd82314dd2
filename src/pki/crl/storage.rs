use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use ring::digest::{SHA256, digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::store::{self, EntityKey, RevocationStore, Transaction};

use super::compression::{zlib_compress, zlib_decompress};
use super::errors::{CrlError, CrlResult};
use super::shard::Shard;

const HEADER_NAME: &str = "header";
const BODY_NAME: &str = "body";

/// ID of the transaction group holding one shard: `<ca>|<total>|<index>`.
pub fn shard_entity_id(ca: &str, total: usize, index: usize) -> String {
    format!("{ca}|{total}|{index}")
}

pub fn header_key(ca: &str, total: usize, index: usize) -> EntityKey {
    EntityKey::new(shard_entity_id(ca, total, index), HEADER_NAME)
}

/// The body is a child of its header and shares its transaction group.
pub fn body_key(header: &EntityKey) -> EntityKey {
    header.child(BODY_NAME)
}

/// Hex SHA-256 of a serialized (uncompressed) shard.
pub fn content_hash(blob: &[u8]) -> String {
    hex::encode(digest(&SHA256, blob))
}

/// Small entity used to skip fetches of the body when the hash is unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ShardHeader {
    sha256: String,
}

/// Compressed serialized shard, stored next to its header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardBody {
    /// Hash of the serialized shard before compression.
    pub sha256: String,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub zipped_data: Vec<u8>,
}

impl ShardBody {
    /// Decompress and parse the payload, checking it against the stored hash.
    pub fn decode(&self) -> CrlResult<Shard> {
        let blob = zlib_decompress(&self.zipped_data)?;
        let actual = content_hash(&blob);
        if actual != self.sha256 {
            return Err(CrlError::CorruptState(format!(
                "shard body hash mismatch: stored {}, computed {actual}",
                self.sha256
            )));
        }
        Shard::parse(&blob)
    }
}

fn to_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(data))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}

/// Content-addressed persistence of CRL shards.
///
/// A shard is a header (hash) and a body (hash + compressed data) written in
/// one transaction, so a visible header always has its matching body.
#[derive(Clone)]
pub struct ShardStore {
    store: Arc<dyn RevocationStore>,
    timeout: Option<Duration>,
}

impl ShardStore {
    pub fn new(store: Arc<dyn RevocationStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Bound every store round trip. An elapsed deadline is reported as
    /// [`CrlError::Timeout`].
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn store(&self) -> &Arc<dyn RevocationStore> {
        &self.store
    }

    async fn run<T, F>(&self, fut: F) -> CrlResult<T>
    where
        F: Future<Output = store::Result<T>>,
    {
        match self.timeout {
            Some(limit) => match timeout(limit, fut).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(CrlError::Timeout),
            },
            None => Ok(fut.await?),
        }
    }

    pub async fn get(&self, key: &EntityKey) -> CrlResult<Option<Vec<u8>>> {
        self.run(self.store.get(key)).await
    }

    pub async fn commit(&self, txn: Transaction) -> CrlResult<()> {
        self.run(self.store.commit(txn)).await
    }

    /// Returns the stored hash of a shard, or `None` if it was never written.
    pub async fn read_header(
        &self,
        ca: &str,
        shard_count: usize,
        index: usize,
    ) -> CrlResult<Option<String>> {
        let key = header_key(ca, shard_count, index);
        let Some(raw) = self.get(&key).await? else {
            return Ok(None);
        };
        let header: ShardHeader = serde_json::from_slice(&raw)?;
        Ok(Some(header.sha256))
    }

    /// Loads the body owned by `header`.
    pub async fn read_body(&self, header: &EntityKey) -> CrlResult<ShardBody> {
        let key = body_key(header);
        let Some(raw) = self.get(&key).await? else {
            return Err(CrlError::NotFound(format!("shard body {key}")));
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Stores one serialized shard and returns its content hash.
    ///
    /// Nothing is compressed or written when the stored header already
    /// carries the same hash.
    pub async fn write_shard(
        &self,
        ca: &str,
        shard_count: usize,
        index: usize,
        serialized: &[u8],
    ) -> CrlResult<String> {
        let hash = content_hash(serialized);

        if self.read_header(ca, shard_count, index).await?.as_deref() == Some(hash.as_str()) {
            info!("CRL for {ca:?}: shard {index}/{shard_count} is up-to-date");
            return Ok(hash);
        }

        let zipped = zlib_compress(serialized)?;
        info!(
            "CRL for {ca:?}: shard {index}/{shard_count} updated ({} bytes zipped, {}% compression)",
            zipped.len(),
            100 * zipped.len() / serialized.len().max(1)
        );

        let header = serde_json::to_vec(&ShardHeader {
            sha256: hash.clone(),
        })?;
        let body = serde_json::to_vec(&ShardBody {
            sha256: hash.clone(),
            zipped_data: zipped,
        })?;

        let key = header_key(ca, shard_count, index);
        self.commit(
            Transaction::new(key.group.clone())
                .put(HEADER_NAME, header)
                .put(BODY_NAME, body),
        )
        .await?;
        debug!("Committed shard {key} with hash {hash}");

        Ok(hash)
    }
}
