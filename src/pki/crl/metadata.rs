use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{EntityKey, StoreErrorKind, Transaction};

use super::errors::{CrlError, CrlResult};
use super::storage::ShardStore;

const METADATA_NAME: &str = "crl";

/// Key of the metadata record of the CRL of `ca`.
pub fn metadata_key(ca: &str) -> EntityKey {
    EntityKey::new(format!("crl|{ca}"), METADATA_NAME)
}

/// Bookkeeping about the last imported CRL of a CA.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrlMetadata {
    /// Used for simple concurrency control, increased on each update.
    pub entity_version: u64,

    /// When the CRL was generated by the CA.
    pub last_update_time: DateTime<Utc>,

    /// When this CRL was fetched the last time.
    ///
    /// Updated only when a newer CRL version is imported.
    pub last_fetch_time: DateTime<Utc>,

    /// Freshness token (e.g. ETag) of the last downloaded CRL file. If it
    /// doesn't change, reimporting can be skipped.
    pub last_fetch_etag: String,

    /// FYI only.
    pub revoked_certs_count: usize,
}

/// Status of a CA's CRL as exposed to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrlStatus {
    pub last_update_time: DateTime<Utc>,
    pub last_fetch_time: DateTime<Utc>,
    pub last_fetch_etag: String,
    pub revoked_certs_count: usize,
}

impl CrlMetadata {
    pub fn status(&self) -> CrlStatus {
        CrlStatus {
            last_update_time: self.last_update_time,
            last_fetch_time: self.last_fetch_time,
            last_fetch_etag: self.last_fetch_etag.clone(),
            revoked_certs_count: self.revoked_certs_count,
        }
    }
}

/// Returns the metadata of `ca`, or `None` if its CRL was never imported.
pub async fn load_metadata(store: &ShardStore, ca: &str) -> CrlResult<Option<CrlMetadata>> {
    match store.get(&metadata_key(ca)).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

/// Stores `metadata` if nobody updated the record since it was loaded.
///
/// `metadata.entity_version` must be the version that was read (0 for a new
/// record). Returns the stored record with its version bumped.
pub async fn save_metadata(
    store: &ShardStore,
    ca: &str,
    metadata: &CrlMetadata,
) -> CrlResult<CrlMetadata> {
    let key = metadata_key(ca);
    let conflict = || CrlError::VersionConflict {
        ca: ca.to_string(),
        expected: metadata.entity_version,
    };

    let current = store.get(&key).await?;
    let current_version = match &current {
        Some(raw) => serde_json::from_slice::<CrlMetadata>(raw)?.entity_version,
        None => 0,
    };
    if current_version != metadata.entity_version {
        return Err(conflict());
    }

    let updated = CrlMetadata {
        entity_version: metadata.entity_version + 1,
        ..metadata.clone()
    };
    let txn = Transaction::new(key.group.clone())
        .expect(key.name.clone(), current)
        .put(key.name.clone(), serde_json::to_vec(&updated)?);

    match store.commit(txn).await {
        Ok(()) => Ok(updated),
        Err(CrlError::Store(e)) if e.kind() == StoreErrorKind::Conflict => Err(conflict()),
        Err(e) => Err(e),
    }
}
