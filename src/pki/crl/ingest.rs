use chrono::{DateTime, Utc};
use tracing::info;

use super::errors::CrlResult;
use super::metadata::{CrlMetadata, load_metadata, save_metadata};
use super::serial::{SerialNumber, serialize_sn};
use super::storage::ShardStore;
use super::updater::update_serialized_set;

/// A CRL already fetched and parsed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCrl {
    pub issuer: String,
    /// `thisUpdate` of the CRL.
    pub this_update: DateTime<Utc>,
    /// Freshness token of the downloaded file, empty if unknown.
    pub etag: String,
    pub revoked_serials: Vec<SerialNumber>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Same freshness token as the last import, nothing was written.
    Unchanged,
    /// The stored CRL is newer than the given one, nothing was written.
    Stale,
    Updated { revoked: usize },
}

/// Imports a parsed CRL of `ca`: rewrites its shard set and records the
/// metadata of the import.
///
/// Metadata is only updated after every shard was written, so a failed
/// import is retried in full next time.
pub async fn ingest_crl(
    store: &ShardStore,
    ca: &str,
    crl: &ParsedCrl,
    shard_count: usize,
) -> CrlResult<IngestOutcome> {
    let current = load_metadata(store, ca).await?.unwrap_or_default();

    if !crl.etag.is_empty() && crl.etag == current.last_fetch_etag {
        info!("CRL for {ca:?} has the same etag {:?}, skipping", crl.etag);
        return Ok(IngestOutcome::Unchanged);
    }
    if current.last_update_time > crl.this_update {
        info!(
            "CRL for {ca:?} from {} is older than the stored one from {}, skipping",
            crl.this_update, current.last_update_time
        );
        return Ok(IngestOutcome::Stale);
    }

    let serials = crl
        .revoked_serials
        .iter()
        .map(serialize_sn)
        .collect::<CrlResult<Vec<_>>>()?;
    let revoked = serials.len();

    update_serialized_set(store, ca, serials, shard_count).await?;

    let saved = save_metadata(
        store,
        ca,
        &CrlMetadata {
            entity_version: current.entity_version,
            last_update_time: crl.this_update,
            last_fetch_time: Utc::now(),
            last_fetch_etag: crl.etag.clone(),
            revoked_certs_count: revoked,
        },
    )
    .await?;
    info!(
        "CRL for {ca:?} issued by {:?} imported: {revoked} revoked certificates (version {})",
        crl.issuer, saved.entity_version
    );

    Ok(IngestOutcome::Updated { revoked })
}
