use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::errors::{CrlError, CrlResult, ShardErrors};
use super::serial::{SerialNumber, serialize_sn};
use super::shard::ShardSet;
use super::storage::ShardStore;

/// Splits a set of revoked serial numbers into shards and stores each shard
/// in its own transaction.
///
/// It effectively overwrites the entire set, empty shards included. Shards
/// are written in parallel and independently: when some of them fail the
/// others stay updated and the failures are reported per index in
/// [`CrlError::Shards`].
pub async fn update_crl_set(
    store: &ShardStore,
    ca: &str,
    revoked: &[SerialNumber],
    shard_count: usize,
) -> CrlResult<()> {
    let serials = revoked
        .iter()
        .map(serialize_sn)
        .collect::<CrlResult<Vec<_>>>()?;
    update_serialized_set(store, ca, serials, shard_count).await
}

/// Same as [`update_crl_set`] for serials already in canonical form.
pub async fn update_serialized_set(
    store: &ShardStore,
    ca: &str,
    serials: Vec<Vec<u8>>,
    shard_count: usize,
) -> CrlResult<()> {
    if shard_count == 0 {
        return Err(CrlError::Config("shard count must be positive".to_string()));
    }

    let set = ShardSet::partition(serials, shard_count);
    info!(
        "Updating CRL set for {ca:?}: {} serials in {shard_count} shards",
        set.len()
    );

    let mut join_set = JoinSet::new();
    for (idx, shard) in set.into_shards().into_iter().enumerate() {
        let store = store.clone();
        let ca = ca.to_string();
        join_set.spawn(async move {
            let blob = shard.serialize();
            let result = store.write_shard(&ca, shard_count, idx, &blob).await;
            (idx, result)
        });
    }

    let mut slots: Vec<Option<CrlResult<String>>> = (0..shard_count).map(|_| None).collect();
    while let Some(task_result) = join_set.join_next().await {
        match task_result {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => error!("Shard writer task failed to complete: {}", e),
        }
    }

    let errors: Vec<Option<CrlError>> = slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| match slot {
            Some(Ok(_)) => None,
            Some(Err(e)) => {
                warn!("CRL for {ca:?}: failed to update shard {idx}/{shard_count}: {e}");
                Some(e)
            }
            None => Some(CrlError::Internal(format!(
                "writer of shard {idx} did not complete"
            ))),
        })
        .collect();

    ShardErrors::from_slots(errors).map_err(CrlError::Shards)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pki::crl::storage::header_key;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_all_shards_are_written() {
        let store = ShardStore::new(Arc::new(MemoryStore::new()));
        let revoked: Vec<SerialNumber> = [10u64, 255, 4096].into_iter().map(Into::into).collect();

        update_crl_set(&store, "ca", &revoked, 4).await.unwrap();

        let mut total = 0;
        for idx in 0..4 {
            assert!(store.read_header("ca", 4, idx).await.unwrap().is_some());
            let body = store.read_body(&header_key("ca", 4, idx)).await.unwrap();
            total += body.decode().unwrap().len();
        }
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_rejects_zero_shards() {
        let store = ShardStore::new(Arc::new(MemoryStore::new()));
        let err = update_crl_set(&store, "ca", &[], 0).await.unwrap_err();
        assert!(matches!(err, CrlError::Config(_)));
    }

    #[tokio::test]
    async fn test_bad_serial_writes_nothing() {
        let memory = MemoryStore::new();
        let store = ShardStore::new(Arc::new(memory.clone()));
        let revoked = vec![
            SerialNumber::from(1),
            SerialNumber::from_der_bytes(vec![0xff]),
        ];

        let err = update_crl_set(&store, "ca", &revoked, 4).await.unwrap_err();
        assert!(matches!(err, CrlError::Encoding(_)));
        assert!(memory.is_empty());
    }
}
