use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::errors::{CrlError, CrlResult};
use super::serial::{SerialNumber, serialize_sn};
use super::shard::{Shard, shard_index};
use super::slot::RefreshSlot;
use super::storage::{ShardStore, header_key};

/// Validated settings of a [`CrlChecker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrlCheckerConfig {
    pub shard_count: usize,
    /// How long a cached shard is used before its header is checked again.
    /// Zero checks on every lookup.
    pub cache_duration: Duration,
}

impl CrlCheckerConfig {
    pub fn new(shard_count: usize, cache_duration: Duration) -> CrlResult<Self> {
        if shard_count == 0 {
            return Err(CrlError::Config("shard count must be positive".to_string()));
        }
        Ok(Self {
            shard_count,
            cache_duration,
        })
    }

    /// Builds a config from a signed millisecond duration, rejecting
    /// negative values.
    pub fn from_millis(shard_count: usize, cache_duration_ms: i64) -> CrlResult<Self> {
        let millis = u64::try_from(cache_duration_ms).map_err(|_| {
            CrlError::Config(format!(
                "cache duration must not be negative, got {cache_duration_ms}ms"
            ))
        })?;
        Self::new(shard_count, Duration::from_millis(millis))
    }
}

/// State kept per shard slot.
struct CachedShard {
    shard: Shard,
    sha256: String,
}

/// Checks presence of certificate serial numbers in the CRL of one CA.
///
/// Uses shards written by [`update_crl_set`](super::update_crl_set) and
/// caches them in memory, refetching a shard at most once per cache
/// duration. The view of the CRL is eventually consistent.
///
/// Safe for concurrent use. Should be reused between requests.
pub struct CrlChecker {
    ca: String,
    config: CrlCheckerConfig,
    store: ShardStore,
    shards: Vec<RefreshSlot<CachedShard>>,
}

impl CrlChecker {
    /// Create a checker for the CRL of `ca`.
    ///
    /// `shard_count` must match the count the set was written with.
    pub fn new(
        store: ShardStore,
        ca: impl Into<String>,
        shard_count: usize,
        cache_duration: Duration,
    ) -> CrlResult<Self> {
        let config = CrlCheckerConfig::new(shard_count, cache_duration)?;
        Ok(Self::with_config(store, ca, config))
    }

    pub fn with_config(store: ShardStore, ca: impl Into<String>, config: CrlCheckerConfig) -> Self {
        Self {
            ca: ca.into(),
            shards: (0..config.shard_count).map(|_| RefreshSlot::new()).collect(),
            config,
            store,
        }
    }

    pub fn ca(&self) -> &str {
        &self.ca
    }

    pub fn config(&self) -> &CrlCheckerConfig {
        &self.config
    }

    /// Returns true if the serial number is in the CRL.
    ///
    /// Errors are returned as is: whether an unresolved shard means revoked
    /// or not is up to the caller.
    pub async fn is_revoked(&self, sn: &SerialNumber) -> CrlResult<bool> {
        let blob = serialize_sn(sn)?;
        self.is_revoked_serialized(&blob).await
    }

    /// Same as [`is_revoked`](Self::is_revoked) for a canonical serial.
    pub async fn is_revoked_serialized(&self, serialized: &[u8]) -> CrlResult<bool> {
        let idx = shard_index(serialized, self.config.shard_count);
        let cached = self.shard(idx).await?;
        Ok(cached.shard.contains(serialized))
    }

    async fn shard(&self, idx: usize) -> CrlResult<Arc<CachedShard>> {
        self.shards[idx]
            .get(self.config.cache_duration, |prev| self.refetch_shard(idx, prev))
            .await
            .inspect_err(|e| {
                warn!(
                    "CRL for {:?}: failed to refresh shard {idx}/{}: {e}",
                    self.ca, self.config.shard_count
                )
            })
    }

    async fn refetch_shard(
        &self,
        idx: usize,
        prev: Option<Arc<CachedShard>>,
    ) -> CrlResult<Arc<CachedShard>> {
        let count = self.config.shard_count;
        let key = header_key(&self.ca, count, idx);

        // The header is cheap, it tells whether the heavy body changed.
        let Some(hash) = self.store.read_header(&self.ca, count, idx).await? else {
            return Err(match prev {
                Some(_) => CrlError::CorruptState(format!("shard header {key} is missing")),
                None => CrlError::NotFound(format!("shard header {key}")),
            });
        };

        if let Some(prev) = prev
            && prev.sha256 == hash
        {
            debug!("Shard {key} is unchanged");
            return Ok(prev);
        }

        let body = match self.store.read_body(&key).await {
            Err(CrlError::NotFound(_)) => {
                return Err(CrlError::CorruptState(format!("shard body {key} is missing")));
            }
            result => result?,
        };
        let shard = body.decode()?;
        debug!("Fetched shard {key}: {} serials", shard.len());

        Ok(Arc::new(CachedShard {
            shard,
            sha256: body.sha256,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::pki::crl::update_crl_set;
    use crate::store::{self, EntityKey, MemoryStore, RevocationStore, Transaction};

    /// Store whose backend can be replaced while a checker holds it.
    #[derive(Default)]
    struct SwappableStore {
        inner: Mutex<Arc<MemoryStore>>,
    }

    impl SwappableStore {
        fn backend(&self) -> Arc<MemoryStore> {
            Arc::clone(&self.inner.lock().unwrap())
        }

        fn swap(&self, store: MemoryStore) {
            *self.inner.lock().unwrap() = Arc::new(store);
        }
    }

    #[async_trait]
    impl RevocationStore for SwappableStore {
        async fn get(&self, key: &EntityKey) -> store::Result<Option<Vec<u8>>> {
            self.backend().get(key).await
        }

        async fn commit(&self, txn: Transaction) -> store::Result<()> {
            self.backend().commit(txn).await
        }
    }

    fn sn(value: u64) -> SerialNumber {
        SerialNumber::from(value)
    }

    fn serials(values: &[u64]) -> Vec<SerialNumber> {
        values.iter().copied().map(sn).collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(CrlCheckerConfig::from_millis(16, 0).is_ok());
        assert_eq!(
            CrlCheckerConfig::from_millis(4, 1500).unwrap().cache_duration,
            Duration::from_millis(1500)
        );
        assert!(matches!(
            CrlCheckerConfig::from_millis(16, -1),
            Err(CrlError::Config(_))
        ));
        assert!(matches!(
            CrlCheckerConfig::from_millis(0, 10),
            Err(CrlError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup() {
        let store = ShardStore::new(Arc::new(MemoryStore::new()));
        update_crl_set(&store, "ca", &serials(&[10, 255, 4096]), 4)
            .await
            .unwrap();

        let checker = CrlChecker::new(store, "ca", 4, Duration::from_secs(60)).unwrap();
        assert!(checker.is_revoked(&sn(10)).await.unwrap());
        assert!(checker.is_revoked(&sn(255)).await.unwrap());
        assert!(checker.is_revoked(&sn(4096)).await.unwrap());
        assert!(!checker.is_revoked(&sn(11)).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_serial() {
        let store = ShardStore::new(Arc::new(MemoryStore::new()));
        let checker = CrlChecker::new(store, "ca", 4, Duration::ZERO).unwrap();
        let err = checker
            .is_revoked(&SerialNumber::from_der_bytes(vec![0x80]))
            .await
            .unwrap_err();
        assert!(matches!(err, CrlError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_never_written_set_is_not_found() {
        let store = ShardStore::new(Arc::new(MemoryStore::new()));
        let checker = CrlChecker::new(store, "ca", 4, Duration::ZERO).unwrap();
        let err = checker.is_revoked(&sn(10)).await.unwrap_err();
        assert!(matches!(err, CrlError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_header_without_body_is_corrupt() {
        let memory = MemoryStore::new();
        let key = header_key("ca", 1, 0);
        memory
            .commit(
                Transaction::new(key.group.clone()).put("header", br#"{"sha256":"00"}"#.to_vec()),
            )
            .await
            .unwrap();

        let checker =
            CrlChecker::new(ShardStore::new(Arc::new(memory)), "ca", 1, Duration::ZERO).unwrap();
        let err = checker.is_revoked(&sn(10)).await.unwrap_err();
        assert!(matches!(err, CrlError::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_vanished_header_keeps_last_known_shard() {
        let swappable = Arc::new(SwappableStore::default());
        let store = ShardStore::new(swappable.clone());
        update_crl_set(&store, "ca", &serials(&[10]), 1).await.unwrap();

        let checker = CrlChecker::new(store, "ca", 1, Duration::ZERO).unwrap();
        assert!(checker.is_revoked(&sn(10)).await.unwrap());

        swappable.swap(MemoryStore::new());
        let err = checker.is_revoked(&sn(10)).await.unwrap_err();
        assert!(matches!(err, CrlError::CorruptState(_)));

        let cached = checker.shards[0].peek().unwrap();
        assert!(cached.shard.contains(&[10]));
    }
}
