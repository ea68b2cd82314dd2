use crate::config::Config;
use crate::pki::crl::{CrlChecker, ShardStore};
use crate::store::{MemoryStore, RedisStore, RevocationStore};
use color_eyre::eyre::Context;
use std::sync::Arc;

/// Opens the configured store and builds a checker for `crl.ca` on it.
pub async fn setup(config: &Config) -> color_eyre::Result<(ShardStore, CrlChecker)> {
    let backend: Arc<dyn RevocationStore> = if let Some(redis_config) = &config.redis {
        tracing::info!("Redis URI provided, using Redis for CRL storage.");
        let redis_conn = redis_config
            .start()
            .await
            .wrap_err("Failed to start Redis")?;
        Arc::new(RedisStore::new(redis_conn).with_prefix(redis_config.key_prefix.clone()))
    } else {
        tracing::info!("No Redis URI, using in-memory CRL storage.");
        Arc::new(MemoryStore::new())
    };

    let mut store = ShardStore::new(backend);
    if let Some(timeout) = config.crl.store_timeout() {
        store = store.with_timeout(timeout);
    }

    let checker_config = config
        .crl
        .checker_config()
        .wrap_err("Invalid CRL configuration")?;
    let checker = CrlChecker::with_config(store.clone(), config.crl.ca.clone(), checker_config);

    Ok((store, checker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::crl::{SerialNumber, update_crl_set};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_setup_in_memory() {
        let mut env_vars = HashMap::new();
        env_vars.insert("crl.ca".to_string(), "ca".to_string());
        env_vars.insert("crl.shard_count".to_string(), "2".to_string());
        env_vars.insert("crl.cache_duration_ms".to_string(), "0".to_string());
        let config = Config::load_with_sources(Some(env_vars)).unwrap();

        let (store, checker) = setup(&config).await.unwrap();
        assert_eq!(checker.ca(), "ca");
        assert_eq!(checker.config().shard_count, 2);

        update_crl_set(&store, "ca", &[SerialNumber::from(7u64)], 2)
            .await
            .unwrap();
        assert!(checker.is_revoked(&SerialNumber::from(7u64)).await.unwrap());
    }

    #[tokio::test]
    async fn test_setup_rejects_negative_cache_duration() {
        let mut env_vars = HashMap::new();
        env_vars.insert("crl.cache_duration_ms".to_string(), "-1".to_string());
        let config = Config::load_with_sources(Some(env_vars)).unwrap();

        assert!(setup(&config).await.is_err());
    }
}
