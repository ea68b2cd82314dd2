use std::{collections::HashMap, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use redis::{
    Client as RedisClient, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::pki::crl::{CrlCheckerConfig, CrlResult};
use crate::store::DEFAULT_KEY_PREFIX;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crl: CrlConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrlConfig {
    /// Identity of the CA whose CRL is stored and checked.
    pub ca: String,
    /// Fixed for the lifetime of a CA's set, changing it needs a full rewrite.
    pub shard_count: usize,
    /// Signed so that negative values are reported instead of wrapped.
    pub cache_duration_ms: i64,
    /// Deadline of a single store round trip, 0 disables it.
    pub store_timeout_ms: u64,
}

impl CrlConfig {
    /// Validates the settings consumed by the CRL checker.
    pub fn checker_config(&self) -> CrlResult<CrlCheckerConfig> {
        CrlCheckerConfig::from_millis(self.shard_count, self.cache_duration_ms)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        (self.store_timeout_ms > 0).then(|| Duration::from_millis(self.store_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub uri: SecretString,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl RedisConfig {
    /// Establishes a new Redis connection based on the provided URI.
    ///
    /// - To enable TLS, the URI must use the `rediss://` scheme.
    /// - To enable insecure TLS, the URI must use the `rediss://` scheme and end with `/#insecure`.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn start(&self) -> RedisResult<ConnectionManager> {
        let client = RedisClient::open(self.uri.expose_secret())?;
        let config = ConnectionManagerConfig::new().set_connection_timeout(Duration::from_secs(60));
        client.get_connection_manager_with_config(config).await
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("crl.ca", "default")?
            .set_default("crl.shard_count", 16)?
            .set_default("crl.cache_duration_ms", 60_000)?
            .set_default("crl.store_timeout_ms", 0)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_CRL__SHARD_COUNT or APP_REDIS__URI
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
