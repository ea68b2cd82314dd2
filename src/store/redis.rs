use crate::store::{EntityKey, Result, RevocationStore, StoreError, Transaction};
use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

pub const DEFAULT_KEY_PREFIX: &str = "crl:";

// KEYS[1] is the group hash. ARGV carries the number of expectations, then
// (field, present flag, value) triples, then (field, value) write pairs.
const COMMIT_SCRIPT: &str = r"
local n = tonumber(ARGV[1])
local i = 2
for _ = 1, n do
  local current = redis.call('HGET', KEYS[1], ARGV[i])
  if ARGV[i + 1] == '1' then
    if current ~= ARGV[i + 2] then return 0 end
  elseif current then
    return 0
  end
  i = i + 3
end
if i <= #ARGV then
  redis.call('HSET', KEYS[1], unpack(ARGV, i))
end
return 1
";

/// A Redis revocation store.
///
/// Each transaction group is one Redis hash and every commit runs as a
/// single script, so the group's fields change together.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    prefix: String,
    script: Script,
}

impl RedisStore {
    /// Creates a new Redis store from a connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            script: Script::new(COMMIT_SCRIPT),
        }
    }

    /// Set the prefix prepended to every group hash.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn hash_key(&self, group: &str) -> String {
        format!("{}{}", self.prefix, group)
    }
}

#[async_trait]
impl RevocationStore for RedisStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.hget(self.hash_key(&key.group), &key.name).await?;
        Ok(value)
    }

    async fn commit(&self, txn: Transaction) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(self.hash_key(txn.group()))
            .arg(txn.expectations().len());

        for (name, expected) in txn.expectations() {
            match expected {
                Some(value) => invocation.arg(name).arg("1").arg(value.as_slice()),
                None => invocation.arg(name).arg("0").arg(""),
            };
        }
        for (name, value) in txn.writes() {
            invocation.arg(name).arg(value.as_slice());
        }

        let applied: i64 = invocation.invoke_async(&mut conn).await?;
        if applied == 1 {
            Ok(())
        } else {
            Err(StoreError::conflict(format!(
                "precondition failed for group {}",
                txn.group()
            )))
        }
    }
}
