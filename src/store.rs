use ::redis::RedisError;
use async_trait::async_trait;
use color_eyre::Report;
use std::error::Error as StdError;
use std::fmt;

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::{DEFAULT_KEY_PREFIX, RedisStore};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Key of a stored entity.
///
/// `group` is the logical parent shared by all entities that must commit
/// together; `name` identifies the entity inside its group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub group: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Returns a sibling key in the same transaction group.
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self::new(self.group.clone(), name)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

/// A set of writes committed atomically within one transaction group.
#[derive(Debug, Clone)]
pub struct Transaction {
    group: String,
    expectations: Vec<(String, Option<Vec<u8>>)>,
    writes: Vec<(String, Vec<u8>)>,
}

impl Transaction {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            expectations: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Requires the entity `name` to hold exactly `value` (or to be absent
    /// when `None`) at commit time. Otherwise the commit fails with a
    /// [`StoreErrorKind::Conflict`] and nothing is written.
    pub fn expect(mut self, name: impl Into<String>, value: Option<Vec<u8>>) -> Self {
        self.expectations.push((name.into(), value));
        self
    }

    pub fn put(mut self, name: impl Into<String>, value: Vec<u8>) -> Self {
        self.writes.push((name.into(), value));
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn expectations(&self) -> &[(String, Option<Vec<u8>>)] {
        &self.expectations
    }

    pub fn writes(&self) -> &[(String, Vec<u8>)] {
        &self.writes
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.writes
            .iter()
            .map(|(name, _)| EntityKey::new(self.group.clone(), name.clone()))
    }
}

/// How a store failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Store hiccup, the whole operation can be retried.
    Transient,
    /// Retrying will not help.
    Permanent,
    /// A transaction precondition did not hold.
    Conflict,
}

/// Error type for store operations.
#[derive(Debug)]
pub struct StoreError {
    kind: StoreErrorKind,
    error: Report,
}

impl StoreError {
    pub fn new<T>(kind: StoreErrorKind, error: T) -> Self
    where
        T: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            error: Report::new(error),
        }
    }

    pub fn msg<T>(kind: StoreErrorKind, message: T) -> Self
    where
        T: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        Self {
            kind,
            error: Report::msg(message),
        }
    }

    pub fn transient<T>(message: T) -> Self
    where
        T: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        Self::msg(StoreErrorKind::Transient, message)
    }

    pub fn conflict<T>(message: T) -> Self
    where
        T: fmt::Debug + fmt::Display + Send + Sync + 'static,
    {
        Self::msg(StoreErrorKind::Conflict, message)
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl From<RedisError> for StoreError {
    fn from(error: RedisError) -> Self {
        let kind = if error.is_io_error()
            || error.is_timeout()
            || error.is_connection_dropped()
            || error.is_connection_refusal()
        {
            StoreErrorKind::Transient
        } else {
            StoreErrorKind::Permanent
        };
        Self {
            kind,
            error: Report::new(error),
        }
    }
}

/// Abstract interface for the durable revocation store.
///
/// Entities are grouped by [`EntityKey::group`]; a [`Transaction`] writes
/// entities of a single group atomically. No cross-group atomicity is
/// required from implementations.
#[async_trait]
pub trait RevocationStore: Send + Sync + 'static {
    /// Loads an entity. `Ok(None)` means it was never written.
    async fn get(&self, key: &EntityKey) -> Result<Option<Vec<u8>>>;

    /// Applies all writes of the transaction, or none of them.
    async fn commit(&self, txn: Transaction) -> Result<()>;
}
