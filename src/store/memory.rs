use crate::store::{EntityKey, Result, RevocationStore, StoreError, StoreErrorKind, Transaction};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

type Failpoint = Arc<dyn Fn(&EntityKey) -> bool + Send + Sync>;

/// An in-memory revocation store.
///
/// Each transaction group lives in one map entry, so a commit holds the
/// entry lock while it swaps the whole group in.
///
/// Useful for testing and development.
#[derive(Default, Clone)]
pub struct MemoryStore {
    groups: Arc<DashMap<String, HashMap<String, Vec<u8>>>>,
    failpoint: Arc<RwLock<Option<Failpoint>>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes commits fail while staging any write whose key matches
    /// `predicate`. Writes staged before the failing one are discarded.
    pub fn fail_writes_where<F>(&self, predicate: F)
    where
        F: Fn(&EntityKey) -> bool + Send + Sync + 'static,
    {
        if let Ok(mut failpoint) = self.failpoint.write() {
            *failpoint = Some(Arc::new(predicate));
        }
    }

    pub fn clear_failpoint(&self) {
        if let Ok(mut failpoint) = self.failpoint.write() {
            *failpoint = None;
        }
    }

    /// Return the number of transaction groups currently stored.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn should_fail(&self, key: &EntityKey) -> bool {
        self.failpoint
            .read()
            .ok()
            .and_then(|failpoint| failpoint.as_ref().map(|f| f(key)))
            .unwrap_or(false)
    }
}

#[async_trait]
impl RevocationStore for MemoryStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .groups
            .get(&key.group)
            .and_then(|group| group.get(&key.name).cloned()))
    }

    async fn commit(&self, txn: Transaction) -> Result<()> {
        let mut group = self.groups.entry(txn.group().to_string()).or_default();

        for (name, expected) in txn.expectations() {
            if group.get(name) != expected.as_ref() {
                return Err(StoreError::conflict(format!(
                    "precondition failed for {}/{}",
                    txn.group(),
                    name
                )));
            }
        }

        let mut staged = group.clone();
        for (key, (name, value)) in txn.keys().zip(txn.writes()) {
            if self.should_fail(&key) {
                return Err(StoreError::msg(
                    StoreErrorKind::Transient,
                    format!("injected failure while writing {key}"),
                ));
            }
            staged.insert(name.clone(), value.clone());
        }

        *group = staged;
        Ok(())
    }
}
