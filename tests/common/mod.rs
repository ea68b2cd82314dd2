#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crl_store::pki::crl::{SerialNumber, ShardStore};
use crl_store::store::{self, EntityKey, MemoryStore, RevocationStore, StoreError, Transaction};
use crl_store::telemetry;
use tokio::sync::watch;

pub fn sn(value: u64) -> SerialNumber {
    SerialNumber::from(value)
}

pub fn serials(values: &[u64]) -> Vec<SerialNumber> {
    values.iter().copied().map(sn).collect()
}

/// Shard store over `backend`, with tracing enabled for the test binary.
pub fn shard_store(backend: Arc<dyn RevocationStore>) -> ShardStore {
    telemetry::init_tracing();
    ShardStore::new(backend)
}

/// Records how often each entity name is read and how many commits land.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    reads: Mutex<HashMap<String, usize>>,
    commits: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    /// Reads of entities called `name`, across all groups.
    pub fn reads(&self, name: &str) -> usize {
        self.reads.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevocationStore for CountingStore {
    async fn get(&self, key: &EntityKey) -> store::Result<Option<Vec<u8>>> {
        *self.reads.lock().unwrap().entry(key.name.clone()).or_default() += 1;
        self.inner.get(key).await
    }

    async fn commit(&self, txn: Transaction) -> store::Result<()> {
        self.inner.commit(txn).await?;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every read with a transient error while switched on.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_reads: AtomicBool,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RevocationStore for FailingStore {
    async fn get(&self, key: &EntityKey) -> store::Result<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::transient(format!("read of {key} refused")));
        }
        self.inner.get(key).await
    }

    async fn commit(&self, txn: Transaction) -> store::Result<()> {
        self.inner.commit(txn).await
    }
}

/// Holds reads of entities called `name` until the gate is opened.
pub struct GatedStore {
    pub inner: MemoryStore,
    name: String,
    gate: watch::Sender<bool>,
    gated_reads: AtomicUsize,
}

impl GatedStore {
    pub fn new(inner: MemoryStore, name: impl Into<String>) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            inner,
            name: name.into(),
            gate,
            gated_reads: AtomicUsize::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    pub fn close(&self) {
        self.gate.send_replace(false);
    }

    /// Number of reads that reached the gate.
    pub fn gated_reads(&self) -> usize {
        self.gated_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevocationStore for GatedStore {
    async fn get(&self, key: &EntityKey) -> store::Result<Option<Vec<u8>>> {
        if key.name == self.name {
            self.gated_reads.fetch_add(1, Ordering::SeqCst);
            let mut open = self.gate.subscribe();
            if open.wait_for(|open| *open).await.is_err() {
                return Err(StoreError::transient("gate dropped"));
            }
        }
        self.inner.get(key).await
    }

    async fn commit(&self, txn: Transaction) -> store::Result<()> {
        self.inner.commit(txn).await
    }
}
