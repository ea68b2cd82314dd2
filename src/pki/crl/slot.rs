use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry<T> {
    value: Arc<T>,
    fetched_at: Instant,
    generation: u64,
}

/// A lazily populated value refreshed after a TTL, with at most one refresh
/// in flight.
///
/// Callers that find a fresh value read it without waiting on a refresh.
/// Callers that find it stale queue on the refresh lock; once the in-flight
/// refresh publishes, they return its value instead of refreshing again.
/// A failed refresh keeps the last published value.
pub struct RefreshSlot<T> {
    current: RwLock<Option<Arc<Entry<T>>>>,
    refresh: Mutex<()>,
}

impl<T> Default for RefreshSlot<T> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }
}

impl<T> RefreshSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Option<Arc<Entry<T>>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last published value, however old.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.snapshot().map(|entry| Arc::clone(&entry.value))
    }

    /// When the last value was published, if ever.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.snapshot().map(|entry| entry.fetched_at)
    }

    /// Returns the cached value, calling `refresh` with the previous value
    /// when the slot is empty or older than `ttl`. A zero `ttl` refreshes on
    /// every call not already served by a concurrent refresh.
    ///
    /// Dropping the returned future releases the refresh lock, so an
    /// abandoned refresh never blocks later callers.
    pub async fn get<F, Fut, E>(&self, ttl: Duration, refresh: F) -> Result<Arc<T>, E>
    where
        F: FnOnce(Option<Arc<T>>) -> Fut,
        Fut: Future<Output = Result<Arc<T>, E>>,
    {
        let seen = match self.snapshot() {
            Some(entry) if entry.fetched_at.elapsed() < ttl => return Ok(Arc::clone(&entry.value)),
            Some(entry) => entry.generation,
            None => 0,
        };

        let _guard = self.refresh.lock().await;

        let previous = self.snapshot();
        if let Some(entry) = &previous
            && (entry.generation != seen || entry.fetched_at.elapsed() < ttl)
        {
            return Ok(Arc::clone(&entry.value));
        }

        let generation = previous.as_ref().map_or(0, |entry| entry.generation) + 1;
        let value = refresh(previous.map(|entry| Arc::clone(&entry.value))).await?;

        let entry = Arc::new(Entry {
            value: Arc::clone(&value),
            fetched_at: Instant::now(),
            generation,
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);

        Ok(value)
    }
}
