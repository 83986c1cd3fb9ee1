//! Keyed TTL cache backing the usage tracker.
//!
//! Values carry their own absolute deadline ([`Deadline`]); the cache
//! derives each entry's time-to-live from that deadline on insert AND on
//! replace, so a replaced value can never outlive the deadline it
//! carries. Expired entries are never returned from [`TtlCache::get`],
//! even before the backing store has physically evicted them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::sync::Cache;
use moka::Expiry;

/// A cache value that knows when it stops being valid.
pub trait Deadline {
    /// The absolute instant this value expires.
    fn expires_at(&self) -> Instant;

    /// Time left until expiry; zero once the deadline has passed.
    fn remaining(&self) -> Duration {
        self.expires_at().saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    fn is_expired(&self) -> bool {
        self.expires_at() <= Instant::now()
    }
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// The entry's deadline passed
    Expired,

    /// A newer value replaced it
    Replaced,

    /// It was removed explicitly
    Explicit,

    /// The cache was over capacity
    Capacity,
}

impl From<RemovalCause> for Eviction {
    fn from(cause: RemovalCause) -> Self {
        match cause {
            RemovalCause::Expired => Eviction::Expired,
            RemovalCause::Replaced => Eviction::Replaced,
            RemovalCause::Explicit => Eviction::Explicit,
            RemovalCause::Size => Eviction::Capacity,
        }
    }
}

/// Derives per-entry TTL from the value's own deadline.
struct DeadlineExpiry;

impl<V: Deadline> Expiry<String, V> for DeadlineExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &V,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining())
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &V,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Replacement writes keep the absolute deadline the new value
        // carries, not the TTL the old entry had left.
        Some(value.remaining())
    }
}

/// Keyed in-memory cache with per-entry absolute expiration and
/// eviction notification, backed by moka.
pub struct TtlCache<V> {
    inner: Cache<String, V>,
}

impl<V> TtlCache<V>
where
    V: Deadline + Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `max_entries` values.
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(DeadlineExpiry)
            .build();

        Self { inner }
    }

    /// Create a cache that reports every eviction to `listener`.
    pub fn with_eviction_listener(
        max_entries: u64,
        listener: impl Fn(&str, &V, Eviction) + Send + Sync + 'static,
    ) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(DeadlineExpiry)
            .eviction_listener(move |key: Arc<String>, value: V, cause| {
                listener(key.as_str(), &value, cause.into());
            })
            .build();

        Self { inner }
    }

    /// Look up a value. Entries past their deadline are treated as
    /// absent even if the backing store has not evicted them yet.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).filter(|v| !v.is_expired())
    }

    /// Insert or replace a value under `key`.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value);
    }

    /// Remove a value explicitly.
    pub fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }

    /// Number of live entries; flushes pending maintenance first so the
    /// count reflects expirations.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    /// Flush pending maintenance (expiration sweeps, notifications).
    pub fn sync(&self) {
        self.inner.run_pending_tasks();
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}
