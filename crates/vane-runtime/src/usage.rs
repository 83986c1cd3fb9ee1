//! Per-provider usage tracking with windowed quotas.
//!
//! Every provider accumulates success/failure counts inside a usage
//! window; when the window's deadline passes, the whole window (both
//! counters and the deadline itself) vanishes as one unit and the next
//! access starts a fresh zeroed window. Storing the three correlated
//! values as ONE cache entry under ONE TTL is what makes the reset
//! atomic: no reader can ever pair a count from one window with the
//! deadline of another.
//!
//! Counter updates for a given provider TYPE are serialized through one
//! shared lock, owned by the [`UsageTracker`] registration table and
//! injected into every meter of that type. Instances of the same
//! concrete adapter using the same credential map to the same cache key,
//! so they share one quota instead of double-counting.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::{Deadline, TtlCache};

/// More providers than any real deployment registers; the cache never
/// evicts for capacity in practice.
const WINDOW_CACHE_CAPACITY: u64 = 1024;

/// One provider's usage inside the current quota window.
#[derive(Debug, Clone)]
pub struct UsageWindow {
    /// Completed calls that succeeded
    pub successes: u32,

    /// Completed calls that failed
    pub failures: u32,

    expires_at: Instant,
}

impl UsageWindow {
    /// Open a fresh zeroed window lasting `duration` from now.
    fn open(duration: Duration) -> Self {
        Self {
            successes: 0,
            failures: 0,
            expires_at: Instant::now() + duration,
        }
    }

    /// Combined calls charged against the quota.
    pub fn total(&self) -> u32 {
        self.successes.saturating_add(self.failures)
    }

    /// When this window's counters reset.
    pub fn resets_at(&self) -> Instant {
        self.expires_at
    }
}

impl Deadline for UsageWindow {
    fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// Per-provider handle into the shared usage cache.
///
/// Obtained from [`UsageTracker::meter`]; adapters hold one and charge
/// every completed call against it. Cloning is cheap and clones share
/// the same window.
#[derive(Clone)]
pub struct UsageMeter {
    windows: Arc<TtlCache<UsageWindow>>,
    key: String,
    quota_limit: u32,
    window: Duration,
    type_lock: Arc<Mutex<()>>,
}

impl UsageMeter {
    /// Identity key this meter charges against (provider type plus
    /// credential fingerprint).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum combined success+failure calls per window. Immutable.
    pub fn quota_limit(&self) -> u32 {
        self.quota_limit
    }

    /// How long a window lasts. Immutable.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// The current window, lazily opening a zeroed one if none exists.
    ///
    /// Double-checked under the per-type lock: of N concurrent first
    /// readers exactly one opens the window, and all N observe zero
    /// counts. The returned value is a consistent pair: both counters
    /// come from the same window.
    pub fn snapshot(&self) -> UsageWindow {
        if let Some(window) = self.windows.get(&self.key) {
            return window;
        }

        let _guard = self.type_lock.lock();

        if let Some(window) = self.windows.get(&self.key) {
            return window;
        }

        let window = UsageWindow::open(self.window);
        tracing::debug!(key = %self.key, duration = ?self.window, "opened usage window");
        self.windows.insert(self.key.clone(), window.clone());
        window
    }

    /// Successful calls in the current window.
    pub fn successes(&self) -> u32 {
        self.snapshot().successes
    }

    /// Failed calls in the current window.
    pub fn failures(&self) -> u32 {
        self.snapshot().failures
    }

    /// Combined calls charged against the quota so far.
    pub fn total(&self) -> u32 {
        self.snapshot().total()
    }

    /// Whether another call fits under the quota.
    pub fn is_available(&self) -> bool {
        self.total() < self.quota_limit
    }

    /// When the current window's counters reset.
    pub fn resets_at(&self) -> Instant {
        self.snapshot().resets_at()
    }

    /// Charge one successful call.
    pub fn record_success(&self) {
        self.charge(|w| w.successes = w.successes.saturating_add(1));
    }

    /// Charge one failed call.
    pub fn record_failure(&self) {
        self.charge(|w| w.failures = w.failures.saturating_add(1));
    }

    /// Read-modify-write of the whole window under the per-type lock.
    /// The replacement write keeps the window's original deadline.
    fn charge(&self, apply: impl FnOnce(&mut UsageWindow)) {
        let _guard = self.type_lock.lock();

        let mut window = self
            .windows
            .get(&self.key)
            .unwrap_or_else(|| UsageWindow::open(self.window));
        apply(&mut window);
        self.windows.insert(self.key.clone(), window);
    }
}

impl fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // peek without lazily opening a window
        let window = self.windows.get(&self.key);
        f.debug_struct("UsageMeter")
            .field("key", &self.key)
            .field("quota_limit", &self.quota_limit)
            .field("successes", &window.as_ref().map_or(0, |w| w.successes))
            .field("failures", &window.as_ref().map_or(0, |w| w.failures))
            .finish()
    }
}

/// The process-wide usage store: one window cache shared by every
/// provider, plus the per-provider-type lock registry.
pub struct UsageTracker {
    windows: Arc<TtlCache<UsageWindow>>,
    type_locks: Mutex<HashMap<&'static str, Arc<Mutex<()>>>>,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        let windows = TtlCache::with_eviction_listener(
            WINDOW_CACHE_CAPACITY,
            |key, window: &UsageWindow, cause| {
                tracing::debug!(
                    key = %key,
                    successes = window.successes,
                    failures = window.failures,
                    cause = ?cause,
                    "usage window evicted"
                );
            },
        );

        Self {
            windows: Arc::new(windows),
            type_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a provider and hand back its meter.
    ///
    /// `type_name` identifies the concrete adapter type; its lock is
    /// created on first registration and shared by every later meter of
    /// the same type. `fingerprint` distinguishes credentials within a
    /// type: same type and same credential means same key, same window,
    /// one shared quota.
    pub fn meter(
        &self,
        type_name: &'static str,
        fingerprint: Option<u64>,
        quota_limit: u32,
        window: Duration,
    ) -> UsageMeter {
        let type_lock = self.type_lock(type_name);
        let key = match fingerprint {
            Some(fp) => format!("{type_name}-{fp:016x}"),
            None => type_name.to_string(),
        };

        UsageMeter {
            windows: Arc::clone(&self.windows),
            key,
            quota_limit,
            window,
            type_lock,
        }
    }

    /// Number of live usage windows (test and diagnostics support).
    pub fn window_count(&self) -> u64 {
        self.windows.entry_count()
    }

    fn type_lock(&self, type_name: &'static str) -> Arc<Mutex<()>> {
        Arc::clone(self.type_locks.lock().entry(type_name).or_default())
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsageTracker")
            .field("registered_types", &self.type_locks.lock().len())
            .finish()
    }
}
