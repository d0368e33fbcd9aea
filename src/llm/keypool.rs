//! Rate-limited API key pool.
//!
//! Tracks per-key request timestamps in a trailing window and hands out the
//! least-loaded key that is still under its per-minute limit. Saturation is
//! not an error: `acquire` returns `None` and the caller backs off outside
//! the lock. All mutation happens under a single mutex; the critical section
//! is O(number of keys) and never waits.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default per-key request limit per window.
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 15;

/// Length of the trailing usage window.
const USAGE_WINDOW: Duration = Duration::from_secs(60);

/// Source of the current time.
///
/// Injected so tests can drive the usage window forward without sleeping.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now`.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Per-key bookkeeping.
struct KeyState {
    key: String,
    /// Timestamps of requests inside the trailing window, oldest first.
    usage: VecDeque<Instant>,
    /// Lifetime request count, for status reporting only.
    total: u64,
}

/// Rate-limited pool of API keys.
///
/// Selection is least-loaded with ties broken by original key order, so a
/// fresh pool rotates round-robin until load differentiates the keys.
pub struct KeyPool {
    states: Mutex<Vec<KeyState>>,
    max_requests_per_window: usize,
    window: Duration,
    clock: Box<dyn Clock>,
}

impl KeyPool {
    /// Create a pool over the given keys with the default per-minute limit.
    pub fn new(keys: Vec<String>) -> Self {
        Self::with_limit(keys, DEFAULT_REQUESTS_PER_MINUTE)
    }

    /// Create a pool with an explicit per-window request limit.
    pub fn with_limit(keys: Vec<String>, max_requests_per_window: usize) -> Self {
        Self::with_clock(keys, max_requests_per_window, Box::new(SystemClock))
    }

    /// Create a pool with an injected clock.
    pub fn with_clock(
        keys: Vec<String>,
        max_requests_per_window: usize,
        clock: Box<dyn Clock>,
    ) -> Self {
        let states = keys
            .into_iter()
            .map(|key| KeyState {
                key,
                usage: VecDeque::new(),
                total: 0,
            })
            .collect();

        Self {
            states: Mutex::new(states),
            max_requests_per_window,
            window: USAGE_WINDOW,
            clock,
        }
    }

    /// Number of keys in the pool.
    pub fn len(&self) -> usize {
        self.states.lock().expect("key pool lock poisoned").len()
    }

    /// Whether the pool holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-window request limit for each key.
    pub fn limit(&self) -> usize {
        self.max_requests_per_window
    }

    /// Drop usage entries older than the window. Idempotent for a fixed `now`.
    fn prune(state: &mut KeyState, now: Instant, window: Duration) {
        while let Some(front) = state.usage.front() {
            if now.duration_since(*front) >= window {
                state.usage.pop_front();
            } else {
                break;
            }
        }
    }

    /// Acquire the least-loaded available key, recording a usage timestamp
    /// for it.
    ///
    /// Returns `None` when every key has reached the per-window limit; the
    /// caller is expected to wait out the window and retry.
    pub fn acquire(&self) -> Option<String> {
        let mut states = self.states.lock().expect("key pool lock poisoned");
        if states.is_empty() {
            return None;
        }

        let now = self.clock.now();

        let mut best: Option<(usize, usize)> = None;
        for (index, state) in states.iter_mut().enumerate() {
            Self::prune(state, now, self.window);
            let live = state.usage.len();
            if live >= self.max_requests_per_window {
                continue;
            }
            // Strict less-than keeps the earliest key on ties.
            match best {
                Some((_, best_live)) if live >= best_live => {}
                _ => best = Some((index, live)),
            }
        }

        let (index, live) = match best {
            Some(found) => found,
            None => {
                tracing::warn!("all API keys at per-minute limit");
                return None;
            }
        };

        let state = &mut states[index];
        state.usage.push_back(now);
        state.total += 1;

        tracing::debug!(
            key_index = index,
            live = live + 1,
            limit = self.max_requests_per_window,
            total = state.total,
            "acquired API key"
        );

        Some(state.key.clone())
    }

    /// Live (in-window) usage count per key, in key order.
    pub fn live_usage(&self) -> Vec<usize> {
        let mut states = self.states.lock().expect("key pool lock poisoned");
        let now = self.clock.now();
        states
            .iter_mut()
            .map(|state| {
                Self::prune(state, now, self.window);
                state.usage.len()
            })
            .collect()
    }

    /// Human-readable pool status, one segment per key.
    pub fn status(&self) -> String {
        let mut states = self.states.lock().expect("key pool lock poisoned");
        let now = self.clock.now();
        states
            .iter_mut()
            .enumerate()
            .map(|(i, state)| {
                Self::prune(state, now, self.window);
                format!(
                    "key #{}: {}/{}/min (total: {})",
                    i + 1,
                    state.usage.len(),
                    self.max_requests_per_window,
                    state.total
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Load API keys from the environment.
///
/// Checks, in order: `PETFORGE_API_KEY` (single key), `PETFORGE_API_KEY_1`
/// through `PETFORGE_API_KEY_9`, and `PETFORGE_API_KEYS` (comma-separated).
/// Duplicates are dropped keeping first occurrence, so pool tie-breaking
/// stays deterministic.
pub fn load_keys_from_env() -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();

    let mut push_unique = |key: String| {
        let trimmed = key.trim().to_string();
        if !trimmed.is_empty() && !keys.contains(&trimmed) {
            keys.push(trimmed);
        }
    };

    if let Ok(key) = std::env::var("PETFORGE_API_KEY") {
        push_unique(key);
    }

    for i in 1..10 {
        if let Ok(key) = std::env::var(format!("PETFORGE_API_KEY_{}", i)) {
            push_unique(key);
        }
    }

    if let Ok(joined) = std::env::var("PETFORGE_API_KEYS") {
        for key in joined.split(',') {
            push_unique(key.to_string());
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Manually advanced clock for driving the usage window in tests.
    struct TestClock {
        now: Mutex<Instant>,
    }

    impl TestClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().expect("clock lock poisoned");
            *now += by;
        }
    }

    impl Clock for Arc<TestClock> {
        fn now(&self) -> Instant {
            *self.now.lock().expect("clock lock poisoned")
        }
    }

    fn pool_with_clock(keys: &[&str], limit: usize) -> (KeyPool, Arc<TestClock>) {
        let clock = TestClock::new();
        let pool = KeyPool::with_clock(
            keys.iter().map(|k| k.to_string()).collect(),
            limit,
            Box::new(Arc::clone(&clock)),
        );
        (pool, clock)
    }

    #[test]
    fn test_acquire_rotates_least_loaded() {
        let (pool, _clock) = pool_with_clock(&["a", "b"], 10);

        // Fresh pool: ties broken by key order, then least-loaded alternates.
        assert_eq!(pool.acquire().as_deref(), Some("a"));
        assert_eq!(pool.acquire().as_deref(), Some("b"));
        assert_eq!(pool.acquire().as_deref(), Some("a"));
        assert_eq!(pool.acquire().as_deref(), Some("b"));
    }

    #[test]
    fn test_limit_never_exceeded() {
        let (pool, _clock) = pool_with_clock(&["a", "b"], 3);

        for _ in 0..6 {
            assert!(pool.acquire().is_some());
        }
        // Both keys now hold 3 live entries.
        assert_eq!(pool.live_usage(), vec![3, 3]);
        assert!(pool.acquire().is_none());
        // Saturation did not push usage past the limit.
        assert_eq!(pool.live_usage(), vec![3, 3]);
    }

    #[test]
    fn test_window_expiry_restores_availability() {
        let (pool, clock) = pool_with_clock(&["only"], 2);

        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_none());

        clock.advance(Duration::from_secs(61));
        assert!(pool.acquire().is_some());
        assert_eq!(pool.live_usage(), vec![1]);
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let (pool, clock) = pool_with_clock(&["a"], 5);

        pool.acquire();
        clock.advance(Duration::from_secs(30));
        pool.acquire();
        clock.advance(Duration::from_secs(31));

        // First timestamp is 61s old, second is 31s old.
        let first = pool.live_usage();
        let second = pool.live_usage();
        assert_eq!(first, vec![1]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_saturation_picks_available_key() {
        let (pool, _clock) = pool_with_clock(&["a", "b"], 1);

        assert_eq!(pool.acquire().as_deref(), Some("a"));
        // "a" is saturated, only "b" remains.
        assert_eq!(pool.acquire().as_deref(), Some("b"));
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn test_empty_pool() {
        let (pool, _clock) = pool_with_clock(&[], 5);
        assert!(pool.is_empty());
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn test_status_reports_each_key() {
        let (pool, _clock) = pool_with_clock(&["a", "b"], 15);
        pool.acquire();

        let status = pool.status();
        assert!(status.contains("key #1: 1/15/min"));
        assert!(status.contains("key #2: 0/15/min"));
    }
}
