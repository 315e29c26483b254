use chrono::Utc;
use std::collections::HashMap;
use std::mem;
use std::sync::Mutex;

/// Flat mapping of dot-delimited counter names to values.
///
/// [`CounterCache::snapshot`] swaps the mapping out for an empty one under the
/// lock, so an increment lands either in the returned window or in the next
/// one, never in both.
#[derive(Debug, Default)]
pub struct CounterCache {
    state: Mutex<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    counters: HashMap<String, i64>,
    window_start: i64,
}

impl Default for CacheState {
    fn default() -> Self {
        Self {
            counters: HashMap::new(),
            window_start: Utc::now().timestamp(),
        }
    }
}

impl CounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the named counter, creating it at zero if absent.
    pub fn increment(&self, metric: &str, delta: i64) {
        let mut state = self.state.lock().unwrap();
        *state.counters.entry(metric.to_string()).or_insert(0) += delta;
    }

    /// Atomically take the current counters and reset the window.
    ///
    /// Returns the counters together with the window bounds
    /// `[last snapshot, now]` in unix seconds.
    pub fn snapshot(&self) -> (HashMap<String, i64>, i64, i64) {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now().timestamp();

        let counters = mem::take(&mut state.counters);
        let window_start = mem::replace(&mut state.window_start, now);

        (counters, window_start, now)
    }
}
