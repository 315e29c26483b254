//! Cooperative shutdown primitives
//!
//! Every worker receives a clone of the same [`ShutdownToken`] and observes it
//! inside its wait loop; nothing is preempted. A [`WaitGroup`] counts workers
//! still running so the orchestrator can block until all of them have exited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Shared cancellation signal, broadcast once and observed cooperatively.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    cancelled: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every holder of this token to stop. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Counting completion barrier.
///
/// The orchestrator calls [`WaitGroup::add`] before spawning workers; each
/// worker calls [`WaitGroup::done`] as the last thing before its thread exits,
/// and [`WaitGroup::wait`] blocks until the count reaches zero.
#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Debug, Default)]
struct WaitGroupInner {
    count: Mutex<usize>,
    zero: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `n` more workers to wait for.
    pub fn add(&self, n: usize) {
        let mut count = self.inner.count.lock().unwrap();
        *count += n;
    }

    /// Mark one worker as finished.
    pub fn done(&self) {
        let mut count = self.inner.count.lock().unwrap();
        match count.checked_sub(1) {
            Some(remaining) => *count = remaining,
            None => log::warn!("waitgroup: done called more times than add"),
        }
        if *count == 0 {
            self.inner.zero.notify_all();
        }
    }

    /// Block until every registered worker has called [`WaitGroup::done`].
    pub fn wait(&self) {
        let mut count = self.inner.count.lock().unwrap();
        while *count > 0 {
            count = self.inner.zero.wait(count).unwrap();
        }
    }
}
