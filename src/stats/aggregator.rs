//! Entry stream to counter snapshot aggregation
//!
//! Subscribes to the `Data` topic, folds every parsed entry into a flat set
//! of counters, and publishes the counters as a `Stat` snapshot on a fixed
//! flush interval.

use crate::bus::Link;
use crate::clf::Entry;
use crate::error::{BusError, MessageError};
use crate::messages::{EntryMessage, Message, StatMessage, Topic};
use crate::shutdown::{ShutdownToken, WaitGroup};
use crate::stats::cache::CounterCache;
use log::{debug, info, warn};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Upper bound on a single wait so cancellation is observed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker that turns a stream of entries into periodic counter snapshots.
pub struct StatsAggregator<L: Link> {
    link: L,
    flush_interval: Duration,
    cache: CounterCache,
}

impl<L: Link> StatsAggregator<L> {
    pub fn new(link: L, flush_interval: Duration) -> Self {
        Self {
            link,
            flush_interval,
            cache: CounterCache::new(),
        }
    }

    /// Worker loop: fold inbound entries, flush on the interval, exit on
    /// cancellation or close-of-stream.
    pub fn run(self, token: ShutdownToken, wg: WaitGroup) {
        info!("stats: aggregating entries");

        let mut next_flush = Instant::now() + self.flush_interval;
        loop {
            if token.is_cancelled() {
                info!("stats: shutdown signal received, exiting");
                break;
            }

            let wait = next_flush
                .saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL);
            match self.link.recv_timeout(wait) {
                Ok(payload) => {
                    if let Err(err) = self.process_payload(&payload) {
                        warn!("stats: dropping message: {err}");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("stats: bus closed, exiting");
                    break;
                }
            }

            if Instant::now() >= next_flush {
                if let Err(err) = self.flush() {
                    warn!("stats: failed publishing snapshot: {err}");
                }
                next_flush += self.flush_interval;
            }
        }

        wg.done();
    }

    /// Decode one payload from the `Data` topic and fold it into the cache.
    fn process_payload(&self, payload: &[u8]) -> Result<(), MessageError> {
        let msg: EntryMessage = serde_json::from_slice(payload)?;
        if !msg.is_valid() {
            return Err(MessageError::WrongKind);
        }

        self.observe(&msg.entry);
        Ok(())
    }

    /// Increment the full counter set for one entry.
    fn observe(&self, entry: &Entry) {
        let root = root_path(&entry.request.path);
        let status = entry.status;
        let method = &entry.request.method;

        self.cache.increment("requests.total", 1);
        self.cache.increment("bytes.total", entry.bytes);

        self.cache.increment(&format!("path.{root}.requests"), 1);
        self.cache.increment(&format!("path.{root}.bytes"), entry.bytes);

        self.cache.increment(&format!("status.{status}.requests"), 1);
        self.cache
            .increment(&format!("status.{status}.bytes"), entry.bytes);

        self.cache.increment(&format!("method.{method}.requests"), 1);
        self.cache
            .increment(&format!("method.{method}.bytes"), entry.bytes);
    }

    /// Swap the counters out and publish them as a snapshot.
    fn flush(&self) -> Result<(), BusError> {
        let (stats, init, end) = self.cache.snapshot();
        debug!("stats: publishing snapshot with {} counters", stats.len());

        self.link
            .send(Topic::Stat, &Message::Stat(StatMessage::new(stats, init, end)))
    }
}

/// First segment of a request path, or `/` when there is none.
fn root_path(path: &str) -> String {
    match path.split('/').nth(1) {
        Some(segment) if !segment.is_empty() => format!("/{segment}"),
        _ => "/".to_string(),
    }
}
