//! In-process publish/subscribe exchange keyed by topic
//!
//! The bus decouples the pipeline workers: publishers hand serialized
//! envelopes to a single bounded inbound queue, and a single dispatch loop
//! forwards each payload to every channel subscribed to the envelope's topic.
//! Because dispatch is single-threaded, publish order across all topics and
//! publishers is the bus's total order, and every subscriber observes its
//! messages in that same relative order.

use crate::bus::connection::Connection;
use crate::messages::{Envelope, Topic};
use crate::shutdown::{ShutdownToken, WaitGroup};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Buffered messages per subscriber channel and for the inbound queue.
///
/// A subscriber that falls this far behind blocks dispatch for everyone:
/// the pipeline's single point of flow control.
pub const CHANNEL_CAPACITY: usize = 100;

/// How often the dispatch loop wakes up to observe cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type Registry = HashMap<Topic, Vec<SyncSender<Vec<u8>>>>;

/// Explicitly constructed bus instance, injected into every worker.
pub struct Bus {
    registry: Arc<Mutex<Registry>>,
    inbound_tx: SyncSender<Vec<u8>>,
    inbound_rx: mpsc::Receiver<Vec<u8>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            inbound_tx,
            inbound_rx,
        }
    }

    /// Open a connection to the bus.
    ///
    /// Registers one bounded channel under every listed topic; the connection
    /// receives every future publish on any of them, in publish order. A
    /// connection with no topics is publish-only.
    pub fn connect(&self, topics: &[Topic]) -> Connection {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);

        let mut registry = self.registry.lock().unwrap();
        for topic in topics {
            registry.entry(*topic).or_default().push(tx.clone());
        }

        Connection::new(self.inbound_tx.clone(), rx)
    }

    /// Dispatch loop; runs until the shutdown token is cancelled.
    ///
    /// On exit the subscriber registry is dropped, which closes every
    /// subscriber channel and signals close-of-stream to the workers.
    pub fn run(self, token: ShutdownToken, wg: WaitGroup) {
        info!("bus: listening for messages");

        loop {
            if token.is_cancelled() {
                info!("bus: shutdown signal received, exiting");
                break;
            }

            match self.inbound_rx.recv_timeout(POLL_INTERVAL) {
                Ok(raw) => self.dispatch(&raw),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("bus: all publishers gone, exiting");
                    break;
                }
            }
        }

        self.registry.lock().unwrap().clear();
        info!("bus: stopped");
        wg.done();
    }

    /// Deliver one envelope to every subscriber of its topic, in
    /// registration order. A full subscriber channel blocks here: that is
    /// backpressure, not a failure.
    fn dispatch(&self, raw: &[u8]) {
        let envelope: Envelope = match serde_json::from_slice(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("bus: dropping undecodable envelope: {err}");
                return;
            }
        };

        let payload = envelope.payload.get().as_bytes();

        let registry = self.registry.lock().unwrap();
        let Some(subscribers) = registry.get(&envelope.topic) else {
            debug!("bus: no subscribers for topic {:?}", envelope.topic);
            return;
        };

        for subscriber in subscribers {
            if subscriber.send(payload.to_vec()).is_err() {
                debug!("bus: subscriber channel closed for {:?}", envelope.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::connection::Link;
    use crate::messages::{AlertMessage, Message, Severity, StatMessage};
    use std::collections::HashMap;
    use std::thread;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    fn stat_message(seq: i64) -> Message {
        Message::Stat(StatMessage::new(
            HashMap::from([("seq".to_string(), seq)]),
            seq,
            seq + 1,
        ))
    }

    fn running_bus(bus: Bus) -> (ShutdownToken, WaitGroup, thread::JoinHandle<()>) {
        let token = ShutdownToken::new();
        let wg = WaitGroup::new();
        wg.add(1);
        let handle = {
            let (token, wg) = (token.clone(), wg.clone());
            thread::spawn(move || bus.run(token, wg))
        };
        (token, wg, handle)
    }

    #[test]
    fn test_subscriber_receives_publishes_in_order() {
        let bus = Bus::new();
        let subscriber = bus.connect(&[Topic::Stat]);
        let publisher = bus.connect(&[]);
        let (token, wg, handle) = running_bus(bus);

        for seq in 0..10 {
            publisher.send(Topic::Stat, &stat_message(seq)).unwrap();
        }

        for expected in 0..10 {
            let payload = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
            let msg: StatMessage = serde_json::from_slice(&payload).unwrap();
            assert!(msg.is_valid());
            assert_eq!(msg.stats["seq"], expected);
        }

        token.cancel();
        wg.wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_publish_fans_out_to_topic_subscribers_only() {
        let bus = Bus::new();
        let first = bus.connect(&[Topic::Stat]);
        let second = bus.connect(&[Topic::Stat]);
        let other = bus.connect(&[Topic::Alert]);
        let publisher = bus.connect(&[]);
        let (token, wg, handle) = running_bus(bus);

        publisher.send(Topic::Stat, &stat_message(7)).unwrap();

        for subscriber in [&first, &second] {
            let payload = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
            let msg: StatMessage = serde_json::from_slice(&payload).unwrap();
            assert_eq!(msg.stats["seq"], 7);
        }

        // The alert subscriber must not see a publish on another topic.
        assert_eq!(
            other.recv_timeout(Duration::from_millis(300)),
            Err(RecvTimeoutError::Timeout)
        );

        token.cancel();
        wg.wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_multi_topic_subscription_sees_both_streams() {
        let bus = Bus::new();
        let subscriber = bus.connect(&[Topic::Stat, Topic::Alert]);
        let publisher = bus.connect(&[]);
        let (token, wg, handle) = running_bus(bus);

        publisher.send(Topic::Stat, &stat_message(1)).unwrap();
        publisher
            .send(
                Topic::Alert,
                &Message::Alert(AlertMessage::new(
                    "requests.total",
                    Severity::Raised,
                    "alert",
                )),
            )
            .unwrap();

        let first = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
        let msg: StatMessage = serde_json::from_slice(&first).unwrap();
        assert_eq!(msg.stats["seq"], 1);

        let second = subscriber.recv_timeout(RECV_TIMEOUT).unwrap();
        let msg: AlertMessage = serde_json::from_slice(&second).unwrap();
        assert_eq!(msg.severity, Severity::Raised);

        token.cancel();
        wg.wait();
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_closes_subscriber_channels() {
        let bus = Bus::new();
        let subscriber = bus.connect(&[Topic::Data]);
        let (token, wg, handle) = running_bus(bus);

        token.cancel();
        wg.wait();
        handle.join().unwrap();

        assert_eq!(
            subscriber.recv_timeout(RECV_TIMEOUT),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
