//! Bus attachments
//!
//! [`Link`] is the capability a worker needs from the bus: publish a message
//! on a topic, and receive payloads from the subscribed topics. The real
//! [`Connection`] is backed by the bus channels; [`InMemoryLink`] is a
//! queue-backed stand-in for tests.

use crate::error::BusError;
use crate::messages::{Envelope, Message, Topic};
use serde_json::value::RawValue;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Capability interface over a bus attachment.
///
/// Workers are generic over this trait so they can run against the real bus
/// or an in-memory fake.
#[cfg_attr(test, mockall::automock)]
pub trait Link: Send {
    /// Serialize the message, wrap it in an envelope and hand it to the bus.
    ///
    /// Fails only on serialization or when the bus has shut down; delivery to
    /// subscribers is always attempted by the dispatch loop.
    fn send(&self, topic: Topic, message: &Message) -> Result<(), BusError>;

    /// Wait for the next payload published on any subscribed topic.
    ///
    /// `Err(Disconnected)` signals close-of-stream: the bus has shut down and
    /// no further payloads will arrive.
    fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError>;
}

/// Channel-backed bus connection handed out by [`Bus::connect`].
///
/// [`Bus::connect`]: crate::bus::Bus::connect
pub struct Connection {
    write: SyncSender<Vec<u8>>,
    read: Receiver<Vec<u8>>,
}

impl Connection {
    pub(crate) fn new(write: SyncSender<Vec<u8>>, read: Receiver<Vec<u8>>) -> Self {
        Self { write, read }
    }
}

impl Link for Connection {
    fn send(&self, topic: Topic, message: &Message) -> Result<(), BusError> {
        let payload = RawValue::from_string(serde_json::to_string(message)?)?;
        let envelope = Envelope { topic, payload };
        let raw = serde_json::to_vec(&envelope)?;

        self.write.send(raw).map_err(|_| BusError::Closed)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.read.recv_timeout(timeout)
    }
}

/// In-memory [`Link`] fake.
///
/// Records every sent message and serves queued inbound payloads. Once
/// [`InMemoryLink::close`] has been called an empty queue reports
/// close-of-stream, so a worker loop drains the queue and exits.
#[derive(Debug, Default)]
pub struct InMemoryLink {
    sent: Mutex<Vec<(Topic, Message)>>,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
}

impl InMemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the worker side to receive, serialized exactly as
    /// the bus would deliver it.
    pub fn push_inbound(&self, message: &Message) {
        let payload = serde_json::to_vec(message).expect("test message serializes");
        self.inbound.lock().unwrap().push_back(payload);
    }

    /// Queue a raw payload, bypassing serialization.
    pub fn push_inbound_raw(&self, payload: Vec<u8>) {
        self.inbound.lock().unwrap().push_back(payload);
    }

    /// Report close-of-stream once the queue is drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Everything sent through this link so far.
    pub fn sent(&self) -> Vec<(Topic, Message)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Link for InMemoryLink {
    fn send(&self, topic: Topic, message: &Message) -> Result<(), BusError> {
        // Run the message through the serializer so the fake rejects exactly
        // what the real connection would.
        serde_json::to_string(message)?;
        self.sent.lock().unwrap().push((topic, message.clone()));
        Ok(())
    }

    fn recv_timeout(&self, _timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        match self.inbound.lock().unwrap().pop_front() {
            Some(payload) => Ok(payload),
            None if self.closed.load(Ordering::SeqCst) => Err(RecvTimeoutError::Disconnected),
            None => Err(RecvTimeoutError::Timeout),
        }
    }
}

impl Link for Arc<InMemoryLink> {
    fn send(&self, topic: Topic, message: &Message) -> Result<(), BusError> {
        self.as_ref().send(topic, message)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        self.as_ref().recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AlertMessage, Severity, StatMessage};
    use std::collections::HashMap;

    #[test]
    fn test_in_memory_link_records_sent_messages() {
        let link = InMemoryLink::new();
        let message = Message::Alert(AlertMessage::new(
            "requests.total",
            Severity::Raised,
            "alert",
        ));

        link.send(Topic::Alert, &message).unwrap();

        let sent = link.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Topic::Alert);
        assert_eq!(sent[0].1, message);
    }

    #[test]
    fn test_in_memory_link_serves_queued_payloads_in_order() {
        let link = InMemoryLink::new();
        let first = Message::Stat(StatMessage::new(HashMap::new(), 0, 1));
        let second = Message::Stat(StatMessage::new(HashMap::new(), 1, 2));

        link.push_inbound(&first);
        link.push_inbound(&second);

        let timeout = Duration::from_millis(1);
        let payload = link.recv_timeout(timeout).unwrap();
        let msg: StatMessage = serde_json::from_slice(&payload).unwrap();
        assert_eq!(msg.init, 0);

        let payload = link.recv_timeout(timeout).unwrap();
        let msg: StatMessage = serde_json::from_slice(&payload).unwrap();
        assert_eq!(msg.init, 1);

        assert_eq!(link.recv_timeout(timeout), Err(RecvTimeoutError::Timeout));

        link.close();
        assert_eq!(
            link.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        );
    }

    #[test]
    fn test_closed_link_drains_queue_before_disconnecting() {
        let link = InMemoryLink::new();
        link.push_inbound(&Message::Stat(StatMessage::new(HashMap::new(), 0, 1)));
        link.close();

        let timeout = Duration::from_millis(1);
        assert!(link.recv_timeout(timeout).is_ok());
        assert_eq!(
            link.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        );
    }
}
