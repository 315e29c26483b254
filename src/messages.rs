//! Wire contracts shared by every worker on the bus
//!
//! This module defines the bus envelope, the topic routing keys and the three
//! message classes exchanged by the pipeline workers. Every message carries an
//! integer `type` tag so consumers can reject payloads published on the right
//! topic with the wrong shape.

use crate::clf::Entry;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::HashMap;

/// Routing key for the bus; a closed set of message classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Topic {
    /// Parsed access log entries
    Data = 0,
    /// Periodic counter snapshots
    Stat = 1,
    /// Alert state transitions
    Alert = 2,
}

impl From<Topic> for u8 {
    fn from(topic: Topic) -> u8 {
        topic as u8
    }
}

impl TryFrom<u8> for Topic {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Topic::Data),
            1 => Ok(Topic::Stat),
            2 => Ok(Topic::Alert),
            other => Err(format!("unknown topic: {other}")),
        }
    }
}

/// Integer `type` tag carried by every message payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageKind {
    Entry = 0,
    Stat = 1,
    Alert = 2,
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Entry),
            1 => Ok(MessageKind::Stat),
            2 => Ok(MessageKind::Alert),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

/// Severity of an alert transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    /// The monitored mean is at or below the threshold
    Canceled = 0,
    /// The monitored mean exceeded the threshold
    Raised = 1,
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Severity::Canceled),
            1 => Ok(Severity::Raised),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Bus-internal wrapper around a serialized message.
///
/// The bus routes on `topic` only and never inspects `payload`, which is an
/// opaque JSON document produced by the publishing worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    pub payload: Box<RawValue>,
}

/// One parsed access log entry published on [`Topic::Data`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(flatten)]
    pub entry: Entry,
}

impl EntryMessage {
    pub fn new(entry: Entry) -> Self {
        Self {
            kind: MessageKind::Entry,
            entry,
        }
    }

    /// Check that the payload carries the expected type tag
    pub fn is_valid(&self) -> bool {
        self.kind == MessageKind::Entry
    }
}

/// One counter snapshot published on [`Topic::Stat`].
///
/// `init` and `end` are the unix-second bounds of the flush window the
/// counters were accumulated over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub stats: HashMap<String, i64>,
    pub init: i64,
    pub end: i64,
}

impl StatMessage {
    pub fn new(stats: HashMap<String, i64>, init: i64, end: i64) -> Self {
        Self {
            kind: MessageKind::Stat,
            stats,
            init,
            end,
        }
    }

    /// Check that the payload carries the expected type tag
    pub fn is_valid(&self) -> bool {
        self.kind == MessageKind::Stat
    }
}

/// One alert transition published on [`Topic::Alert`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub metric: String,
    pub severity: Severity,
    pub text: String,
}

impl AlertMessage {
    pub fn new(metric: impl Into<String>, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Alert,
            metric: metric.into(),
            severity,
            text: text.into(),
        }
    }

    /// Check that the payload carries the expected type tag
    pub fn is_valid(&self) -> bool {
        self.kind == MessageKind::Alert
    }
}

/// Any message a worker can publish.
///
/// Serialization is untagged: the variant structs already carry their own
/// integer `type` field, so the wire shape is exactly the inner struct's.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Entry(EntryMessage),
    Stat(StatMessage),
    Alert(AlertMessage),
}

impl From<EntryMessage> for Message {
    fn from(msg: EntryMessage) -> Self {
        Message::Entry(msg)
    }
}

impl From<StatMessage> for Message {
    fn from(msg: StatMessage) -> Self {
        Message::Stat(msg)
    }
}

impl From<AlertMessage> for Message {
    fn from(msg: AlertMessage) -> Self {
        Message::Alert(msg)
    }
}

/// Reads the `type` tag of a payload without decoding the full message.
///
/// Consumers subscribed to more than one topic use this to pick the concrete
/// message type to decode into.
pub fn peek_kind(payload: &[u8]) -> Result<MessageKind, serde_json::Error> {
    #[derive(Deserialize)]
    struct KindProbe {
        #[serde(rename = "type")]
        kind: MessageKind,
    }

    let probe: KindProbe = serde_json::from_slice(payload)?;
    Ok(probe.kind)
}
