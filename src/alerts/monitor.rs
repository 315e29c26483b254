//! Threshold monitor with hysteresis
//!
//! Subscribes to the `Stat` topic, tracks one configured metric in a sliding
//! window, and evaluates the windowed mean against a threshold on its own
//! timer. Alerts are edge-triggered: a transition publishes exactly one
//! message, a sustained condition publishes nothing.

use crate::alerts::store::{Datapoint, MetricStore};
use crate::bus::Link;
use crate::error::{BusError, MessageError};
use crate::messages::{AlertMessage, Message, Severity, StatMessage, Topic};
use crate::shutdown::{ShutdownToken, WaitGroup};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

/// Upper bound on a single wait so cancellation is observed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often the windowed mean is evaluated against the threshold.
const EVAL_INTERVAL: Duration = Duration::from_secs(5);

/// Worker that watches one metric's snapshot stream and emits edge-triggered
/// alerts.
pub struct AlertMonitor<L: Link> {
    link: L,
    metric: String,
    threshold: f64,
    store: MetricStore,
    severity: Severity,
}

impl<L: Link> AlertMonitor<L> {
    /// `window` is the retention interval the mean is computed over.
    pub fn new(link: L, metric: impl Into<String>, threshold: f64, window: Duration) -> Self {
        Self {
            link,
            metric: metric.into(),
            threshold,
            store: MetricStore::new(window.as_secs() as i64),
            severity: Severity::Canceled,
        }
    }

    /// Worker loop: fold inbound snapshots, evaluate on the timer, exit on
    /// cancellation or close-of-stream.
    pub fn run(mut self, token: ShutdownToken, wg: WaitGroup) {
        info!(
            "alerts: monitoring {} with threshold {}",
            self.metric, self.threshold
        );

        let mut next_eval = Instant::now() + EVAL_INTERVAL;
        loop {
            if token.is_cancelled() {
                info!("alerts: shutdown signal received, exiting");
                break;
            }

            let wait = next_eval
                .saturating_duration_since(Instant::now())
                .min(POLL_INTERVAL);
            match self.link.recv_timeout(wait) {
                Ok(payload) => {
                    if let Err(err) = self.process_payload(&payload) {
                        warn!("alerts: dropping message: {err}");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("alerts: bus closed, exiting");
                    break;
                }
            }

            if Instant::now() >= next_eval {
                if let Err(err) = self.evaluate(Utc::now().timestamp()) {
                    warn!("alerts: failed publishing alert: {err}");
                }
                next_eval += EVAL_INTERVAL;
            }
        }

        wg.done();
    }

    /// Decode one snapshot and record the watched metric, if present.
    ///
    /// The datapoint is stamped with the snapshot's window end, not the
    /// arrival time, so delivery jitter does not skew the window.
    fn process_payload(&mut self, payload: &[u8]) -> Result<(), MessageError> {
        let msg: StatMessage = serde_json::from_slice(payload)?;
        if !msg.is_valid() {
            return Err(MessageError::WrongKind);
        }

        if let Some(value) = msg.stats.get(&self.metric) {
            self.store.push(Datapoint {
                timestamp: msg.end,
                value: *value,
            });
        }

        Ok(())
    }

    /// Evaluate the windowed mean and publish on state transitions only.
    fn evaluate(&mut self, now: i64) -> Result<(), BusError> {
        let mean = self.store.mean(now);
        let above = mean > self.threshold;

        let message = match (above, self.severity) {
            (true, Severity::Canceled) => {
                info!("alerts: raising alert for {}", self.metric);
                self.severity = Severity::Raised;
                AlertMessage::new(
                    &self.metric,
                    Severity::Raised,
                    format!(
                        "High traffic generated an alert - hits = {:.2}, triggered at {}",
                        mean,
                        format_time(now)
                    ),
                )
            }
            (false, Severity::Raised) => {
                info!("alerts: cancelling alert for {}", self.metric);
                self.severity = Severity::Canceled;
                AlertMessage::new(
                    &self.metric,
                    Severity::Canceled,
                    format!(
                        "High traffic alert recovered - hits = {:.2}, at {}",
                        mean,
                        format_time(now)
                    ),
                )
            }
            _ => {
                debug!("alerts: no transition for {}", self.metric);
                return Ok(());
            }
        };

        self.link.send(Topic::Alert, &Message::Alert(message))
    }
}

fn format_time(now: i64) -> String {
    DateTime::<Utc>::from_timestamp(now, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| now.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::connection::MockLink;
    use crate::bus::InMemoryLink;
    use mockall::predicate;
    use std::collections::HashMap;

    fn snapshot_payload(metric: &str, value: i64, end: i64) -> Vec<u8> {
        let stats = HashMap::from([(metric.to_string(), value)]);
        serde_json::to_vec(&StatMessage::new(stats, end - 1, end)).unwrap()
    }

    fn monitor(threshold: f64, window_secs: u64) -> AlertMonitor<InMemoryLink> {
        AlertMonitor::new(
            InMemoryLink::new(),
            "requests.total",
            threshold,
            Duration::from_secs(window_secs),
        )
    }

    #[test]
    fn test_hysteresis_publishes_one_message_per_transition() {
        let mut monitor = monitor(5.0, 1);

        // mean = 10 > 5: exactly one raised alert.
        monitor
            .process_payload(&snapshot_payload("requests.total", 10, 10))
            .unwrap();
        monitor.evaluate(10).unwrap();

        // mean = 12, still above: silence.
        monitor
            .process_payload(&snapshot_payload("requests.total", 12, 12))
            .unwrap();
        monitor.evaluate(12).unwrap();

        // mean = 3 <= 5: exactly one canceled alert.
        monitor
            .process_payload(&snapshot_payload("requests.total", 3, 14))
            .unwrap();
        monitor.evaluate(14).unwrap();

        // mean = 2, still below: silence.
        monitor
            .process_payload(&snapshot_payload("requests.total", 2, 16))
            .unwrap();
        monitor.evaluate(16).unwrap();

        let sent = monitor.link.sent();
        assert_eq!(sent.len(), 2);

        let Message::Alert(raised) = &sent[0].1 else {
            panic!("expected an alert message");
        };
        assert_eq!(sent[0].0, Topic::Alert);
        assert_eq!(raised.severity, Severity::Raised);
        assert_eq!(raised.metric, "requests.total");
        assert!(raised.text.contains("hits = 10.00"));

        let Message::Alert(canceled) = &sent[1].1 else {
            panic!("expected an alert message");
        };
        assert_eq!(canceled.severity, Severity::Canceled);
        assert!(canceled.text.contains("hits = 3.00"));
    }

    #[test]
    fn test_mean_at_threshold_cancels_a_raised_alert() {
        let mut monitor = monitor(5.0, 1);

        monitor
            .process_payload(&snapshot_payload("requests.total", 10, 10))
            .unwrap();
        monitor.evaluate(10).unwrap();

        // mean == threshold is not above it: Raised -> Canceled.
        monitor
            .process_payload(&snapshot_payload("requests.total", 5, 12))
            .unwrap();
        monitor.evaluate(12).unwrap();

        let sent = monitor.link.sent();
        assert_eq!(sent.len(), 2);
        let Message::Alert(last) = &sent[1].1 else {
            panic!("expected an alert message");
        };
        assert_eq!(last.severity, Severity::Canceled);
    }

    #[test]
    fn test_quiet_store_below_threshold_stays_silent() {
        let mut link = MockLink::new();
        link.expect_send().times(0);

        let mut monitor =
            AlertMonitor::new(link, "requests.total", 5.0, Duration::from_secs(1));
        monitor.evaluate(100).unwrap();
    }

    #[test]
    fn test_raised_alert_is_published_on_the_alert_topic() {
        let mut link = MockLink::new();
        link.expect_send()
            .with(
                predicate::eq(Topic::Alert),
                predicate::function(|message: &Message| {
                    matches!(
                        message,
                        Message::Alert(alert) if alert.severity == Severity::Raised
                    )
                }),
            )
            .times(1)
            .returning(|_, _| Ok(()));

        let mut monitor =
            AlertMonitor::new(link, "requests.total", 5.0, Duration::from_secs(1));
        monitor
            .process_payload(&snapshot_payload("requests.total", 10, 10))
            .unwrap();
        monitor.evaluate(10).unwrap();
    }

    #[test]
    fn test_datapoint_uses_the_snapshot_window_end() {
        let mut monitor = monitor(5.0, 10);

        monitor
            .process_payload(&snapshot_payload("requests.total", 100, 50))
            .unwrap();

        // At t=61 a point stamped with the window end 50 has aged out of the
        // 10 second window; a point stamped at arrival time would not have.
        monitor.evaluate(61).unwrap();
        assert!(monitor.link.sent().is_empty());
    }

    #[test]
    fn test_snapshots_without_the_metric_are_ignored() {
        let mut monitor = monitor(0.5, 1);

        monitor
            .process_payload(&snapshot_payload("bytes.total", 1000, 10))
            .unwrap();
        monitor.evaluate(10).unwrap();

        assert!(monitor.link.sent().is_empty());
    }

    #[test]
    fn test_wrong_kind_payload_is_rejected() {
        let mut monitor = monitor(5.0, 1);
        let alert = AlertMessage::new("requests.total", Severity::Raised, "alert");
        let payload = serde_json::to_vec(&alert).unwrap();

        assert!(monitor.process_payload(&payload).is_err());
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let mut monitor = monitor(5.0, 1);
        assert!(matches!(
            monitor.process_payload(b"not json"),
            Err(MessageError::Decode(_))
        ));
    }
}
