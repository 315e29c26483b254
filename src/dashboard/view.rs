//! Dashboard state and rendering
//!
//! Keeps a rolling history of the total counters, cumulative per-root-path
//! totals and the most recent alerts, and renders them as three panes.

use crate::messages::{Severity, StatMessage};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, List, ListItem, Row, Sparkline, Table};
use ratatui::Frame;
use std::collections::{BTreeMap, VecDeque};

/// Alerts kept in the bottom pane.
const MAX_ALERTS: usize = 50;

#[derive(Debug, Default, Clone)]
struct PathRow {
    requests: i64,
    bytes: i64,
}

/// Aggregated dashboard data fed from `Stat` and `Alert` messages.
pub struct View {
    /// History window in seconds for the total series
    window: i64,
    requests: VecDeque<(i64, u64)>,
    bytes: VecDeque<(i64, u64)>,
    paths: BTreeMap<String, PathRow>,
    alerts: VecDeque<String>,
}

impl View {
    pub fn new(window: i64) -> Self {
        Self {
            window: window.max(1),
            requests: VecDeque::new(),
            bytes: VecDeque::new(),
            paths: BTreeMap::new(),
            alerts: VecDeque::new(),
        }
    }

    /// Fold one counter snapshot into the series and the path table.
    pub fn apply_snapshot(&mut self, msg: &StatMessage) {
        let end = msg.end;

        let total = |name: &str| msg.stats.get(name).copied().unwrap_or(0).max(0) as u64;
        self.requests.push_back((end, total("requests.total")));
        self.bytes.push_back((end, total("bytes.total")));

        let limit = end - self.window;
        while self.requests.front().is_some_and(|(t, _)| *t < limit) {
            self.requests.pop_front();
        }
        while self.bytes.front().is_some_and(|(t, _)| *t < limit) {
            self.bytes.pop_front();
        }

        for (name, value) in &msg.stats {
            let Some(rest) = name.strip_prefix("path.") else {
                continue;
            };
            if let Some(root) = rest.strip_suffix(".requests") {
                self.paths.entry(root.to_string()).or_default().requests += value;
            } else if let Some(root) = rest.strip_suffix(".bytes") {
                self.paths.entry(root.to_string()).or_default().bytes += value;
            }
        }
    }

    /// Prepend one alert line, keeping only the newest entries.
    pub fn push_alert(&mut self, severity: Severity, text: &str) {
        let marker = match severity {
            Severity::Raised => "[RAISED]",
            Severity::Canceled => "[CANCELED]",
        };
        self.alerts.push_front(format!("{marker} {text}"));
        self.alerts.truncate(MAX_ALERTS);
    }

    /// Draw the three panes into the frame.
    pub fn render(&self, frame: &mut Frame) {
        let panes = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(8),
                Constraint::Min(8),
                Constraint::Length(8),
            ])
            .split(frame.area());

        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(panes[0]);

        let requests: Vec<u64> = self.requests.iter().map(|(_, v)| *v).collect();
        let sparkline = Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title("Total requests"))
            .style(Style::default().fg(Color::Yellow))
            .data(&requests);
        frame.render_widget(sparkline, top[0]);

        let bytes: Vec<u64> = self.bytes.iter().map(|(_, v)| *v).collect();
        let sparkline = Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title("Total bytes"))
            .style(Style::default().fg(Color::Blue))
            .data(&bytes);
        frame.render_widget(sparkline, top[1]);

        let header = Row::new(["Path", "Requests", "Bytes"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows: Vec<Row> = self
            .paths
            .iter()
            .map(|(root, row)| {
                Row::new([
                    root.clone(),
                    row.requests.to_string(),
                    row.bytes.to_string(),
                ])
            })
            .collect();
        let table = Table::new(
            rows,
            [
                Constraint::Percentage(50),
                Constraint::Percentage(25),
                Constraint::Percentage(25),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Paths"));
        frame.render_widget(table, panes[1]);

        let items: Vec<ListItem> = self
            .alerts
            .iter()
            .map(|alert| ListItem::new(alert.as_str()))
            .collect();
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title("Alerts"));
        frame.render_widget(list, panes[2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn snapshot(end: i64, stats: &[(&str, i64)]) -> StatMessage {
        let stats = stats
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect::<HashMap<_, _>>();
        StatMessage::new(stats, end - 2, end)
    }

    #[test]
    fn test_snapshot_feeds_series_and_paths() {
        let mut view = View::new(600);
        view.apply_snapshot(&snapshot(
            100,
            &[
                ("requests.total", 3),
                ("bytes.total", 300),
                ("path./users.requests", 2),
                ("path./users.bytes", 200),
                ("path./admin.requests", 1),
            ],
        ));

        assert_eq!(view.requests.back(), Some(&(100, 3)));
        assert_eq!(view.bytes.back(), Some(&(100, 300)));
        assert_eq!(view.paths["/users"].requests, 2);
        assert_eq!(view.paths["/users"].bytes, 200);
        assert_eq!(view.paths["/admin"].requests, 1);
    }

    #[test]
    fn test_path_totals_accumulate_across_snapshots() {
        let mut view = View::new(600);
        view.apply_snapshot(&snapshot(100, &[("path./users.requests", 2)]));
        view.apply_snapshot(&snapshot(102, &[("path./users.requests", 3)]));

        assert_eq!(view.paths["/users"].requests, 5);
    }

    #[test]
    fn test_series_history_is_bounded_by_the_window() {
        let mut view = View::new(10);
        view.apply_snapshot(&snapshot(100, &[("requests.total", 1)]));
        view.apply_snapshot(&snapshot(105, &[("requests.total", 2)]));
        view.apply_snapshot(&snapshot(120, &[("requests.total", 3)]));

        // Points older than end - window have been pruned.
        assert_eq!(view.requests.len(), 1);
        assert_eq!(view.requests.front(), Some(&(120, 3)));
    }

    #[test]
    fn test_alerts_are_newest_first_and_bounded() {
        let mut view = View::new(600);
        for i in 0..60 {
            view.push_alert(Severity::Raised, &format!("alert {i}"));
        }

        assert_eq!(view.alerts.len(), MAX_ALERTS);
        assert!(view.alerts[0].contains("alert 59"));
        assert!(view.alerts[0].starts_with("[RAISED]"));
    }
}
