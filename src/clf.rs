//! Common log format grammar
//!
//! Parses one access log line of the form
//! `host logname user [date] "METHOD path HTTP/ver" status bytes`
//! into a structured [`Entry`].

use crate::error::ClfError;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const DATE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static LINE_RE: OnceLock<Regex> = OnceLock::new();

fn line_re() -> &'static Regex {
    LINE_RE.get_or_init(|| {
        Regex::new(
            r#"^(?P<remote_host>\S+) (?P<remote_logname>\S+) (?P<auth_user>\S+) \[(?P<date>[^\]]+)\] "(?P<method>[A-Z]+) (?P<path>[^ "]+)? HTTP/[0-9.]+" (?P<status>[0-9]{3}) (?P<bytes>[0-9]+|-)"#,
        )
        .expect("common log format pattern is valid")
    })
}

/// One parsed common log format entry. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub remote_host: String,
    pub remote_logname: String,
    pub auth_user: String,
    pub date: DateTime<FixedOffset>,
    pub request: Request,
    pub status: u16,
    pub bytes: i64,
}

/// The request field of an [`Entry`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
}

/// Parse one common log format line.
///
/// Lines that do not match the grammar, carry an unparseable date, or use the
/// `-` placeholder for the byte count are rejected with a [`ClfError`].
pub fn parse(line: &str) -> Result<Entry, ClfError> {
    let caps = line_re().captures(line).ok_or(ClfError::NoMatch)?;

    let raw_date = &caps["date"];
    let date = DateTime::parse_from_str(raw_date, DATE_FORMAT)
        .map_err(|_| ClfError::Date(raw_date.to_string()))?;

    let status = caps["status"]
        .parse()
        .map_err(|_| ClfError::Status(caps["status"].to_string()))?;

    let bytes = caps["bytes"]
        .parse()
        .map_err(|_| ClfError::Bytes(caps["bytes"].to_string()))?;

    Ok(Entry {
        remote_host: caps["remote_host"].to_string(),
        remote_logname: caps["remote_logname"].to_string(),
        auth_user: caps["auth_user"].to_string(),
        date,
        request: Request {
            method: caps["method"].to_string(),
            path: caps
                .name("path")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        },
        status,
        bytes,
    })
}
