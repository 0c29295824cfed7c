//! Log normalization: upstream log shapes to display strings and a common
//! event type.
//!
//! Everything in here is total. Malformed upstream data degrades to raw text
//! and never produces an error.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::OnceLock;

use chrono::{Local, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use dash_api::types::ApiLogRow;

const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One event as returned by an external log store's filter call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLogEvent {
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_stream_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ExternalLogEvent {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One `{field, value}` cell of an external query result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResultField {
    pub field: String,
    pub value: String,
}

impl QueryResultField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[derive(Deserialize)]
struct StructuredLine {
    log: Option<serde_json::Value>,
}

/// Extract the `log` field of a JSON-encoded line, or `None` if the line is
/// not an object carrying one.
fn structured_log_text(message: &str) -> Option<String> {
    let line: StructuredLine = serde_json::from_str(message).ok()?;
    match line.log? {
        serde_json::Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Render an external log event as `"<yyyy-MM-dd HH:mm> <log text>"` in `tz`.
///
/// An empty message renders as `""`. A message that is not JSON with a `log`
/// field is shown as-is. A missing or out-of-range timestamp renders the
/// text alone.
pub fn external_log_event_to_display_string<Tz>(event: &ExternalLogEvent, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let message = match event.message.as_deref() {
        None | Some("") => return String::new(),
        Some(message) => message,
    };

    let text = match structured_log_text(message) {
        Some(text) => text,
        None => {
            warn!(
                target: "dash::log_format",
                event_id = event.event_id.as_deref().unwrap_or(""),
                "log message is not structured JSON; showing raw text"
            );
            message.to_string()
        }
    };

    match event
        .timestamp
        .and_then(|ms| tz.timestamp_millis_opt(ms).single())
    {
        Some(at) => format!("{} {text}", at.format(MINUTE_FORMAT)),
        None => text,
    }
}

/// [`external_log_event_to_display_string`] in the process time zone.
pub fn external_log_event_to_display_string_local(event: &ExternalLogEvent) -> String {
    external_log_event_to_display_string(event, &Local)
}

fn seconds_suffix() -> Option<&'static Regex> {
    static SECONDS: OnceLock<Option<Regex>> = OnceLock::new();
    SECONDS
        .get_or_init(|| Regex::new(r":\d{2}\.\d{3}").ok())
        .as_ref()
}

/// Render one external query result row as `"<timestamp to the minute> <log>"`.
pub fn external_query_result_to_display_string(fields: &[QueryResultField]) -> String {
    if fields.is_empty() {
        return String::new();
    }
    let by_name: HashMap<&str, &str> = fields
        .iter()
        .map(|f| (f.field.as_str(), f.value.as_str()))
        .collect();

    let raw_timestamp = by_name.get("@timestamp").copied().unwrap_or("");
    let timestamp = match seconds_suffix() {
        Some(re) => re.replace(raw_timestamp, "").into_owned(),
        None => raw_timestamp.to_string(),
    };
    let log = by_name.get("log").copied().unwrap_or("");
    format!("{timestamp} {log}")
}

/// Summarize an artifact path list as `"<segment>"` or `"<segment>,…+N"`.
///
/// The segment is the 4th `/`-separated component of the first path.
pub fn artifact_paths_to_string(paths: Option<&[String]>) -> String {
    let Some((first, rest)) = paths.and_then(<[String]>::split_first) else {
        return String::new();
    };
    let segment = first.split('/').nth(3).unwrap_or("");
    if rest.is_empty() {
        segment.to_string()
    } else {
        format!("{segment},…+{}", rest.len())
    }
}

// ---------------------------------------------------------------------------
// Normalized events
// ---------------------------------------------------------------------------

/// A log line from any source, normalized for merging and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
    /// Log group, stream or job the line came from.
    pub source_id: String,
}

impl LogEvent {
    pub fn from_external(event: &ExternalLogEvent, source_id: impl Into<String>) -> Self {
        Self {
            timestamp: event.timestamp.unwrap_or(0),
            message: event.message.clone().unwrap_or_default(),
            source_id: source_id.into(),
        }
    }

    pub fn from_api_row(row: &ApiLogRow) -> Self {
        Self {
            timestamp: row.timestamp.timestamp_millis(),
            message: row.message.clone(),
            source_id: row.log_source.clone(),
        }
    }

    /// Dedup key: the same line from the same source at the same instant.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.timestamp, self.source_id, self.message)
    }

    /// Display string in `tz`, decoding structured lines like external events.
    pub fn display<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let event = ExternalLogEvent::new(self.timestamp, self.message.clone());
        external_log_event_to_display_string(&event, tz)
    }
}

/// Resume point in a timestamp-ordered log.
///
/// Log stores filter on whole milliseconds, so several lines can share the
/// boundary instant. Reading resumes at that instant (inclusive) and skips
/// the lines from it that were already read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCursor {
    /// Inclusive start, epoch milliseconds.
    pub start_ms: i64,
    /// Lines at `start_ms` already read.
    pub skip: usize,
}

impl LogCursor {
    /// Cursor past the newest of `events` (oldest first), or `None` when empty.
    pub fn resume_after(events: &[LogEvent]) -> Option<Self> {
        let last = events.last()?;
        let skip = events
            .iter()
            .rev()
            .take_while(|event| event.timestamp == last.timestamp)
            .count();
        Some(Self {
            start_ms: last.timestamp,
            skip,
        })
    }

    /// Page size to request so that `page_size` unread lines can come back.
    pub fn request_limit(&self, page_size: usize) -> usize {
        page_size.saturating_add(self.skip)
    }

    /// Drop the leading lines at `start_ms` that were already read.
    pub fn drop_read(&self, page: Vec<LogEvent>) -> Vec<LogEvent> {
        let already_read = page
            .iter()
            .take(self.skip)
            .take_while(|event| event.timestamp == self.start_ms)
            .count();
        page.into_iter().skip(already_read).collect()
    }
}

/// Merge batches into one sequence ordered by timestamp.
///
/// Ties keep batch order, then order within a batch.
pub fn merge_log_events<I>(batches: I) -> Vec<LogEvent>
where
    I: IntoIterator<Item = Vec<LogEvent>>,
{
    let mut merged: Vec<LogEvent> = batches.into_iter().flatten().collect();
    merged.sort_by_key(|event| event.timestamp);
    merged
}
