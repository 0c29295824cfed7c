//! Wire types for the control-plane list and log endpoints.
//!
//! Every listable entity implements [`Paginated`]: the server orders lists by
//! a per-entity timestamp field plus the entity id, and the cursor for the
//! adjacent page is built from those two values.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which list endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Runs,
    Instances,
    Events,
    Volumes,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Runs => "runs",
            Self::Instances => "instances",
            Self::Events => "events",
            Self::Volumes => "volumes",
        }
    }

    /// Endpoint path for the list call.
    pub fn path(self) -> &'static str {
        match self {
            Self::Runs => "/api/runs/list",
            Self::Instances => "/api/instances/list",
            Self::Events => "/api/events/list",
            Self::Volumes => "/api/volumes/list",
        }
    }

    /// Name of the timestamp field the server orders this list by.
    pub fn timestamp_field(self) -> &'static str {
        match self {
            Self::Runs => "submitted_at",
            Self::Instances => "created",
            Self::Events => "recorded_at",
            Self::Volumes => "created_at",
        }
    }

    /// Whether the project filter is sent as a `project_names` list.
    pub fn takes_project_list(self) -> bool {
        matches!(self, Self::Instances | Self::Events)
    }

    /// Whether the endpoint understands `only_active`.
    pub fn supports_only_active(self) -> bool {
        !matches!(self, Self::Events)
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compound ordering key `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

impl SortKey {
    pub fn new(timestamp: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            timestamp,
            id: id.into(),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// An entity returned by a cursor-paginated list endpoint.
pub trait Paginated {
    const KIND: ListKind;

    fn sort_key(&self) -> SortKey;

    fn item_id(&self) -> &str;

    fn project_name(&self) -> Option<&str> {
        None
    }

    /// Whether the entity counts as active for `only_active` filters.
    fn is_active(&self) -> bool {
        true
    }
}

/// Sort newest first, the display order of every list view.
pub fn sort_descending<T: Paginated>(items: &mut [T]) {
    items.sort_by_key(|item| std::cmp::Reverse(item.sort_key()));
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub project_name: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub run_name: String,
    pub submitted_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Submitted,
    Provisioning,
    Running,
    Terminating,
    Terminated,
    Failed,
    Done,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
            Self::Done => "done",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Terminated | Self::Failed | Self::Done)
    }
}

impl Paginated for Run {
    const KIND: ListKind = ListKind::Runs;

    fn sort_key(&self) -> SortKey {
        SortKey::new(self.submitted_at, self.id.clone())
    }

    fn item_id(&self) -> &str {
        &self.id
    }

    fn project_name(&self) -> Option<&str> {
        Some(&self.project_name)
    }

    fn is_active(&self) -> bool {
        !self.status.is_finished()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub project_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fleet_name: Option<String>,
    pub created: DateTime<Utc>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl Paginated for Instance {
    const KIND: ListKind = ListKind::Instances;

    fn sort_key(&self) -> SortKey {
        SortKey::new(self.created, self.id.clone())
    }

    fn item_id(&self) -> &str {
        &self.id
    }

    fn project_name(&self) -> Option<&str> {
        Some(&self.project_name)
    }

    fn is_active(&self) -> bool {
        !matches!(self.status.as_str(), "terminated" | "terminating")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTarget {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_user: Option<String>,
    #[serde(default)]
    pub targets: Vec<EventTarget>,
}

impl Paginated for Event {
    const KIND: ListKind = ListKind::Events;

    fn sort_key(&self) -> SortKey {
        SortKey::new(self.recorded_at, self.id.clone())
    }

    fn item_id(&self) -> &str {
        &self.id
    }

    fn project_name(&self) -> Option<&str> {
        self.targets
            .iter()
            .find_map(|target| target.project_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub project_name: String,
    pub created_at: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

impl Paginated for Volume {
    const KIND: ListKind = ListKind::Volumes;

    fn sort_key(&self) -> SortKey {
        SortKey::new(self.created_at, self.id.clone())
    }

    fn item_id(&self) -> &str {
        &self.id
    }

    fn project_name(&self) -> Option<&str> {
        Some(&self.project_name)
    }

    fn is_active(&self) -> bool {
        !self.deleted
    }
}

// ---------------------------------------------------------------------------
// Logs and mutations
// ---------------------------------------------------------------------------

/// One log row as returned by the logs poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLogRow {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub log_source: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPollRequest {
    pub run_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_submission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub limit: usize,
    #[serde(default)]
    pub descending: bool,
}

impl LogPollRequest {
    pub fn new(run_name: impl Into<String>, limit: usize) -> Self {
        Self {
            run_name: run_name.into(),
            job_submission_id: None,
            start_time: None,
            limit,
            descending: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPollResponse {
    #[serde(default)]
    pub logs: Vec<ApiLogRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRunsRequest {
    pub runs_names: Vec<String>,
    #[serde(default)]
    pub abort: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteVolumesRequest {
    pub names: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn sort_key_breaks_timestamp_ties_by_id() {
        let a = SortKey::new(ts(10), "a");
        let b = SortKey::new(ts(10), "b");
        let c = SortKey::new(ts(11), "a");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn run_decodes_with_unknown_status() {
        let json = r#"{"id":"r1","project_name":"main","submitted_at":"2024-05-01T10:00:00Z","status":"exotic"}"#;
        let run: Run = serde_json::from_str(json).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert_eq!(run.run_name, "");
        assert!(run.is_active());
    }

    #[test]
    fn event_project_comes_from_first_scoped_target() {
        let event = Event {
            id: "e1".into(),
            message: "created".into(),
            recorded_at: ts(1),
            actor_user: None,
            targets: vec![
                EventTarget {
                    kind: "user".into(),
                    project_name: None,
                    id: "u".into(),
                    name: "admin".into(),
                },
                EventTarget {
                    kind: "run".into(),
                    project_name: Some("main".into()),
                    id: "r".into(),
                    name: "train".into(),
                },
            ],
        };
        assert_eq!(event.project_name(), Some("main"));
    }

    #[test]
    fn kind_field_names_match_endpoints() {
        assert_eq!(ListKind::Runs.timestamp_field(), "submitted_at");
        assert_eq!(ListKind::Instances.path(), "/api/instances/list");
        assert!(ListKind::Events.takes_project_list());
        assert!(!ListKind::Events.supports_only_active());
    }
}
