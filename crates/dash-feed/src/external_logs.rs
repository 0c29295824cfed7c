//! External log store access: filtered event reads and insights queries.
//!
//! The provider trait mirrors the store's native calls. [`ExternalLogQuery`]
//! adapts it to [`LazyQuery`] so a log group can be read page by page and
//! tailed through an [`InfiniteList`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use dash_api::ApiError;

use crate::infinite::{InfiniteList, LazyQuery};
use crate::log_format::{
    external_query_result_to_display_string, ExternalLogEvent, LogCursor, LogEvent,
    QueryResultField,
};
use crate::notify::Notifier;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterLogEventsParams {
    pub log_group_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_stream_names: Vec<String>,
    /// Inclusive lower bound, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Exclusive upper bound, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterLogEventsOutput {
    #[serde(default)]
    pub events: Vec<ExternalLogEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartQueryParams {
    pub log_group_name: String,
    pub query_string: String,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
    #[serde(other)]
    Unknown,
}

impl QueryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

/// One result row: the provider's list of `{field, value}` cells.
pub type QueryResultRow = Vec<QueryResultField>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub status: QueryStatus,
    #[serde(default)]
    pub results: Vec<QueryResultRow>,
}

/// Native calls of an external log store.
#[async_trait]
pub trait ExternalLogProvider: Send + Sync {
    async fn filter_log_events(
        &self,
        params: &FilterLogEventsParams,
    ) -> Result<FilterLogEventsOutput, ApiError>;

    /// Start an insights query and return its id.
    async fn start_query(&self, params: &StartQueryParams) -> Result<String, ApiError>;

    /// Current status and results of a started query.
    async fn query(&self, query_id: &str) -> Result<QueryOutput, ApiError>;
}

// ---------------------------------------------------------------------------
// LazyQuery adapter
// ---------------------------------------------------------------------------

/// Which log group (and optionally streams) to read, from when.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalLogArgs {
    pub log_group_name: String,
    pub log_stream_names: Vec<String>,
    pub start_time: Option<i64>,
}

impl ExternalLogArgs {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            log_group_name: name.into(),
            ..Self::default()
        }
    }
}

/// Pages through a log group oldest first, resuming at the newest line read.
pub struct ExternalLogQuery {
    provider: Arc<dyn ExternalLogProvider>,
    page_size: usize,
}

impl ExternalLogQuery {
    pub fn new(provider: Arc<dyn ExternalLogProvider>, page_size: usize) -> Self {
        Self {
            provider,
            page_size: page_size.max(1),
        }
    }

    pub fn into_list(self, args: ExternalLogArgs, notifier: Arc<dyn Notifier>) -> InfiniteList<Self> {
        InfiniteList::with_history_cursor(
            self,
            args,
            Box::new(|read: &[LogEvent]| LogCursor::resume_after(read)),
            notifier,
        )
    }
}

#[async_trait]
impl LazyQuery for ExternalLogQuery {
    type Args = ExternalLogArgs;
    type Item = LogEvent;
    type Cursor = LogCursor;

    fn name(&self) -> &str {
        "external logs"
    }

    async fn query(
        &self,
        args: &ExternalLogArgs,
        cursor: Option<&LogCursor>,
    ) -> Result<Vec<LogEvent>, ApiError> {
        let params = FilterLogEventsParams {
            log_group_name: args.log_group_name.clone(),
            log_stream_names: args.log_stream_names.clone(),
            start_time: cursor.map(|c| c.start_ms).or(args.start_time),
            end_time: None,
            limit: Some(cursor.map_or(self.page_size, |c| c.request_limit(self.page_size))),
        };
        let output = self.provider.filter_log_events(&params).await?;
        let page: Vec<LogEvent> = output
            .events
            .iter()
            .map(|event| {
                let source = event
                    .log_stream_name
                    .as_deref()
                    .unwrap_or(args.log_group_name.as_str());
                LogEvent::from_external(event, source)
            })
            .collect();
        Ok(match cursor {
            Some(cursor) => cursor.drop_read(page),
            None => page,
        })
    }

    fn item_key(item: &LogEvent) -> String {
        item.key()
    }
}

// ---------------------------------------------------------------------------
// Insights queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsResult {
    pub query_id: String,
    pub status: QueryStatus,
    /// One display string per result row.
    pub lines: Vec<String>,
}

/// Start a query and poll it every `poll_interval` until it reaches a
/// terminal status, giving up after `max_polls` non-terminal answers.
#[instrument(skip(provider, params), fields(group = %params.log_group_name), err)]
pub async fn run_insights_query(
    provider: &dyn ExternalLogProvider,
    params: &StartQueryParams,
    poll_interval: Duration,
    max_polls: usize,
) -> Result<InsightsResult, ApiError> {
    let query_id = provider.start_query(params).await?;
    for attempt in 0..max_polls.max(1) {
        let output = provider.query(&query_id).await?;
        if output.status.is_terminal() {
            let lines = output
                .results
                .iter()
                .map(|row| external_query_result_to_display_string(row))
                .collect();
            return Ok(InsightsResult {
                query_id,
                status: output.status,
                lines,
            });
        }
        debug!(query_id = %query_id, attempt, status = ?output.status, "query still running");
        tokio::time::sleep(poll_interval).await;
    }
    Err(ApiError::transport(format!(
        "query {query_id} did not finish after {} polls",
        max_polls.max(1)
    )))
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ProviderData {
    groups: HashMap<String, Vec<ExternalLogEvent>>,
    scripted: VecDeque<(usize, Vec<QueryResultRow>)>,
    queries: HashMap<String, (usize, Vec<QueryResultRow>)>,
    filter_calls: Vec<FilterLogEventsParams>,
    next_query: u64,
}

/// In-memory log store for testing.
#[derive(Default)]
pub struct InMemoryLogProvider {
    data: Mutex<ProviderData>,
}

impl InMemoryLogProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, name: &str, events: Vec<ExternalLogEvent>) -> Self {
        self.lock().groups.insert(name.to_string(), events);
        self
    }

    pub fn push_events(&self, group: &str, events: impl IntoIterator<Item = ExternalLogEvent>) {
        self.lock()
            .groups
            .entry(group.to_string())
            .or_default()
            .extend(events);
    }

    /// The next started query reports `Running` for `pending_polls` polls,
    /// then `Complete` with `rows`.
    pub fn script_query(&self, pending_polls: usize, rows: Vec<QueryResultRow>) {
        self.lock().scripted.push_back((pending_polls, rows));
    }

    pub fn filter_calls(&self) -> Vec<FilterLogEventsParams> {
        self.lock().filter_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ProviderData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ExternalLogProvider for InMemoryLogProvider {
    async fn filter_log_events(
        &self,
        params: &FilterLogEventsParams,
    ) -> Result<FilterLogEventsOutput, ApiError> {
        let mut data = self.lock();
        data.filter_calls.push(params.clone());
        let Some(events) = data.groups.get(&params.log_group_name) else {
            return Err(ApiError::Status {
                code: 404,
                body: format!("log group {} not found", params.log_group_name),
            });
        };
        let mut selected: Vec<ExternalLogEvent> = events
            .iter()
            .filter(|event| {
                let ts = event.timestamp.unwrap_or(0);
                params.start_time.map_or(true, |start| ts >= start)
                    && params.end_time.map_or(true, |end| ts < end)
                    && (params.log_stream_names.is_empty()
                        || event
                            .log_stream_name
                            .as_ref()
                            .is_some_and(|s| params.log_stream_names.contains(s)))
            })
            .cloned()
            .collect();
        selected.sort_by_key(|event| event.timestamp.unwrap_or(0));
        if let Some(limit) = params.limit {
            selected.truncate(limit);
        }
        Ok(FilterLogEventsOutput {
            events: selected,
            next_token: None,
        })
    }

    async fn start_query(&self, params: &StartQueryParams) -> Result<String, ApiError> {
        if params.query_string.trim().is_empty() {
            return Err(ApiError::invalid("query string must not be empty"));
        }
        let mut data = self.lock();
        data.next_query += 1;
        let id = format!("q-{}", data.next_query);
        let script = data.scripted.pop_front().unwrap_or_default();
        data.queries.insert(id.clone(), script);
        Ok(id)
    }

    async fn query(&self, query_id: &str) -> Result<QueryOutput, ApiError> {
        let mut data = self.lock();
        let Some((pending, rows)) = data.queries.get_mut(query_id) else {
            return Err(ApiError::Status {
                code: 404,
                body: format!("query {query_id} not found"),
            });
        };
        if *pending > 0 {
            *pending -= 1;
            return Ok(QueryOutput {
                status: QueryStatus::Running,
                results: Vec::new(),
            });
        }
        Ok(QueryOutput {
            status: QueryStatus::Complete,
            results: rows.clone(),
        })
    }
}
