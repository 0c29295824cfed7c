//! Run logs read through the console's log poll endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dash_api::types::LogPollRequest;
use dash_api::{ApiError, ConsoleApi};

use crate::infinite::{InfiniteList, LazyQuery};
use crate::log_format::{LogCursor, LogEvent};
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLogArgs {
    pub project: String,
    pub run_name: String,
    pub job_submission_id: Option<String>,
}

impl RunLogArgs {
    pub fn new(project: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            run_name: run_name.into(),
            job_submission_id: None,
        }
    }
}

/// Pages through a run's log oldest first, resuming at the newest line read.
pub struct RunLogQuery {
    api: Arc<dyn ConsoleApi>,
    page_size: usize,
}

impl RunLogQuery {
    pub fn new(api: Arc<dyn ConsoleApi>, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
        }
    }

    pub fn into_list(self, args: RunLogArgs, notifier: Arc<dyn Notifier>) -> InfiniteList<Self> {
        InfiniteList::with_history_cursor(
            self,
            args,
            Box::new(|read: &[LogEvent]| LogCursor::resume_after(read)),
            notifier,
        )
    }
}

// Lines carry whole milliseconds, so start at the floor of the newest one;
// the poll endpoint's start_time is inclusive.
fn start_time(cursor: &LogCursor) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(cursor.start_ms).unwrap_or_default()
}

#[async_trait]
impl LazyQuery for RunLogQuery {
    type Args = RunLogArgs;
    type Item = LogEvent;
    type Cursor = LogCursor;

    fn name(&self) -> &str {
        "logs"
    }

    async fn query(
        &self,
        args: &RunLogArgs,
        cursor: Option<&LogCursor>,
    ) -> Result<Vec<LogEvent>, ApiError> {
        let request = LogPollRequest {
            run_name: args.run_name.clone(),
            job_submission_id: args.job_submission_id.clone(),
            start_time: cursor.map(start_time),
            limit: cursor.map_or(self.page_size, |c| c.request_limit(self.page_size)),
            descending: false,
        };
        let response = self.api.poll_logs(&args.project, &request).await?;
        let page: Vec<LogEvent> = response.logs.iter().map(LogEvent::from_api_row).collect();
        Ok(match cursor {
            Some(cursor) => cursor.drop_read(page),
            None => page,
        })
    }

    fn item_key(item: &LogEvent) -> String {
        item.key()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration;
    use dash_api::mock::{fixture_time, test_log_row, MockCall, MockConsoleApi};
    use dash_api::types::ApiLogRow;

    use super::*;
    use crate::notify::NullNotifier;

    #[tokio::test]
    async fn cursor_resumes_at_last_line_and_skips_it() {
        let api = Arc::new(MockConsoleApi::new().with_logs(
            "train",
            vec![test_log_row(1, "a"), test_log_row(2, "b"), test_log_row(3, "c")],
        ));
        let logs = RunLogQuery::new(api.clone(), 2)
            .into_list(RunLogArgs::new("main", "train"), Arc::new(NullNotifier));

        logs.load_more().await;
        logs.load_more().await;
        let messages: Vec<String> = logs.items().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);

        let calls = api.calls();
        let MockCall::PollLogs(project, second) = &calls[1] else {
            panic!("expected a log poll, got {:?}", calls[1]);
        };
        assert_eq!(project, "main");
        assert_eq!(second.start_time, Some(fixture_time(2)));
        assert_eq!(second.limit, 3);
    }

    #[tokio::test]
    async fn rows_sharing_a_timestamp_are_all_read() {
        let api = Arc::new(MockConsoleApi::new().with_logs(
            "train",
            vec![
                test_log_row(1, "a"),
                test_log_row(1, "b"),
                test_log_row(1, "c"),
                test_log_row(2, "d"),
            ],
        ));
        let logs = RunLogQuery::new(api, 2)
            .into_list(RunLogArgs::new("main", "train"), Arc::new(NullNotifier));

        for _ in 0..4 {
            logs.load_more().await;
        }
        let messages: Vec<String> = logs.items().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["a", "b", "c", "d"]);
        assert!(logs.is_exhausted());
    }

    #[tokio::test]
    async fn sub_millisecond_rows_are_not_skipped() {
        let at = fixture_time(1);
        let row = |micros: i64, message: &str| ApiLogRow {
            timestamp: at + Duration::microseconds(micros),
            log_source: "stdout".into(),
            message: message.into(),
        };
        let api = Arc::new(MockConsoleApi::new().with_logs(
            "train",
            vec![row(100, "a"), row(200, "b"), row(300, "c")],
        ));
        let logs = RunLogQuery::new(api, 2)
            .into_list(RunLogArgs::new("main", "train"), Arc::new(NullNotifier));

        logs.load_more().await;
        logs.load_more().await;
        let messages: Vec<String> = logs.items().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }
}
