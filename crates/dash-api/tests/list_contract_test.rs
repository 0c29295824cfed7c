#![allow(clippy::expect_used, clippy::unwrap_used)]

//! List ordering contract as served by the mock console API.

use dash_api::mock::{test_log_row, test_run, test_runs, MockCall, MockConsoleApi};
use dash_api::types::{ListKind, LogPollRequest, Paginated, RunStatus};
use dash_api::{ApiError, ConsoleApi, ListFilter, ListRequest, PaginationCursor};

fn ids<T: Paginated>(items: &[T]) -> Vec<String> {
    items.iter().map(|item| item.item_id().to_string()).collect()
}

// ── Ordering ──

#[tokio::test]
async fn first_page_is_newest_first() {
    let api = MockConsoleApi::new().with_runs(test_runs("main", 5));
    let page = api
        .list_runs(&ListRequest::first(ListFilter::project("main"), 3))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["r004", "r003", "r002"]);
}

#[tokio::test]
async fn descending_cursor_returns_older_items() {
    let runs = test_runs("main", 5);
    let api = MockConsoleApi::new().with_runs(runs.clone());
    let req = ListRequest::first(ListFilter::project("main"), 3)
        .with_cursor(PaginationCursor::after(&runs[2]));
    let page = api.list_runs(&req).await.unwrap();
    assert_eq!(ids(&page), vec!["r001", "r000"]);
}

#[tokio::test]
async fn ascending_cursor_returns_nearest_newer_items_oldest_first() {
    let runs = test_runs("main", 6);
    let api = MockConsoleApi::new().with_runs(runs.clone());
    let req = ListRequest::first(ListFilter::default(), 2)
        .with_cursor(PaginationCursor::before(&runs[1]));
    let page = api.list_runs(&req).await.unwrap();
    assert_eq!(ids(&page), vec!["r002", "r003"]);
}

#[tokio::test]
async fn timestamp_ties_are_ordered_by_id() {
    let api = MockConsoleApi::new().with_runs(vec![
        test_run("b", "main", 10),
        test_run("a", "main", 10),
        test_run("c", "main", 10),
    ]);
    let first = api
        .list_runs(&ListRequest::first(ListFilter::default(), 2))
        .await
        .unwrap();
    assert_eq!(ids(&first), vec!["c", "b"]);

    let req = ListRequest::first(ListFilter::default(), 2)
        .with_cursor(PaginationCursor::after(&first[1]));
    assert_eq!(ids(&api.list_runs(&req).await.unwrap()), vec!["a"]);
}

// ── Filters ──

#[tokio::test]
async fn project_and_only_active_filters_apply() {
    let mut done = test_run("done", "main", 3);
    done.status = RunStatus::Done;
    let api = MockConsoleApi::new().with_runs(vec![
        test_run("keep", "main", 1),
        test_run("other", "research", 2),
        done,
    ]);
    let req = ListRequest::first(ListFilter::project("main").only_active(true), 10);
    assert_eq!(ids(&api.list_runs(&req).await.unwrap()), vec!["keep"]);
}

// ── Logs ──

#[tokio::test]
async fn poll_logs_honours_start_time_and_limit() {
    let api = MockConsoleApi::new().with_logs(
        "train",
        vec![
            test_log_row(3, "c"),
            test_log_row(1, "a"),
            test_log_row(2, "b"),
        ],
    );
    let mut req = LogPollRequest::new("train", 2);
    req.start_time = Some(dash_api::mock::fixture_time(2));
    let resp = api.poll_logs("main", &req).await.unwrap();
    let messages: Vec<&str> = resp.logs.iter().map(|row| row.message.as_str()).collect();
    assert_eq!(messages, vec!["b", "c"]);
}

#[tokio::test]
async fn poll_logs_for_unknown_run_is_not_found() {
    let api = MockConsoleApi::new();
    let err = api
        .poll_logs("main", &LogPollRequest::new("ghost", 10))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status { code: 404, .. }));
}

// ── Recording and failures ──

#[tokio::test]
async fn calls_are_recorded_and_failures_consumed_in_order() {
    let api = MockConsoleApi::new().with_runs(test_runs("main", 1));
    api.fail_next(ApiError::transport("first"));
    let req = ListRequest::first(ListFilter::default(), 1);

    let err = api.list_runs(&req).await.unwrap_err();
    assert_eq!(err, ApiError::transport("first"));
    assert_eq!(api.list_runs(&req).await.unwrap().len(), 1);

    assert_eq!(api.call_count(), 2);
    assert_eq!(api.calls()[0], MockCall::List(ListKind::Runs, req.clone()));
}
