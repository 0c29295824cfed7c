#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Log tail following under paused time.

use std::sync::Arc;
use std::time::Duration;

use dash_api::mock::{test_log_row, MockConsoleApi};
use dash_api::ApiError;
use dash_core::config::TailConfig;
use dash_feed::notify::NullNotifier;
use dash_feed::run_logs::{RunLogArgs, RunLogQuery};
use dash_feed::tail::LogTail;
use tokio_util::sync::CancellationToken;

fn tail_config(max_buffered_events: usize) -> TailConfig {
    TailConfig {
        base_interval: Duration::from_secs(1),
        max_jitter: Duration::ZERO,
        max_buffered_events,
    }
}

fn tail_for(api: &Arc<MockConsoleApi>, max_buffered: usize) -> LogTail<RunLogQuery> {
    let list = RunLogQuery::new(api.clone(), 50)
        .into_list(RunLogArgs::new("main", "train"), Arc::new(NullNotifier));
    LogTail::from_config(list, &tail_config(max_buffered), "train")
}

#[tokio::test(start_paused = true)]
async fn follow_delivers_new_lines_and_caps_buffer() {
    let api = Arc::new(MockConsoleApi::new().with_logs("train", vec![test_log_row(1, "a")]));
    let mut tail = tail_for(&api, 3);
    let cancel = CancellationToken::new();
    let mut seen: Vec<String> = Vec::new();

    let driver = async {
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        api.push_logs(
            "train",
            [test_log_row(2, "b"), test_log_row(3, "c"), test_log_row(4, "d")],
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    };
    tokio::join!(
        tail.follow(cancel.clone(), |batch| {
            seen.extend(batch.iter().map(|event| event.message.clone()))
        }),
        driver
    );

    assert_eq!(seen, vec!["a", "b", "c", "d"]);
    let buffered: Vec<String> = tail.events().into_iter().map(|e| e.message).collect();
    assert_eq!(buffered, vec!["b", "c", "d"]);
}

#[tokio::test]
async fn poll_once_counts_consecutive_failures() {
    let api = Arc::new(MockConsoleApi::new().with_logs("train", vec![test_log_row(1, "a")]));
    let mut tail = tail_for(&api, 10);

    api.fail_next(ApiError::transport("down"));
    api.fail_next(ApiError::transport("down"));
    assert!(tail.poll_once().await.failed);
    assert!(tail.poll_once().await.failed);
    assert_eq!(tail.consecutive_failures(), 2);

    let tick = tail.poll_once().await;
    assert!(!tick.failed);
    assert_eq!(tick.new_events.len(), 1);
    assert_eq!(tail.consecutive_failures(), 0);

    // nothing new: the tail keeps polling without error
    let idle = tail.poll_once().await;
    assert!(idle.new_events.is_empty());
    assert!(!idle.failed);
}

#[tokio::test]
async fn poll_larger_than_buffer_still_reports_every_line() {
    let rows = (1..=5).map(|secs| test_log_row(secs, &format!("l{secs}"))).collect();
    let api = Arc::new(MockConsoleApi::new().with_logs("train", rows));
    let mut tail = tail_for(&api, 2);

    let tick = tail.poll_once().await;
    let reported: Vec<String> = tick.new_events.into_iter().map(|e| e.message).collect();
    assert_eq!(reported, vec!["l1", "l2", "l3", "l4", "l5"]);

    let buffered: Vec<String> = tail.events().into_iter().map(|e| e.message).collect();
    assert_eq!(buffered, vec!["l4", "l5"]);
}
