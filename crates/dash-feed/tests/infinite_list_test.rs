#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Infinite aggregation: loading gate, exhaustion, resets and dedup.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dash_api::mock::{test_event, MockConsoleApi};
use dash_api::types::{Event, ListKind};
use dash_api::{ApiError, ListFilter};
use dash_feed::infinite::EntityFeed;
use dash_feed::notify::{InMemoryNotifier, NullNotifier};
use dash_feed::{InfiniteList, LazyQuery, LoadOutcome};

/// Serves pre-scripted pages and records the cursor of every call.
struct ScriptedQuery {
    pages: Mutex<VecDeque<Result<Vec<u32>, ApiError>>>,
    cursors: Mutex<Vec<Option<u32>>>,
}

impl ScriptedQuery {
    fn new(pages: Vec<Result<Vec<u32>, ApiError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            cursors: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LazyQuery for ScriptedQuery {
    type Args = String;
    type Item = u32;
    type Cursor = u32;

    fn name(&self) -> &str {
        "numbers"
    }

    async fn query(&self, _args: &String, cursor: Option<&u32>) -> Result<Vec<u32>, ApiError> {
        self.cursors.lock().unwrap().push(cursor.copied());
        self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }

    fn item_key(item: &u32) -> String {
        item.to_string()
    }
}

fn scripted(pages: Vec<Result<Vec<u32>, ApiError>>) -> InfiniteList<ScriptedQuery> {
    InfiniteList::new(
        ScriptedQuery::new(pages),
        "all".to_string(),
        Box::new(|last: &u32| *last),
        Arc::new(NullNotifier),
    )
}

fn event_ids(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.id.clone()).collect()
}

#[tokio::test]
async fn duplicates_are_dropped_and_cursor_uses_last_item() {
    let list = scripted(vec![Ok(vec![1, 2, 3]), Ok(vec![3, 4])]);

    list.load_more().await;
    assert_eq!(
        list.load_more().await,
        LoadOutcome::Appended {
            added: 1,
            duplicates: 1
        }
    );
    assert_eq!(list.items(), vec![1, 2, 3, 4]);
    assert_eq!(
        *list.query().cursors.lock().unwrap(),
        vec![None, Some(3)]
    );
}

#[tokio::test]
async fn empty_page_exhausts_until_args_change() {
    let list = scripted(vec![Ok(vec![1]), Ok(Vec::new()), Ok(vec![9])]);
    list.load_more().await;
    assert_eq!(list.load_more().await, LoadOutcome::Exhausted);
    assert!(list.is_exhausted());

    // no fetch while exhausted
    assert_eq!(list.load_more().await, LoadOutcome::Exhausted);
    assert_eq!(list.query().cursors.lock().unwrap().len(), 2);

    list.set_args("other".to_string());
    assert!(!list.is_exhausted());
    assert!(list.is_empty());
    list.load_more().await;
    assert_eq!(list.items(), vec![9]);
}

#[tokio::test]
async fn all_duplicate_page_counts_as_exhausted() {
    let list = scripted(vec![Ok(vec![1, 2]), Ok(vec![2])]);
    list.load_more().await;
    assert_eq!(list.load_more().await, LoadOutcome::Exhausted);
    assert_eq!(list.items(), vec![1, 2]);
}

#[tokio::test]
async fn failure_keeps_items_and_reopens_gate() {
    let notifier = Arc::new(InMemoryNotifier::new());
    let list = InfiniteList::new(
        ScriptedQuery::new(vec![
            Ok(vec![1]),
            Err(ApiError::transport("timeout")),
            Ok(vec![2]),
        ]),
        "all".to_string(),
        Box::new(|last: &u32| *last),
        notifier.clone(),
    );
    list.load_more().await;
    assert!(matches!(list.load_more().await, LoadOutcome::Failed(_)));
    assert_eq!(list.items(), vec![1]);
    assert!(!list.is_loading_more());
    assert_eq!(notifier.count(), 1);

    list.load_more().await;
    assert_eq!(list.items(), vec![1, 2]);
}

#[tokio::test]
async fn trigger_while_loading_does_not_fetch() {
    let events: Vec<Event> = (0..4)
        .map(|i| test_event(&format!("e{i}"), i, "tick"))
        .collect();
    let api = Arc::new(MockConsoleApi::new().with_events(events));
    let feed = EntityFeed::<Event>::new(api.clone(), 2)
        .into_list(ListFilter::default(), Arc::new(NullNotifier));
    api.hold_calls();

    let (first, second, ()) = tokio::join!(feed.load_more(), feed.load_more(), async {
        while api.call_count() < 1 {
            tokio::task::yield_now().await;
        }
        api.release(1);
    });

    assert_eq!(
        first,
        LoadOutcome::Appended {
            added: 2,
            duplicates: 0
        }
    );
    assert_eq!(second, LoadOutcome::InFlight);
    assert_eq!(api.list_requests(ListKind::Events).len(), 1);
}

#[tokio::test]
async fn reset_discards_result_of_in_flight_fetch() {
    let events: Vec<Event> = (0..3)
        .map(|i| test_event(&format!("e{i}"), i, "tick"))
        .collect();
    let api = Arc::new(MockConsoleApi::new().with_events(events));
    let feed = EntityFeed::<Event>::new(api.clone(), 10)
        .into_list(ListFilter::default(), Arc::new(NullNotifier));
    api.hold_calls();

    let (outcome, ()) = tokio::join!(feed.load_more(), async {
        while api.call_count() < 1 {
            tokio::task::yield_now().await;
        }
        feed.set_args(ListFilter::default());
        api.release(1);
    });

    assert_eq!(outcome, LoadOutcome::Stale);
    assert!(feed.is_empty());
    assert!(!feed.is_loading_more());

    api.open_gate();
    feed.load_more().await;
    assert_eq!(event_ids(&feed.items()), vec!["e2", "e1", "e0"]);
}
