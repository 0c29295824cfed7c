//! Infinite-scroll aggregator: a list that only grows.
//!
//! Each trigger fetches the page following the last item of everything
//! accumulated so far and appends it. One fetch at a time: triggers that
//! arrive while a fetch is in flight are refused.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, error};

use dash_api::cursor::{ListFilter, ListRequest, PaginationCursor};
use dash_api::{ApiError, ConsoleApi, ListEntity};

use crate::notify::{Notification, Notifier};

/// A query that fetches one page given fixed args and an optional cursor.
#[async_trait]
pub trait LazyQuery: Send + Sync {
    type Args: Clone + Send + Sync;
    type Item: Clone + Send + Sync;
    type Cursor: Clone + Send + Sync;

    /// Label used in logs and notifications.
    fn name(&self) -> &str;

    async fn query(
        &self,
        args: &Self::Args,
        cursor: Option<&Self::Cursor>,
    ) -> Result<Vec<Self::Item>, ApiError>;

    /// Identity used to drop items that were already appended.
    fn item_key(item: &Self::Item) -> String;
}

/// Derives the next cursor from the last accumulated item.
pub type CursorDeriver<Q> =
    Box<dyn Fn(&<Q as LazyQuery>::Item) -> <Q as LazyQuery>::Cursor + Send + Sync>;

/// Derives the next cursor from all accumulated items, oldest appended
/// first. `None` means no cursor (first page).
pub type HistoryCursorDeriver<Q> = Box<
    dyn Fn(&[<Q as LazyQuery>::Item]) -> Option<<Q as LazyQuery>::Cursor> + Send + Sync,
>;

/// What a trigger did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `added` new items were appended; `duplicates` were already present.
    Appended { added: usize, duplicates: usize },
    /// No more data until the args change.
    Exhausted,
    /// A fetch is already in flight.
    InFlight,
    /// Args changed while the fetch was in flight; result discarded.
    Stale,
    /// The fetch failed; the list is unchanged.
    Failed(ApiError),
}

struct Inner<A, T> {
    args: A,
    items: VecDeque<T>,
    seen: HashSet<String>,
    loading: bool,
    exhausted: bool,
    generation: u64,
}

/// Growing list over a [`LazyQuery`].
pub struct InfiniteList<Q: LazyQuery> {
    query: Q,
    derive_cursor: HistoryCursorDeriver<Q>,
    notifier: Arc<dyn Notifier>,
    max_items: Option<usize>,
    inner: Mutex<Inner<Q::Args, Q::Item>>,
}

impl<Q: LazyQuery> InfiniteList<Q> {
    pub fn new(
        query: Q,
        args: Q::Args,
        derive_cursor: CursorDeriver<Q>,
        notifier: Arc<dyn Notifier>,
    ) -> Self
    where
        Q::Item: 'static,
        Q::Cursor: 'static,
    {
        Self::with_history_cursor(
            query,
            args,
            Box::new(move |items: &[Q::Item]| items.last().map(|last| derive_cursor(last))),
            notifier,
        )
    }

    /// Like [`InfiniteList::new`], for cursors that need more than the last
    /// item (for example every line sharing the newest timestamp).
    pub fn with_history_cursor(
        query: Q,
        args: Q::Args,
        derive_cursor: HistoryCursorDeriver<Q>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            query,
            derive_cursor,
            notifier,
            max_items: None,
            inner: Mutex::new(Inner {
                args,
                items: VecDeque::new(),
                seen: HashSet::new(),
                loading: false,
                exhausted: false,
                generation: 0,
            }),
        }
    }

    /// Keep at most `max` items, dropping the earliest appended first.
    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max.max(1));
        self
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn items(&self) -> Vec<Q::Item> {
        self.lock().items.iter().cloned().collect()
    }

    /// The last `n` accumulated items.
    pub fn tail_items(&self, n: usize) -> Vec<Q::Item> {
        let inner = self.lock();
        let skip = inner.items.len().saturating_sub(n);
        inner.items.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading_more(&self) -> bool {
        self.lock().loading
    }

    pub fn is_exhausted(&self) -> bool {
        self.lock().exhausted
    }

    pub fn args(&self) -> Q::Args {
        self.lock().args.clone()
    }

    /// Replace the request args and start over with an empty list.
    pub fn set_args(&self, args: Q::Args) {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.args = args;
        inner.items.clear();
        inner.seen.clear();
        inner.loading = false;
        inner.exhausted = false;
    }

    /// Scroll trigger: fetch and append the next page.
    pub async fn load_more(&self) -> LoadOutcome {
        self.load(false).await.0
    }

    /// Fetch whatever follows the last item even if the list was exhausted.
    ///
    /// Used by followers that poll for newly written data.
    pub async fn poll_new(&self) -> LoadOutcome {
        self.load(true).await.0
    }

    /// [`InfiniteList::poll_new`], also returning every item the poll
    /// appended, including any the item cap already dropped from the list.
    pub async fn poll_appended(&self) -> (LoadOutcome, Vec<Q::Item>) {
        self.load(true).await
    }

    async fn load(&self, ignore_exhausted: bool) -> (LoadOutcome, Vec<Q::Item>) {
        let (args, cursor, generation) = {
            let mut inner = self.lock();
            if inner.loading {
                return (LoadOutcome::InFlight, Vec::new());
            }
            if inner.exhausted && !ignore_exhausted {
                return (LoadOutcome::Exhausted, Vec::new());
            }
            let cursor = (self.derive_cursor)(inner.items.make_contiguous());
            inner.loading = true;
            (inner.args.clone(), cursor, inner.generation)
        };

        let result = self.query.query(&args, cursor.as_ref()).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(query = self.query.name(), "discarding stale page");
            return (LoadOutcome::Stale, Vec::new());
        }
        inner.loading = false;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                drop(inner);
                error!(query = self.query.name(), error = %err, "load more failed");
                self.notifier.notify(Notification::error(
                    self.query.name(),
                    format!("failed to load more {}: {err}", self.query.name()),
                ));
                return (LoadOutcome::Failed(err), Vec::new());
            }
        };

        if page.is_empty() {
            inner.exhausted = true;
            return (LoadOutcome::Exhausted, Vec::new());
        }

        let mut appended = Vec::with_capacity(page.len());
        let mut duplicates = 0;
        for item in page {
            if inner.seen.insert(Q::item_key(&item)) {
                appended.push(item.clone());
                inner.items.push_back(item);
            } else {
                duplicates += 1;
            }
        }

        let added = appended.len();
        if added == 0 {
            // The cursor cannot move, so the next trigger would repeat this page.
            inner.exhausted = true;
            return (LoadOutcome::Exhausted, Vec::new());
        }
        inner.exhausted = false;

        if let Some(max) = self.max_items {
            while inner.items.len() > max {
                if let Some(dropped) = inner.items.pop_front() {
                    let key = Q::item_key(&dropped);
                    inner.seen.remove(&key);
                }
            }
        }

        (LoadOutcome::Appended { added, duplicates }, appended)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<Q::Args, Q::Item>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entity feeds
// ---------------------------------------------------------------------------

/// [`LazyQuery`] over a list endpoint, for feeds such as the event stream.
pub struct EntityFeed<T> {
    api: Arc<dyn ConsoleApi>,
    page_size: usize,
    _entity: std::marker::PhantomData<fn() -> T>,
}

impl<T: ListEntity> EntityFeed<T> {
    pub fn new(api: Arc<dyn ConsoleApi>, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            _entity: std::marker::PhantomData,
        }
    }

    /// An infinite list over this feed, paging towards older items.
    pub fn into_list(self, filter: ListFilter, notifier: Arc<dyn Notifier>) -> InfiniteList<Self> {
        InfiniteList::new(
            self,
            filter,
            Box::new(|last: &T| PaginationCursor::after(last)),
            notifier,
        )
    }
}

#[async_trait]
impl<T: ListEntity> LazyQuery for EntityFeed<T> {
    type Args = ListFilter;
    type Item = T;
    type Cursor = PaginationCursor;

    fn name(&self) -> &str {
        T::KIND.as_str()
    }

    async fn query(
        &self,
        args: &ListFilter,
        cursor: Option<&PaginationCursor>,
    ) -> Result<Vec<T>, ApiError> {
        let mut request = ListRequest::first(args.clone(), self.page_size);
        request.cursor = cursor.cloned();
        T::fetch(self.api.as_ref(), &request).await
    }

    fn item_key(item: &T) -> String {
        item.item_id().to_string()
    }
}
