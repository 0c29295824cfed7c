//! Paginated list controller: one page at a time with next/previous turns.
//!
//! The controller owns the page state of one list view. Page turns build a
//! cursor from the boundary item of the current page, fetch through
//! [`ConsoleApi`], and replace the page when the fetch completes. Failed
//! fetches leave the state untouched.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};

use dash_api::cursor::{ListFilter, ListRequest, PaginationCursor};
use dash_api::types::sort_descending;
use dash_api::{ApiError, ConsoleApi, ListEntity};

use crate::notify::{Notification, Notifier};

/// Observable state of one paginated list.
#[derive(Debug, Clone, PartialEq)]
pub struct PageState<T> {
    /// Current page, newest first.
    pub items: Vec<T>,
    /// 1-based position of the current page.
    pub page_count: usize,
    /// Set once a next-page fetch came back empty.
    pub disabled_next: bool,
    pub is_loading: bool,
}

impl<T> Default for PageState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page_count: 1,
            disabled_next: false,
            is_loading: false,
        }
    }
}

/// What a controller operation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was replaced with `count` items.
    Replaced { count: usize },
    /// The next page was empty; `disabled_next` is now set.
    Exhausted,
    /// The previous page was empty; the controller is back on page 1.
    ReturnedToFirst,
    /// Nothing to do (first page on prev, no boundary item, next disabled).
    NoOp,
    /// Another fetch of the same list is still in flight.
    Busy,
    /// The filter changed while the fetch was in flight; result discarded.
    Stale,
    /// The fetch failed; state is unchanged.
    Failed(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    First,
    Next,
    Prev,
    Refresh,
}

impl Turn {
    fn label(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::Refresh => "refresh",
        }
    }
}

struct Inner<T> {
    state: PageState<T>,
    filter: ListFilter,
    last_request: Option<ListRequest>,
    generation: u64,
}

/// Controller for one cursor-paginated list view.
pub struct PagedList<T: ListEntity> {
    api: Arc<dyn ConsoleApi>,
    notifier: Arc<dyn Notifier>,
    page_size: usize,
    inner: Mutex<Inner<T>>,
}

impl<T: ListEntity> PagedList<T> {
    pub fn new(
        api: Arc<dyn ConsoleApi>,
        notifier: Arc<dyn Notifier>,
        filter: ListFilter,
        page_size: usize,
    ) -> Self {
        Self {
            api,
            notifier,
            page_size: page_size.max(1),
            inner: Mutex::new(Inner {
                state: PageState::default(),
                filter,
                last_request: None,
                generation: 0,
            }),
        }
    }

    /// Snapshot of the whole page state.
    pub fn state(&self) -> PageState<T> {
        self.lock().state.clone()
    }

    /// Items of the current page, newest first.
    pub fn items(&self) -> Vec<T> {
        self.lock().state.items.clone()
    }

    /// 1-based position of the current page.
    pub fn page_count(&self) -> usize {
        self.lock().state.page_count
    }

    /// Whether the last next-page fetch came back empty.
    pub fn disabled_next(&self) -> bool {
        self.lock().state.disabled_next
    }

    /// Whether a fetch is in flight.
    pub fn is_loading(&self) -> bool {
        self.lock().state.is_loading
    }

    /// Filter the current page was requested with.
    pub fn filter(&self) -> ListFilter {
        self.lock().filter.clone()
    }

    /// Items requested per page, at least 1.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch the first page under the current filter.
    pub async fn load(&self) -> PageOutcome {
        let filter = self.filter();
        self.set_filter(filter).await
    }

    /// Switch to `filter` and fetch its first page.
    ///
    /// Page position resets to 1 and the current items are cleared. A fetch
    /// still in flight for the previous filter completes as `Stale`.
    pub async fn set_filter(&self, filter: ListFilter) -> PageOutcome {
        let (request, generation) = {
            let mut inner = self.lock();
            inner.generation = inner.generation.wrapping_add(1);
            inner.filter = filter.clone();
            inner.state = PageState {
                is_loading: true,
                ..PageState::default()
            };
            (ListRequest::first(filter, self.page_size), inner.generation)
        };
        self.fetch_and_apply(Turn::First, request, generation).await
    }

    /// Advance to the page after the last item of the current page.
    pub async fn next_page(&self) -> PageOutcome {
        let (request, generation) = {
            let mut inner = self.lock();
            if inner.state.is_loading {
                return PageOutcome::Busy;
            }
            if inner.state.disabled_next {
                return PageOutcome::NoOp;
            }
            let Some(last) = inner.state.items.last() else {
                return PageOutcome::NoOp;
            };
            let request = ListRequest::first(inner.filter.clone(), self.page_size)
                .with_cursor(PaginationCursor::after(last));
            inner.state.is_loading = true;
            (request, inner.generation)
        };
        self.fetch_and_apply(Turn::Next, request, generation).await
    }

    /// Go back to the page before the first item of the current page.
    pub async fn prev_page(&self) -> PageOutcome {
        let (request, generation) = {
            let mut inner = self.lock();
            if inner.state.page_count <= 1 {
                return PageOutcome::NoOp;
            }
            if inner.state.is_loading {
                return PageOutcome::Busy;
            }
            let Some(first) = inner.state.items.first() else {
                return PageOutcome::NoOp;
            };
            let request = ListRequest::first(inner.filter.clone(), self.page_size)
                .with_cursor(PaginationCursor::before(first));
            inner.state.is_loading = true;
            (request, inner.generation)
        };
        self.fetch_and_apply(Turn::Prev, request, generation).await
    }

    /// Re-issue the last request verbatim and replace the page with its result.
    ///
    /// The request is marked [`ListRequest::refetched`], so it reaches the
    /// server past any response cache.
    pub async fn refresh_list(&self) -> PageOutcome {
        let (request, generation) = {
            let mut inner = self.lock();
            if inner.state.is_loading {
                return PageOutcome::Busy;
            }
            let request = inner
                .last_request
                .as_ref()
                .map(ListRequest::refetched)
                .unwrap_or_else(|| {
                    ListRequest::first(inner.filter.clone(), self.page_size).refetched()
                });
            inner.state.is_loading = true;
            (request, inner.generation)
        };
        self.fetch_and_apply(Turn::Refresh, request, generation).await
    }

    async fn fetch_and_apply(
        &self,
        turn: Turn,
        request: ListRequest,
        generation: u64,
    ) -> PageOutcome {
        let result = T::fetch(self.api.as_ref(), &request).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(kind = %T::KIND, turn = turn.label(), "discarding stale page");
            return PageOutcome::Stale;
        }
        inner.state.is_loading = false;

        let mut items = match result {
            Ok(items) => items,
            Err(err) => {
                drop(inner);
                error!(kind = %T::KIND, turn = turn.label(), error = %err, "page fetch failed");
                self.notifier.notify(Notification::error(
                    T::KIND.as_str(),
                    format!("failed to load {}: {err}", T::KIND),
                ));
                return PageOutcome::Failed(err);
            }
        };
        if request.is_ascending() {
            sort_descending(&mut items);
        }

        match turn {
            Turn::Next if items.is_empty() => {
                inner.state.disabled_next = true;
                PageOutcome::Exhausted
            }
            Turn::Prev if items.is_empty() => {
                inner.state.page_count = 1;
                inner.state.disabled_next = false;
                PageOutcome::ReturnedToFirst
            }
            _ => {
                let count = items.len();
                match turn {
                    Turn::First => inner.state.page_count = 1,
                    Turn::Next => inner.state.page_count += 1,
                    Turn::Prev => {
                        inner.state.page_count = inner.state.page_count.saturating_sub(1).max(1)
                    }
                    Turn::Refresh => {}
                }
                if turn != Turn::Next {
                    inner.state.disabled_next = false;
                }
                inner.state.items = items;
                inner.last_request = Some(request);
                PageOutcome::Replaced { count }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
