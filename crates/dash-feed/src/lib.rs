//! dash-feed: list and log controllers over `dash_api::ConsoleApi`.
//!
//! - [`paged::PagedList`]: one page at a time with next/previous turns
//! - [`infinite::InfiniteList`]: a list that grows on each scroll trigger
//! - [`tail::LogTail`]: live log following on a jittered cadence
//! - [`log_format`]: upstream log shapes to display strings

pub mod external_logs;
pub mod infinite;
pub mod log_format;
pub mod notify;
pub mod paged;
pub mod run_logs;
pub mod tail;

pub use infinite::{InfiniteList, LazyQuery, LoadOutcome};
pub use log_format::LogEvent;
pub use notify::{Notification, Notifier};
pub use paged::{PageOutcome, PageState, PagedList};
