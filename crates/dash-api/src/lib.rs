//! dash-api: client for the control-plane list, log and mutation endpoints.
//!
//! Provides the transport-agnostic `ConsoleApi` trait with implementations for:
//! - `HttpConsoleApi`: JSON over HTTP against a live server
//! - `MockConsoleApi`: in-memory datasets for unit testing
//! - `CachedConsoleApi`: tag-invalidated response cache over either
//!
//! List requests are cursor-based: see [`cursor::PaginationCursor`].

pub mod cache;
pub mod cursor;
pub mod error;
pub mod http;
pub mod mock;
pub mod service;
pub mod types;

pub use cursor::{ListFilter, ListRequest, PaginationCursor};
pub use error::ApiError;
pub use service::{ConsoleApi, ListEntity};
