//! dash-core: local client state for the dash console.
//!
//! Configuration loading, the explicit session context, the typed storage
//! bus used to share values between views, and tracing setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod storage_bus;

pub use error::CoreError;
