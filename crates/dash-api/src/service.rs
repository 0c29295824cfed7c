//! Console API trait, the seam between list controllers and the server.
//!
//! Implementations can talk to a live control-plane server over HTTP or be
//! mocked for testing.

use async_trait::async_trait;

use crate::cursor::ListRequest;
use crate::error::ApiError;
use crate::types::{
    DeleteVolumesRequest, Event, Instance, LogPollRequest, LogPollResponse, Paginated, Run,
    StopRunsRequest, Volume,
};

/// The control-plane endpoints consumed by the console.
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn list_runs(&self, req: &ListRequest) -> Result<Vec<Run>, ApiError>;

    async fn list_instances(&self, req: &ListRequest) -> Result<Vec<Instance>, ApiError>;

    async fn list_events(&self, req: &ListRequest) -> Result<Vec<Event>, ApiError>;

    async fn list_volumes(&self, req: &ListRequest) -> Result<Vec<Volume>, ApiError>;

    /// Fetch log rows of one run, oldest first unless `descending` is set.
    async fn poll_logs(
        &self,
        project: &str,
        req: &LogPollRequest,
    ) -> Result<LogPollResponse, ApiError>;

    async fn stop_runs(&self, project: &str, req: &StopRunsRequest) -> Result<(), ApiError>;

    async fn delete_volumes(
        &self,
        project: &str,
        req: &DeleteVolumesRequest,
    ) -> Result<(), ApiError>;
}

/// A [`Paginated`] entity that knows which [`ConsoleApi`] call lists it.
///
/// Lets list controllers stay generic over the entity while holding a
/// `dyn ConsoleApi`.
#[async_trait]
pub trait ListEntity: Paginated + Clone + Send + Sync + Sized + 'static {
    async fn fetch(api: &dyn ConsoleApi, req: &ListRequest) -> Result<Vec<Self>, ApiError>;
}

#[async_trait]
impl ListEntity for Run {
    async fn fetch(api: &dyn ConsoleApi, req: &ListRequest) -> Result<Vec<Self>, ApiError> {
        api.list_runs(req).await
    }
}

#[async_trait]
impl ListEntity for Instance {
    async fn fetch(api: &dyn ConsoleApi, req: &ListRequest) -> Result<Vec<Self>, ApiError> {
        api.list_instances(req).await
    }
}

#[async_trait]
impl ListEntity for Event {
    async fn fetch(api: &dyn ConsoleApi, req: &ListRequest) -> Result<Vec<Self>, ApiError> {
        api.list_events(req).await
    }
}

#[async_trait]
impl ListEntity for Volume {
    async fn fetch(api: &dyn ConsoleApi, req: &ListRequest) -> Result<Vec<Self>, ApiError> {
        api.list_volumes(req).await
    }
}
