//! Mock console API for unit testing.
//!
//! Serves in-memory datasets with the same ordering contract as the server,
//! records every call, and can fail or hold individual calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

use crate::cursor::{apply_list_request, ListRequest};
use crate::error::ApiError;
use crate::service::ConsoleApi;
use crate::types::{
    ApiLogRow, DeleteVolumesRequest, Event, Instance, ListKind, LogPollRequest, LogPollResponse,
    Run, RunStatus, StopRunsRequest, Volume,
};

/// A recorded call to the mock service.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    List(ListKind, ListRequest),
    PollLogs(String, LogPollRequest),
    StopRuns(String, StopRunsRequest),
    DeleteVolumes(String, DeleteVolumesRequest),
}

#[derive(Default)]
struct MockData {
    runs: Vec<Run>,
    instances: Vec<Instance>,
    events: Vec<Event>,
    volumes: Vec<Volume>,
    /// Log rows keyed by run name.
    logs: HashMap<String, Vec<ApiLogRow>>,
}

/// Mock implementation of `ConsoleApi` for testing.
#[derive(Default)]
pub struct MockConsoleApi {
    data: Mutex<MockData>,
    calls: Mutex<Vec<MockCall>>,
    failures: Mutex<VecDeque<ApiError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockConsoleApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runs(self, runs: Vec<Run>) -> Self {
        lock(&self.data).runs = runs;
        self
    }

    pub fn with_instances(self, instances: Vec<Instance>) -> Self {
        lock(&self.data).instances = instances;
        self
    }

    pub fn with_events(self, events: Vec<Event>) -> Self {
        lock(&self.data).events = events;
        self
    }

    pub fn with_volumes(self, volumes: Vec<Volume>) -> Self {
        lock(&self.data).volumes = volumes;
        self
    }

    pub fn with_logs(self, run_name: &str, rows: Vec<ApiLogRow>) -> Self {
        lock(&self.data).logs.insert(run_name.to_string(), rows);
        self
    }

    /// Append runs to the backing dataset after construction.
    pub fn push_runs(&self, runs: impl IntoIterator<Item = Run>) {
        lock(&self.data).runs.extend(runs);
    }

    /// Append log rows for a run after construction.
    pub fn push_logs(&self, run_name: &str, rows: impl IntoIterator<Item = ApiLogRow>) {
        lock(&self.data)
            .logs
            .entry(run_name.to_string())
            .or_default()
            .extend(rows);
    }

    /// Make the next call fail with `err`. Queued failures are used in order.
    pub fn fail_next(&self, err: ApiError) {
        lock(&self.failures).push_back(err);
    }

    /// Hold every later call until [`release`](Self::release) grants it.
    pub fn hold_calls(&self) {
        *lock(&self.gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` held calls proceed, in the order they arrived.
    pub fn release(&self, count: usize) {
        if let Some(gate) = lock(&self.gate).as_ref() {
            gate.add_permits(count);
        }
    }

    /// Stop holding calls; calls already waiting are released.
    pub fn open_gate(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Return the number of recorded calls.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// List requests recorded for one endpoint.
    pub fn list_requests(&self, kind: ListKind) -> Vec<ListRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                MockCall::List(k, req) if *k == kind => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, call: MockCall) -> Result<(), ApiError> {
        lock(&self.calls).push(call);
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            match gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(ApiError::transport("mock gate closed")),
            }
        }
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConsoleApi for MockConsoleApi {
    async fn list_runs(&self, req: &ListRequest) -> Result<Vec<Run>, ApiError> {
        self.enter(MockCall::List(ListKind::Runs, req.clone()))
            .await?;
        Ok(apply_list_request(&lock(&self.data).runs, req))
    }

    async fn list_instances(&self, req: &ListRequest) -> Result<Vec<Instance>, ApiError> {
        self.enter(MockCall::List(ListKind::Instances, req.clone()))
            .await?;
        Ok(apply_list_request(&lock(&self.data).instances, req))
    }

    async fn list_events(&self, req: &ListRequest) -> Result<Vec<Event>, ApiError> {
        self.enter(MockCall::List(ListKind::Events, req.clone()))
            .await?;
        Ok(apply_list_request(&lock(&self.data).events, req))
    }

    async fn list_volumes(&self, req: &ListRequest) -> Result<Vec<Volume>, ApiError> {
        self.enter(MockCall::List(ListKind::Volumes, req.clone()))
            .await?;
        Ok(apply_list_request(&lock(&self.data).volumes, req))
    }

    async fn poll_logs(
        &self,
        project: &str,
        req: &LogPollRequest,
    ) -> Result<LogPollResponse, ApiError> {
        self.enter(MockCall::PollLogs(project.to_string(), req.clone()))
            .await?;
        let data = lock(&self.data);
        let Some(rows) = data.logs.get(&req.run_name) else {
            return Err(ApiError::Status {
                code: 404,
                body: format!("run {} not found", req.run_name),
            });
        };
        let mut selected: Vec<ApiLogRow> = rows
            .iter()
            .filter(|row| req.start_time.map_or(true, |start| row.timestamp >= start))
            .cloned()
            .collect();
        selected.sort_by_key(|row| row.timestamp);
        if req.descending {
            selected.reverse();
        }
        selected.truncate(req.limit);
        Ok(LogPollResponse {
            logs: selected,
            next_token: None,
        })
    }

    async fn stop_runs(&self, project: &str, req: &StopRunsRequest) -> Result<(), ApiError> {
        self.enter(MockCall::StopRuns(project.to_string(), req.clone()))
            .await?;
        let mut data = lock(&self.data);
        for run in data
            .runs
            .iter_mut()
            .filter(|run| run.project_name == project && req.runs_names.contains(&run.run_name))
        {
            run.status = if req.abort {
                RunStatus::Terminated
            } else {
                RunStatus::Terminating
            };
        }
        Ok(())
    }

    async fn delete_volumes(
        &self,
        project: &str,
        req: &DeleteVolumesRequest,
    ) -> Result<(), ApiError> {
        self.enter(MockCall::DeleteVolumes(project.to_string(), req.clone()))
            .await?;
        let mut data = lock(&self.data);
        for volume in data
            .volumes
            .iter_mut()
            .filter(|volume| volume.project_name == project && req.names.contains(&volume.name))
        {
            volume.deleted = true;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// Timestamp `secs` seconds after a fixed epoch, for deterministic fixtures.
pub fn fixture_time(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_default()
}

/// A running run submitted `secs` after the fixture epoch.
pub fn test_run(id: &str, project: &str, secs: i64) -> Run {
    Run {
        id: id.to_string(),
        project_name: project.to_string(),
        user: "admin".to_string(),
        run_name: format!("run-{id}"),
        submitted_at: fixture_time(secs),
        status: RunStatus::Running,
        termination_reason: None,
    }
}

/// `count` runs in `project` with ids `r000..` submitted one second apart.
pub fn test_runs(project: &str, count: usize) -> Vec<Run> {
    (0..count)
        .map(|i| test_run(&format!("r{i:03}"), project, i as i64))
        .collect()
}

pub fn test_event(id: &str, secs: i64, message: &str) -> Event {
    Event {
        id: id.to_string(),
        message: message.to_string(),
        recorded_at: fixture_time(secs),
        actor_user: Some("admin".to_string()),
        targets: Vec::new(),
    }
}

pub fn test_instance(id: &str, project: &str, secs: i64) -> Instance {
    Instance {
        id: id.to_string(),
        project_name: project.to_string(),
        name: format!("instance-{id}"),
        fleet_name: None,
        created: fixture_time(secs),
        status: "idle".to_string(),
        backend: Some("aws".to_string()),
        price: Some(1.5),
    }
}

pub fn test_volume(id: &str, project: &str, secs: i64) -> Volume {
    Volume {
        id: id.to_string(),
        name: format!("vol-{id}"),
        project_name: project.to_string(),
        created_at: fixture_time(secs),
        status: "active".to_string(),
        deleted: false,
        backend: None,
    }
}

pub fn test_log_row(secs: i64, message: &str) -> ApiLogRow {
    ApiLogRow {
        timestamp: fixture_time(secs),
        log_source: "stdout".to_string(),
        message: message.to_string(),
    }
}
