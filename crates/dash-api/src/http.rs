//! HTTP transport: implements `ConsoleApi` with JSON POSTs to the server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use dash_core::config::ServerConfig;
use dash_core::session::SessionContext;

use crate::cursor::ListRequest;
use crate::error::ApiError;
use crate::service::ConsoleApi;
use crate::types::{
    DeleteVolumesRequest, Event, Instance, ListKind, LogPollRequest, LogPollResponse, Run,
    StopRunsRequest, Volume,
};

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl From<&ServerConfig> for HttpConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            base_url: server.url.trim_end_matches('/').to_string(),
            request_timeout: server.request_timeout,
        }
    }
}

/// Console API backed by the control-plane REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpConsoleApi {
    client: Client,
    config: HttpConfig,
    session: SessionContext,
}

impl HttpConsoleApi {
    pub fn new(config: HttpConfig, session: SessionContext) -> Result<Self, ApiError> {
        if config.base_url.trim().is_empty() {
            return Err(ApiError::invalid("base_url is required"));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ApiError::transport(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            config,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = self.session.token().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(path, status = status.as_u16(), "console api response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Unauthorized {
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    #[tracing::instrument(skip(self, body), err)]
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tracing::instrument(skip(self, body), err)]
    async fn post_unit<B>(&self, path: &str, body: &B) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.send(path, body).await?;
        Ok(())
    }

    async fn list<R: DeserializeOwned>(
        &self,
        kind: ListKind,
        req: &ListRequest,
    ) -> Result<Vec<R>, ApiError> {
        if req.limit == 0 {
            return Err(ApiError::invalid("limit must be at least 1"));
        }
        self.post(kind.path(), &req.to_body(kind)).await
    }
}

fn project_path(project: &str, tail: &str) -> Result<String, ApiError> {
    let project = project.trim();
    if project.is_empty() || project.contains('/') {
        return Err(ApiError::invalid(format!("invalid project name {project:?}")));
    }
    Ok(format!("/api/project/{project}/{tail}"))
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn list_runs(&self, req: &ListRequest) -> Result<Vec<Run>, ApiError> {
        self.list(ListKind::Runs, req).await
    }

    async fn list_instances(&self, req: &ListRequest) -> Result<Vec<Instance>, ApiError> {
        self.list(ListKind::Instances, req).await
    }

    async fn list_events(&self, req: &ListRequest) -> Result<Vec<Event>, ApiError> {
        self.list(ListKind::Events, req).await
    }

    async fn list_volumes(&self, req: &ListRequest) -> Result<Vec<Volume>, ApiError> {
        self.list(ListKind::Volumes, req).await
    }

    async fn poll_logs(
        &self,
        project: &str,
        req: &LogPollRequest,
    ) -> Result<LogPollResponse, ApiError> {
        if req.run_name.trim().is_empty() {
            return Err(ApiError::invalid("run_name is required"));
        }
        self.post(&project_path(project, "logs/poll")?, req).await
    }

    async fn stop_runs(&self, project: &str, req: &StopRunsRequest) -> Result<(), ApiError> {
        if req.runs_names.is_empty() {
            return Err(ApiError::invalid("runs_names must not be empty"));
        }
        self.post_unit(&project_path(project, "runs/stop")?, req)
            .await
    }

    async fn delete_volumes(
        &self,
        project: &str,
        req: &DeleteVolumesRequest,
    ) -> Result<(), ApiError> {
        if req.names.is_empty() {
            return Err(ApiError::invalid("names must not be empty"));
        }
        self.post_unit(&project_path(project, "volumes/delete")?, req)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn config_from_server_trims_trailing_slash() {
        let server = ServerConfig {
            url: "https://console.example.org/".into(),
            ..ServerConfig::default()
        };
        let cfg = HttpConfig::from(&server);
        assert_eq!(cfg.base_url, "https://console.example.org");
        assert_eq!(cfg.request_timeout, server.request_timeout);
    }

    #[test]
    fn project_path_rejects_blank_and_nested_names() {
        assert_eq!(
            project_path("main", "logs/poll").unwrap(),
            "/api/project/main/logs/poll"
        );
        assert!(project_path(" ", "logs/poll").is_err());
        assert!(project_path("a/b", "logs/poll").is_err());
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let cfg = HttpConfig {
            base_url: String::new(),
            request_timeout: Duration::from_secs(1),
        };
        let err = HttpConsoleApi::new(cfg, SessionContext::ephemeral(None)).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn zero_limit_is_rejected_before_sending() {
        let cfg = HttpConfig {
            base_url: "http://127.0.0.1:9".into(),
            request_timeout: Duration::from_millis(200),
        };
        let api = HttpConsoleApi::new(cfg, SessionContext::ephemeral(None)).unwrap();
        let req = ListRequest::first(Default::default(), 0);
        let err = api.list_runs(&req).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument { .. }));
    }
}
