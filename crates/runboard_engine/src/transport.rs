use std::time::Duration;

use client_logging::client_debug;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;

use crate::{ClientError, Job, Project, RecentRun, RunDetails, RunsPage};

#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Root of the backend API; endpoint paths are appended to it.
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl TransportSettings {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// Typed calls against the experiment backend. No retries, no caching.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>, ClientError>;

    async fn submit_job(&self, project_id: &str) -> Result<Job, ClientError>;

    async fn poll_job_status(&self, project_id: &str, job_id: &str) -> Result<Job, ClientError>;

    async fn list_recent_runs(
        &self,
        project_id: &str,
        page: RunsPage,
    ) -> Result<Vec<RecentRun>, ClientError>;

    async fn run_details(&self, run_id: &str) -> Result<RunDetails, ClientError>;
}

/// HTTP transport using the path-parameterized endpoint layout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    base_url: Url,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, ClientError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|err| ClientError::Validation(format!("base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Validation(format!(
                "base url cannot carry paths: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ClientError::Network(err.to_string()))?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T, ClientError> {
        client_debug!("{method} {url}");
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&body).map_err(|err| ClientError::Parse(err.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.request(Method::GET, self.endpoint(&["projects"])).await
    }

    async fn submit_job(&self, project_id: &str) -> Result<Job, ClientError> {
        require("project id", project_id)?;
        let job: Job = self
            .request(Method::POST, self.endpoint(&["jobs", project_id]))
            .await?;
        job.validate()
    }

    async fn poll_job_status(&self, project_id: &str, job_id: &str) -> Result<Job, ClientError> {
        require("project id", project_id)?;
        require("job id", job_id)?;
        let job: Job = self
            .request(
                Method::GET,
                self.endpoint(&["jobs", project_id, job_id, "status"]),
            )
            .await?;
        job.validate()
    }

    async fn list_recent_runs(
        &self,
        project_id: &str,
        page: RunsPage,
    ) -> Result<Vec<RecentRun>, ClientError> {
        require("project id", project_id)?;
        let mut url = self.endpoint(&["runs", project_id]);
        url.query_pairs_mut()
            .append_pair("limit", &page.limit.to_string())
            .append_pair("offset", &page.offset.to_string());
        self.request(Method::GET, url).await
    }

    async fn run_details(&self, run_id: &str) -> Result<RunDetails, ClientError> {
        require("run id", run_id)?;
        self.request(Method::GET, self.endpoint(&["run-details", run_id]))
            .await
    }
}

fn require(what: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_decode() {
        return ClientError::Parse(err.to_string());
    }
    ClientError::Network(err.to_string())
}
