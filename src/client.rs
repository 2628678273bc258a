use std::{fmt, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use reqwest::{header::CONTENT_TYPE, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;

use crate::backoff::RetryPolicy;
use crate::events::IngestRequest;
use crate::model::{
    HealthResponse, IngestEventsResponse, Project, ProjectSummary, Run, RunValidation, RunsResponse,
};
use crate::normalize;

const API_KEY_HEADER: &str = "x-api-key";

/// Everything the client needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub health_include_api_key: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
            health_include_api_key: false,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Non-2xx answer from the backend, with whatever body came back.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub body: Value,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API request failed ({})", self.status)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// Best-effort human message out of the error body.
    pub fn detail(&self) -> Option<String> {
        match &self.body {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(obj) => ["detail", "error", "message"]
                .iter()
                .find_map(|k| obj.get(*k))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunsParams {
    pub project_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Clone)]
pub struct VeriOpsClient {
    http: reqwest::Client,
    cfg: Arc<ClientConfig>,
}

struct Request<'a> {
    method: Method,
    url: Url,
    body: Option<&'a Value>,
    include_api_key: bool,
}

impl VeriOpsClient {
    pub fn new(cfg: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, cfg: Arc::new(cfg) })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    /// Absolute `http(s)://` paths pass through; anything else is appended to
    /// the base URL, keeping any path prefix the base carries.
    pub fn build_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).with_context(|| format!("invalid URL {path}"));
        }
        let base = self.cfg.base_url.as_str().trim_end_matches('/');
        let sep = if path.starts_with('/') { "" } else { "/" };
        Url::parse(&format!("{base}{sep}{path}")).with_context(|| format!("invalid API path {path}"))
    }

    /// `path` plus percent-encoded trailing segments, e.g. a run id.
    fn resource_url(&self, path: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.build_url(path)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("base URL {} cannot carry a path", self.cfg.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, req: Request<'_>) -> Result<Value> {
        let retries = if req.method == Method::GET { self.cfg.retry.max_retries } else { 0 };
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut builder = self
                .http
                .request(req.method.clone(), req.url.clone())
                .header(CONTENT_TYPE, "application/json");
            if req.include_api_key {
                if let Some(key) = &self.cfg.api_key {
                    builder = builder.header(API_KEY_HEADER, key);
                }
            }
            if let Some(body) = req.body {
                builder = builder.json(body);
            }
            tracing::debug!(method = %req.method, url = %req.url, attempt, "sending request");

            let retryable = match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let body = read_body(resp).await?;
                    if status.is_success() {
                        return Ok(body);
                    }
                    let err = ApiError { status: status.as_u16(), body };
                    if !is_retryable(status) || attempt > retries {
                        return Err(err.into());
                    }
                    anyhow::Error::new(err)
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt <= retries => e.into(),
                Err(e) => {
                    return Err(e).with_context(|| format!("{} {} failed", req.method, req.url));
                }
            };

            let delay = self.cfg.retry.delay(attempt);
            tracing::warn!(url = %req.url, attempt, ?delay, error = %retryable, "retrying request");
            sleep(delay).await;
        }
    }

    async fn get(&self, url: Url) -> Result<Value> {
        self.execute(Request { method: Method::GET, url, body: None, include_api_key: true }).await
    }

    async fn send_json(&self, method: Method, url: Url, body: &Value) -> Result<Value> {
        self.execute(Request { method, url, body: Some(body), include_api_key: true }).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.build_url("/health")?;
        let body = self
            .execute(Request {
                method: Method::GET,
                url,
                body: None,
                include_api_key: self.cfg.health_include_api_key,
            })
            .await?;
        decode(body, "health")
    }

    pub async fn projects(&self) -> Result<Vec<Project>> {
        let body = self.get(self.build_url("/v1/projects")?).await?;
        Ok(normalize::normalize_projects(&body))
    }

    pub async fn project_summary(&self, project_id: &str, limit: u32) -> Result<ProjectSummary> {
        let mut url = self.resource_url("/v1/projects", &[project_id, "summary"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let body = self.get(url).await?;
        if body.is_null() {
            return Ok(ProjectSummary::default());
        }
        decode(body, "project summary")
    }

    pub async fn project_runs(&self, project_id: &str, limit: u32, offset: u32) -> Result<RunsResponse> {
        let mut url = self.resource_url("/v1/projects", &[project_id, "runs"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        let body = self.get(url).await?;
        Ok(normalize::normalize_runs(&body))
    }

    pub async fn runs(&self, params: &RunsParams) -> Result<RunsResponse> {
        let mut url = self.build_url("/v1/runs")?;
        {
            let mut q = url.query_pairs_mut();
            if let Some(project) = &params.project_id {
                q.append_pair("project_id", project);
            }
            q.append_pair("limit", &params.limit.to_string());
            q.append_pair("offset", &params.offset.to_string());
        }
        let body = self.get(url).await?;
        Ok(normalize::normalize_runs(&body))
    }

    pub async fn run(&self, run_id: &str) -> Result<Run> {
        let body = self.get(self.resource_url("/v1/runs", &[run_id])?).await?;
        normalize::normalize_run_detail(&body)
            .ok_or_else(|| anyhow!("run {run_id}: response carried no run with an id and project_id"))
    }

    pub async fn run_validations(&self, run_id: &str, limit: u32) -> Result<Vec<RunValidation>> {
        let mut url = self.resource_url("/v1/runs", &[run_id, "validations"])?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        let body = self.get(url).await?;
        Ok(normalize::normalize_validations(&body))
    }

    pub async fn validate_run(&self, run_id: &str, runbook_yaml: &str) -> Result<RunValidation> {
        let url = self.resource_url("/v1/runs", &[run_id, "validate"])?;
        let body = self
            .send_json(Method::POST, url, &serde_json::json!({ "runbook_yaml": runbook_yaml }))
            .await?;
        normalize::normalize_validation(&body)
            .ok_or_else(|| anyhow!("run {run_id}: validate response was not an object"))
    }

    pub async fn delete_run(&self, run_id: &str) -> Result<()> {
        let url = self.resource_url("/v1/runs", &[run_id])?;
        self.execute(Request { method: Method::DELETE, url, body: None, include_api_key: true })
            .await?;
        Ok(())
    }

    /// Sends an already-validated payload verbatim, preserving event order.
    pub async fn ingest_events(&self, payload: &Value) -> Result<IngestEventsResponse> {
        let body = self.send_json(Method::POST, self.build_url("/v1/events")?, payload).await?;
        if body.is_null() {
            return Ok(IngestEventsResponse::default());
        }
        decode(body, "ingest response")
    }

    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestEventsResponse> {
        let payload = serde_json::to_value(request).context("failed to encode events")?;
        self.ingest_events(&payload).await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn decode<T: DeserializeOwned>(body: Value, what: &str) -> Result<T> {
    serde_json::from_value(body).with_context(|| format!("unexpected {what} payload"))
}

/// Empty body is `Null`; JSON content types are parsed when they parse;
/// everything else comes back as a string.
async fn read_body(resp: reqwest::Response) -> Result<Value> {
    let is_json = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    let text = resp.text().await.context("failed to read response body")?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    if is_json {
        if let Ok(v) = serde_json::from_str(&text) {
            return Ok(v);
        }
    }
    Ok(Value::String(text))
}
