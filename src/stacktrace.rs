//! Stacktrace lookup for failed jobs.
//!
//! When a status line reports an exception, the resolver fetches the job's
//! failure detail once and writes it into a [`StacktracePanel`]. Repeated
//! exception lines for the same job while a fetch is in flight, or after
//! the detail is shown, do not fetch again. A failed fetch is logged and
//! forgotten, so a later exception line for the job can retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SocketConfig;
use crate::error::StatusError;
use crate::status_line::{is_valid_job_id, StatusLine};
use crate::traits::{Headers, HttpClient, HttpError, StacktracePanel};

/// Path of the job-info endpoint, relative to the site root.
pub const JOBINFO_PATH: &str = "/weppcloud/rq/api/jobinfo";

/// Source of job failure detail.
#[async_trait]
pub trait JobInfoFetcher: Send + Sync {
    /// Fetch the displayable failure detail of `job_id`.
    async fn fetch_job_info(&self, job_id: &str) -> Result<String, HttpError>;
}

/// Job-info payload. Every field is optional; unknown fields are kept in
/// `raw`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    pub id: Option<String>,
    pub status: Option<String>,
    pub exc_info: Option<String>,
    pub description: Option<String>,
    pub raw: Value,
}

impl JobInfo {
    /// Parse a job-info response body.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let raw: Value = serde_json::from_str(body)?;
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        let id = match raw.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self {
            id,
            status: text("status"),
            exc_info: text("exc_info").filter(|s| !s.trim().is_empty()),
            description: text("description"),
            raw,
        }
    }

    /// Text for the stacktrace panel: `exc_info` when present, otherwise
    /// the whole payload as compact JSON.
    pub fn detail(&self) -> String {
        match &self.exc_info {
            Some(exc) => exc.clone(),
            None => self.raw.to_string(),
        }
    }
}

/// Fetches job info over HTTP from `{base_url}/weppcloud/rq/api/jobinfo/{id}`.
pub struct HttpJobInfoFetcher<C: HttpClient> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> HttpJobInfoFetcher<C> {
    /// `base_url` is the site root, e.g. `https://wepp.cloud`.
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Fetcher for the site serving the status channels of `config`.
    pub fn from_config(client: C, config: &SocketConfig) -> Self {
        let scheme = if config.use_tls { "https" } else { "http" };
        Self::new(client, format!("{}://{}", scheme, config.host.trim_end_matches('/')))
    }

    pub fn url_for(&self, job_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            JOBINFO_PATH,
            urlencoding::encode(job_id)
        )
    }
}

#[async_trait]
impl<C: HttpClient> JobInfoFetcher for HttpJobInfoFetcher<C> {
    async fn fetch_job_info(&self, job_id: &str) -> Result<String, HttpError> {
        let url = self.url_for(job_id);
        debug!(job_id, url = %url, "Fetching job info");

        let mut headers = Headers::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        let response = self.client.get(&url, &headers).await?;

        if !response.is_success() {
            return Err(HttpError::ServerError {
                status: response.status,
                message: response.text().unwrap_or_default(),
            });
        }

        let body = response
            .text()
            .map_err(|e| HttpError::InvalidResponse(e.to_string()))?;
        let info = JobInfo::parse(&body).map_err(|e| HttpError::InvalidResponse(e.to_string()))?;
        Ok(info.detail())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobFetch {
    Pending,
    Displayed,
}

/// What [`StacktraceResolver::resolve`] did.
#[derive(Debug)]
pub enum ResolveOutcome {
    /// A fetch was spawned
    Started(JoinHandle<()>),
    /// A fetch for this job is in flight
    AlreadyPending,
    /// This job's stacktrace is already shown
    AlreadyDisplayed,
    /// The job id is not usable; nothing was fetched
    InvalidId,
}

/// Fetches and shows each failed job's stacktrace at most once.
#[derive(Clone)]
pub struct StacktraceResolver {
    panel: Arc<dyn StacktracePanel>,
    fetcher: Arc<dyn JobInfoFetcher>,
    jobs: Arc<Mutex<HashMap<String, JobFetch>>>,
}

impl StacktraceResolver {
    pub fn new(panel: Arc<dyn StacktracePanel>, fetcher: Arc<dyn JobInfoFetcher>) -> Self {
        Self {
            panel,
            fetcher,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve the job of an exception line. Other lines are ignored.
    pub fn resolve_line(&self, line: &StatusLine) -> Option<ResolveOutcome> {
        match line {
            StatusLine::Exception { job_id, .. } => Some(self.resolve(job_id)),
            _ => None,
        }
    }

    /// Start fetching `job_id` unless it is pending, shown or invalid.
    ///
    /// Must be called from within a tokio runtime.
    pub fn resolve(&self, job_id: &str) -> ResolveOutcome {
        if !is_valid_job_id(job_id) {
            debug!(job_id, "Skipping stacktrace fetch for unusable job id");
            return ResolveOutcome::InvalidId;
        }

        {
            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            match jobs.get(job_id) {
                Some(JobFetch::Pending) => return ResolveOutcome::AlreadyPending,
                Some(JobFetch::Displayed) => return ResolveOutcome::AlreadyDisplayed,
                None => {
                    jobs.insert(job_id.to_string(), JobFetch::Pending);
                }
            }
        }

        let resolver = self.clone();
        let job_id = job_id.to_string();
        ResolveOutcome::Started(tokio::spawn(async move {
            resolver.fetch_and_show(job_id).await;
        }))
    }

    async fn fetch_and_show(&self, job_id: String) {
        match self.fetcher.fetch_job_info(&job_id).await {
            Ok(detail) => {
                info!(job_id = %job_id, "Showing stacktrace");
                self.panel.reveal();
                self.panel.set_body(&detail);
                self.set_state(&job_id, Some(JobFetch::Displayed));
            }
            Err(e) => {
                let err = StatusError::from(e);
                warn!(
                    job_id = %job_id,
                    category = %err.category(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Failed to fetch job info"
                );
                self.set_state(&job_id, None);
            }
        }
    }

    fn set_state(&self, job_id: &str, state: Option<JobFetch>) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        match state {
            Some(state) => {
                jobs.insert(job_id.to_string(), state);
            }
            None => {
                jobs.remove(job_id);
            }
        }
    }

    /// Whether a fetch for `job_id` is in flight.
    pub fn is_pending(&self, job_id: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(job_id) == Some(&JobFetch::Pending)
    }

    /// Whether the stacktrace of `job_id` has been shown.
    pub fn is_displayed(&self, job_id: &str) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(job_id) == Some(&JobFetch::Displayed)
    }
}
