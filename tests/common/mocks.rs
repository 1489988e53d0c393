//! Mock job-info fetchers for test fixtures.
//!
//! Re-exports the mocks from `wepp_status::adapters::mock` and adds a
//! fetcher whose responses can be held back, for tests that need several
//! exception lines to arrive while a fetch is still in flight.

pub use wepp_status::adapters::mock::{
    MockConnector, MockHttpClient, MockResponse, MockServer, RecordingPanel,
};

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use wepp_status::stacktrace::JobInfoFetcher;
use wepp_status::traits::HttpError;

/// Fetcher that records job ids and answers only once released.
pub struct GatedFetcher {
    calls: Mutex<Vec<String>>,
    call_count: watch::Sender<usize>,
    open: watch::Sender<bool>,
    result: Result<String, HttpError>,
}

impl GatedFetcher {
    /// Answers with `detail` once released.
    pub fn succeeding(detail: &str) -> Self {
        Self::with_result(Ok(detail.to_string()))
    }

    /// Fails with `err` once released.
    pub fn failing(err: HttpError) -> Self {
        Self::with_result(Err(err))
    }

    fn with_result(result: Result<String, HttpError>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            call_count: watch::channel(0).0,
            open: watch::channel(false).0,
            result,
        }
    }

    /// Let pending and future fetches complete.
    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        let mut rx = self.call_count.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

#[async_trait]
impl JobInfoFetcher for GatedFetcher {
    async fn fetch_job_info(&self, job_id: &str) -> Result<String, HttpError> {
        self.calls.lock().unwrap().push(job_id.to_string());
        self.call_count.send_modify(|n| *n += 1);

        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        self.result.clone()
    }
}
