use std::time::Duration;

use tracing::{error, info, warn};
use url::Url;

use crate::codec::encode_result;
use crate::error::{Result, WebcheckError};
use crate::types::CheckResult;

const RESULT_PATH: &str = "api/worker/check-result";

/// How a submission ended. Acknowledgement never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Delivered,
    Rejected(u16),
    Failed(String),
}

/// Posts check results to the backend. No retries: a lost result is logged and dropped.
#[derive(Clone)]
pub struct ResultReporter {
    client: reqwest::Client,
    endpoint: Url,
    submit_timeout: Duration,
}

impl ResultReporter {
    pub fn new(client: reqwest::Client, backend_url: &str, submit_timeout: Duration) -> Result<Self> {
        let endpoint = result_endpoint(backend_url)?;
        Ok(Self { client, endpoint, submit_timeout })
    }

    pub async fn submit(&self, result: &CheckResult) -> ReportOutcome {
        let body = match encode_result(result) {
            Ok(body) => body,
            Err(e) => {
                error!(site_id = result.site_id, error = %e, "Failed to marshal result");
                return ReportOutcome::Failed(e.to_string());
            }
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.submit_timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().as_u16() < 400 => {
                info!(site_id = result.site_id, status = %result.status, "Successfully submitted result for site");
                ReportOutcome::Delivered
            }
            Ok(response) => {
                let status = response.status().as_u16();
                error!(site_id = result.site_id, status, "Backend returned error status");
                ReportOutcome::Rejected(status)
            }
            Err(e) => {
                error!(site_id = result.site_id, error = %e, "Failed to submit result");
                ReportOutcome::Failed(e.to_string())
            }
        }
    }

    /// Startup probe: any HTTP answer from the backend base URL counts as reachable.
    pub async fn check_reachable(&self) -> Result<()> {
        let mut base = self.endpoint.clone();
        base.set_path("/");

        match self.client.get(base.clone()).timeout(self.submit_timeout).send().await {
            Ok(response) => {
                info!(backend = %base, status = response.status().as_u16(), "Backend is reachable");
                Ok(())
            }
            Err(e) => {
                warn!(backend = %base, error = %e, "Backend is not reachable");
                Err(WebcheckError::Http(e))
            }
        }
    }
}

fn result_endpoint(backend_url: &str) -> Result<Url> {
    let invalid = |reason: String| WebcheckError::InvalidUrl { url: backend_url.to_string(), reason };

    let mut base = Url::parse(backend_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme: {}", base.scheme())));
    }
    // Url::join replaces the last segment unless the base ends with a slash.
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(RESULT_PATH).map_err(|e| invalid(e.to_string()))
}
