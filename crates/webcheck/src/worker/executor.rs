use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::checker::{Checker, HttpChecker};
use super::score::content_score;
use crate::types::{CheckJob, CheckResult};

/// Check executor - turns a job into a result. Never fails: every problem becomes a DOWN result.
#[derive(Clone)]
pub struct CheckExecutor {
    checker: Arc<dyn Checker>,
}

impl CheckExecutor {
    pub fn new(checker: Arc<dyn Checker>) -> Self {
        Self { checker }
    }

    pub fn http(client: reqwest::Client) -> Self {
        Self::new(Arc::new(HttpChecker::new(client)))
    }

    pub async fn execute(&self, job: &CheckJob) -> CheckResult {
        info!(site_id = job.site_id, url = %job.url, "Checking URL");

        match self.checker.probe(&job.url, Duration::from_secs(job.timeout)).await {
            Ok(probe) => {
                let score = content_score(probe.status, probe.has_content_type, &probe.body);
                CheckResult::responded(job.site_id, probe.elapsed_ms, probe.status, score)
            }
            Err(failure) => CheckResult::unreachable(job.site_id, failure.elapsed_ms, failure.error),
        }
    }
}
