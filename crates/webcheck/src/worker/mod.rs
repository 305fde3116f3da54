/// Check worker - consumes jobs from the stream and reports their results
///
/// Per entry the worker decodes the job, probes the site, submits the result and
/// then acknowledges the entry whatever happened along the way. Entries a consumer
/// received but never acknowledged are picked up again: by the same consumer on
/// restart (pending recovery) or by any consumer once they go stale (claim).
pub mod checker;
pub mod executor;
pub mod reporter;
pub mod score;

pub use checker::{Checker, HttpChecker, MAX_BODY_BYTES, Probe, ProbeFailure, USER_AGENT, http_client_builder};
pub use executor::CheckExecutor;
pub use reporter::{ReportOutcome, ResultReporter};
pub use score::content_score;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::decode_job;
use crate::config::{StreamConfig, WorkerConfig};
use crate::error::Result;
use crate::stream::{CLAIM_CURSOR_START, GroupCreation, StreamEntry, StreamStore};

const RETRY_BACKOFF_BASE_MS: u64 = 500;
const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

/// Upper bound on entries taken over in one claim round.
const MAX_CLAIMED_PER_ROUND: usize = 100;

/// Where and how a worker consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub block: Duration,
    pub batch_size: usize,
    pub idle_sleep: Duration,
    pub claim_min_idle: Duration,
    pub claim_interval: Duration,
}

impl ConsumerSettings {
    pub fn from_config(stream: &StreamConfig, worker: &WorkerConfig) -> Self {
        Self {
            stream: stream.name.clone(),
            group: stream.group.clone(),
            consumer: worker.consumer_name.clone().unwrap_or_else(default_consumer_name),
            block: Duration::from_millis(worker.block_ms),
            batch_size: worker.batch_size.max(1),
            idle_sleep: Duration::from_millis(worker.idle_sleep_ms),
            claim_min_idle: Duration::from_secs(worker.claim_min_idle_secs),
            claim_interval: Duration::from_secs(worker.claim_interval_secs),
        }
    }
}

/// `worker-<pid>-<suffix>`, unique enough to keep two processes on one host apart.
pub fn default_consumer_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("worker-{}-{}", std::process::id(), suffix)
}

/// Exponential back-off for consecutive poll failures, capped.
pub fn compute_retry_backoff_ms(base_ms: u64, failure_streak: u32) -> u64 {
    if failure_streak <= 1 {
        return base_ms.max(1);
    }
    let shift = failure_streak.saturating_sub(1).min(12);
    base_ms.max(1).saturating_mul(1u64 << shift).min(MAX_RETRY_BACKOFF_MS)
}

pub struct Worker {
    store: Arc<dyn StreamStore>,
    executor: CheckExecutor,
    reporter: ResultReporter,
    settings: ConsumerSettings,
}

impl Worker {
    pub fn new(
        store: Arc<dyn StreamStore>,
        executor: CheckExecutor,
        reporter: ResultReporter,
        settings: ConsumerSettings,
    ) -> Self {
        Self { store, executor, reporter, settings }
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Create the consumer group (and stream). An existing group is fine.
    pub async fn ensure_group(&self) -> Result<GroupCreation> {
        let ConsumerSettings { stream, group, .. } = &self.settings;
        let creation = self.store.create_group(stream, group).await?;
        match creation {
            GroupCreation::Created => info!(%stream, %group, "Created consumer group"),
            GroupCreation::AlreadyExists => debug!(%stream, %group, "Consumer group already exists"),
        }
        Ok(creation)
    }

    /// Finish whatever this consumer was handed before it last stopped.
    pub async fn recover_pending(&self) -> Result<usize> {
        let ConsumerSettings { stream, group, consumer, batch_size, .. } = &self.settings;
        let mut after = String::from("0");
        let mut handled = 0;

        // Page by id so an entry whose ack failed is visited once, not on every read.
        loop {
            let entries = self.store.read_pending(stream, group, consumer, &after, *batch_size).await?;
            let Some(last) = entries.last() else {
                break;
            };
            after = last.id.clone();
            for entry in &entries {
                self.handle_entry(entry).await;
                handled += 1;
            }
        }

        if handled > 0 {
            info!(%consumer, handled, "Recovered pending jobs");
        }
        Ok(handled)
    }

    /// Take over jobs left idle by other (likely dead) consumers and process them.
    pub async fn claim_stale(&self) -> Result<usize> {
        let ConsumerSettings { stream, group, consumer, batch_size, claim_min_idle, .. } = &self.settings;
        let mut cursor = CLAIM_CURSOR_START.to_string();
        let mut claimed = 0;

        loop {
            let page = self
                .store
                .claim_stale(stream, group, consumer, *claim_min_idle, &cursor, *batch_size)
                .await?;
            for entry in &page.entries {
                self.handle_entry(entry).await;
            }
            claimed += page.entries.len();

            if page.next_cursor == CLAIM_CURSOR_START || claimed >= MAX_CLAIMED_PER_ROUND {
                break;
            }
            cursor = page.next_cursor;
        }

        if claimed > 0 {
            info!(%consumer, claimed, "Claimed stale jobs");
        }
        Ok(claimed)
    }

    /// One blocking read of new entries; returns how many were handled.
    pub async fn poll_once(&self) -> Result<usize> {
        let ConsumerSettings { stream, group, consumer, block, batch_size, .. } = &self.settings;
        let entries = self.store.read_group(stream, group, consumer, *block, *batch_size).await?;

        for entry in &entries {
            self.handle_entry(entry).await;
        }
        Ok(entries.len())
    }

    /// Decode, execute, report, then ack. `None` when the entry held no usable job.
    pub async fn handle_entry(&self, entry: &StreamEntry) -> Option<ReportOutcome> {
        info!(entry_id = %entry.id, "Processing job");

        let outcome = match decode_job(&entry.id, &entry.fields) {
            Ok(job) => {
                let result = self.executor.execute(&job).await;
                Some(self.reporter.submit(&result).await)
            }
            Err(e) => {
                error!(entry_id = %entry.id, error = %e, "Failed to decode job, dropping it");
                None
            }
        };

        self.acknowledge(&entry.id).await;
        outcome
    }

    async fn acknowledge(&self, entry_id: &str) {
        let ConsumerSettings { stream, group, .. } = &self.settings;
        match self.store.ack(stream, group, entry_id).await {
            Ok(true) => debug!(%entry_id, "Acknowledged job"),
            Ok(false) => warn!(%entry_id, "Job was no longer pending when acknowledged"),
            Err(e) => error!(%entry_id, error = %e, "Failed to acknowledge job"),
        }
    }

    /// Consume until cancelled. Only a failure to set up the consumer group is returned;
    /// everything later is logged and retried.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            consumer = %self.settings.consumer,
            stream = %self.settings.stream,
            group = %self.settings.group,
            "Starting worker..."
        );
        self.ensure_group().await?;

        if let Err(e) = self.recover_pending().await {
            warn!(error = %e, "Failed to recover pending jobs");
        }

        let mut next_claim = Instant::now() + self.settings.claim_interval;
        let mut failure_streak: u32 = 0;

        while !cancel.is_cancelled() {
            if Instant::now() >= next_claim {
                if let Err(e) = self.claim_stale().await {
                    warn!(error = %e, "Failed to claim stale jobs");
                }
                next_claim = Instant::now() + self.settings.claim_interval;
            }

            let pause = match self.poll_once().await {
                Ok(0) => {
                    failure_streak = 0;
                    self.settings.idle_sleep
                }
                Ok(_) => {
                    failure_streak = 0;
                    continue;
                }
                Err(e) => {
                    failure_streak = failure_streak.saturating_add(1);
                    let delay_ms = compute_retry_backoff_ms(RETRY_BACKOFF_BASE_MS, failure_streak);
                    error!(error = %e, failure_streak, delay_ms, "Failed to read from stream");

                    if e.is_missing_group() {
                        if let Err(e) = self.ensure_group().await {
                            error!(error = %e, "Failed to recreate consumer group");
                        }
                    }
                    Duration::from_millis(delay_ms)
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(pause) => {}
            }
        }

        info!(consumer = %self.settings.consumer, "Stopping worker...");
        Ok(())
    }
}
