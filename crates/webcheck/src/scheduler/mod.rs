/// Due-check scheduling
///
/// Once per tick the evaluator lists every site, keeps the enabled ones whose
/// interval has elapsed since their last enqueued check, and appends one job per
/// due site to the job stream. The last-check timestamp only moves after a
/// successful append, so a failed append leaves the site due on the next tick.
pub mod clock;
pub mod producer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use producer::JobProducer;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::registry::SiteRegistry;
use crate::store::LastCheckStore;
use crate::types::{CheckJob, Site};

/// Tally of one scheduling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub considered: usize,
    pub disabled: usize,
    pub not_due: usize,
    pub enqueued: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteOutcome {
    Disabled,
    NotDue,
    Enqueued,
    Failed,
}

/// Decides which sites are due and enqueues their checks.
pub struct DueCheckEvaluator {
    registry: Arc<dyn SiteRegistry>,
    last_checks: Arc<dyn LastCheckStore>,
    producer: JobProducer,
    clock: Arc<dyn Clock>,
}

impl DueCheckEvaluator {
    pub fn new(
        registry: Arc<dyn SiteRegistry>,
        last_checks: Arc<dyn LastCheckStore>,
        producer: JobProducer,
    ) -> Self {
        Self { registry, last_checks, producer, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Tick loop. The first pass runs immediately; ticks missed by a slow pass are
    /// skipped rather than queued. Cancellation is only observed between passes.
    pub async fn run(&self, tick: Duration, cancel: CancellationToken) {
        info!(tick_secs = tick.as_secs(), stream = %self.producer.stream_name(), "Starting scheduler...");

        let mut timer = interval(tick);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            self.tick_once().await;
        }

        info!("Stopping scheduler...");
    }

    /// One pass with logging; a registry failure is reported and swallowed.
    pub async fn tick_once(&self) -> Option<PassReport> {
        info!("Processing due checks...");
        match self.run_pass().await {
            Ok(report) => {
                info!(
                    considered = report.considered,
                    enqueued = report.enqueued,
                    not_due = report.not_due,
                    disabled = report.disabled,
                    failed = report.failed,
                    "Scheduling pass finished"
                );
                Some(report)
            }
            Err(error) => {
                error!(%error, "Failed to get sites, skipping this pass");
                None
            }
        }
    }

    /// Evaluate every site once. Only a registry failure aborts the pass; store and
    /// stream failures are confined to the site they happened on.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let now = self.clock.now_unix();
        let sites = self.registry.list_sites().await?;

        let mut report = PassReport { considered: sites.len(), ..PassReport::default() };
        for site in &sites {
            match self.evaluate_site(site, now).await {
                SiteOutcome::Disabled => report.disabled += 1,
                SiteOutcome::NotDue => report.not_due += 1,
                SiteOutcome::Enqueued => report.enqueued += 1,
                SiteOutcome::Failed => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn evaluate_site(&self, site: &Site, now: i64) -> SiteOutcome {
        if !site.enabled {
            return SiteOutcome::Disabled;
        }

        let last_check = match self.last_checks.get(site.id).await {
            Ok(last_check) => last_check.unwrap_or(0),
            Err(error) => {
                error!(site_id = site.id, %error, "Failed to get last check time");
                return SiteOutcome::Failed;
            }
        };

        let interval = i64::try_from(site.check_interval).unwrap_or(i64::MAX);
        if now.saturating_sub(last_check) < interval {
            return SiteOutcome::NotDue;
        }

        info!(site_id = site.id, name = %site.name, "Scheduling check for site");
        let entry_id = match self.producer.enqueue(&CheckJob::from(site)).await {
            Ok(entry_id) => entry_id,
            Err(error) => {
                error!(site_id = site.id, %error, "Failed to add job to stream");
                return SiteOutcome::Failed;
            }
        };

        // The job is already out; a failed write only means a possible duplicate next tick.
        if let Err(error) = self.last_checks.set(site.id, now).await {
            error!(site_id = site.id, entry_id = %entry_id, %error, "Failed to update last check time");
        } else {
            debug!(site_id = site.id, last_check = now, "Updated last check time");
        }

        info!(site_id = site.id, entry_id = %entry_id, "Successfully scheduled check for site");
        SiteOutcome::Enqueued
    }
}
