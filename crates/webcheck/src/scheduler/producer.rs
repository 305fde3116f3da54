use std::sync::Arc;

use tracing::debug;

use crate::codec::encode_job;
use crate::error::Result;
use crate::stream::StreamStore;
use crate::types::CheckJob;

/// Appends check jobs to the job stream.
#[derive(Clone)]
pub struct JobProducer {
    stream: Arc<dyn StreamStore>,
    stream_name: String,
}

impl JobProducer {
    pub fn new(stream: Arc<dyn StreamStore>, stream_name: impl Into<String>) -> Self {
        Self { stream, stream_name: stream_name.into() }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Returns the id the stream assigned to the new entry.
    pub async fn enqueue(&self, job: &CheckJob) -> Result<String> {
        let fields = encode_job(job)?;
        let entry_id = self.stream.append(&self.stream_name, &fields).await?;
        debug!(site_id = job.site_id, entry_id = %entry_id, stream = %self.stream_name, "Appended check job");
        Ok(entry_id)
    }
}
