use std::time::{Duration, Instant};

use tracing::warn;

/// Sent on every probe.
pub const USER_AGENT: &str = "WebChecker/1.0";

/// Upper bound on the body bytes kept from a probed page.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// What came back from a site that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub status: u16,
    pub has_content_type: bool,
    /// At most `MAX_BODY_BYTES`; partial if the read failed midway
    pub body: Vec<u8>,
    /// Time until the response headers arrived
    pub elapsed_ms: u64,
}

/// A probe that never got an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub elapsed_ms: u64,
    pub error: String,
}

/// Checker trait for fetching a site once.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn probe(&self, url: &str, deadline: Duration) -> Result<Probe, ProbeFailure>;
}

/// Builder with the probe defaults applied; the caller may add more before building.
pub fn http_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().user_agent(USER_AGENT)
}

/// HTTP/HTTPS checker
#[derive(Clone)]
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    /// The client is shared across probes; the deadline is applied per request.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, url: &str, deadline: Duration) -> Result<Probe, ProbeFailure> {
        let start = Instant::now();

        let mut response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| ProbeFailure {
                elapsed_ms: elapsed_ms(start),
                error: format!("Request failed: {e}"),
            })?;

        let elapsed_ms = elapsed_ms(start);
        let status = response.status().as_u16();
        let has_content_type = response.headers().contains_key(reqwest::header::CONTENT_TYPE);
        let body = read_capped(&mut response, MAX_BODY_BYTES).await;

        Ok(Probe { status, has_content_type, body, elapsed_ms })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Reads until `limit` bytes or the end of the body, whichever comes first.
async fn read_capped(response: &mut reqwest::Response, limit: usize) -> Vec<u8> {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(error) => {
                warn!(url = %response.url(), %error, "Failed to read response body");
                break;
            }
        }
    }
    body
}
