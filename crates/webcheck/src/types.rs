use serde::{Deserialize, Serialize};

/// A monitored site as supplied by the registry. Never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Seconds between checks
    pub check_interval: u64,
    /// Probe deadline in seconds
    pub timeout: u64,
    pub enabled: bool,
    pub user_id: String,
}

/// Unit of work handed from the scheduler to a worker through the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckJob {
    pub site_id: i64,
    pub user_id: String,
    pub url: String,
    pub timeout: u64,
}

impl From<&Site> for CheckJob {
    fn from(site: &Site) -> Self {
        Self {
            site_id: site.id,
            user_id: site.user_id.clone(),
            url: site.url.clone(),
            timeout: site.timeout,
        }
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Up,
    Down,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Up => write!(f, "UP"),
            CheckStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// Result document submitted to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub site_id: i64,

    /// Completion time, RFC 3339
    pub timestamp: String,

    pub status: CheckStatus,

    /// Wall-clock time until the response headers arrived (or the failure), in milliseconds
    pub response_time: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_score: Option<u8>,
}

impl CheckResult {
    /// A check that never got an HTTP response.
    pub fn unreachable(site_id: i64, response_time: u64, error: String) -> Self {
        Self {
            site_id,
            timestamp: now_rfc3339(),
            status: CheckStatus::Down,
            response_time,
            status_code: None,
            error: Some(error),
            seo_score: None,
        }
    }

    /// A check that received a response; anything at or above 400 counts as down.
    pub fn responded(site_id: i64, response_time: u64, status_code: u16, seo_score: u8) -> Self {
        let status = if status_code >= 400 { CheckStatus::Down } else { CheckStatus::Up };
        Self {
            site_id,
            timestamp: now_rfc3339(),
            status,
            response_time,
            status_code: Some(status_code),
            error: None,
            seo_score: Some(seo_score),
        }
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
