//! Wire encoding for check jobs (stream entries) and check results (backend documents).
//!
//! A job travels as a single-field stream entry whose `job` field holds the JSON
//! document; results are posted to the backend as plain JSON bodies.

use std::collections::HashMap;

use crate::error::{Result, WebcheckError};
use crate::types::{CheckJob, CheckResult};

/// Stream entry field carrying the encoded job
pub const JOB_FIELD: &str = "job";

pub fn encode_job(job: &CheckJob) -> Result<Vec<(&'static str, String)>> {
    Ok(vec![(JOB_FIELD, serde_json::to_string(job)?)])
}

pub fn decode_job(entry_id: &str, fields: &HashMap<String, String>) -> Result<CheckJob> {
    let raw = fields
        .get(JOB_FIELD)
        .ok_or_else(|| WebcheckError::MissingField { entry_id: entry_id.to_string(), field: JOB_FIELD })?;
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_result(result: &CheckResult) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(result)?)
}

pub fn decode_result(bytes: &[u8]) -> Result<CheckResult> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckStatus;

    fn job() -> CheckJob {
        CheckJob {
            site_id: 42,
            user_id: "user123".into(),
            url: "https://example.com".into(),
            timeout: 10,
        }
    }

    fn fields_of(encoded: Vec<(&'static str, String)>) -> HashMap<String, String> {
        encoded.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_job_round_trip() {
        let fields = fields_of(encode_job(&job()).unwrap());
        assert_eq!(decode_job("1-0", &fields).unwrap(), job());
    }

    #[test]
    fn test_job_wire_shape() {
        let encoded = encode_job(&job()).unwrap();
        assert_eq!(encoded[0].0, "job");

        let value: serde_json::Value = serde_json::from_str(&encoded[0].1).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "siteId": 42,
                "userId": "user123",
                "url": "https://example.com",
                "timeout": 10
            })
        );
    }

    #[test]
    fn test_decode_missing_field() {
        let error = decode_job("5-1", &HashMap::new()).unwrap_err();
        assert!(matches!(error, WebcheckError::MissingField { field: "job", .. }));
        assert!(error.to_string().contains("5-1"));
    }

    #[test]
    fn test_decode_garbage() {
        let mut fields = HashMap::new();
        fields.insert("job".to_string(), "{not json".to_string());
        assert!(matches!(decode_job("5-2", &fields), Err(WebcheckError::Codec(_))));
    }

    #[test]
    fn test_result_round_trip() {
        let up = CheckResult {
            site_id: 9,
            timestamp: "2025-01-01T00:00:00Z".into(),
            status: CheckStatus::Up,
            response_time: 120,
            status_code: Some(200),
            error: None,
            seo_score: Some(85),
        };
        assert_eq!(decode_result(&encode_result(&up).unwrap()).unwrap(), up);

        let down = CheckResult {
            site_id: 9,
            timestamp: "2025-01-01T00:00:00Z".into(),
            status: CheckStatus::Down,
            response_time: 10_000,
            status_code: None,
            error: Some("Request failed: operation timed out".into()),
            seo_score: None,
        };
        assert_eq!(decode_result(&encode_result(&down).unwrap()).unwrap(), down);
    }

    #[test]
    fn test_result_status_strings() {
        let bytes = br#"{"siteId":1,"timestamp":"2025-01-01T00:00:00Z","status":"DOWN","responseTime":3,"statusCode":503}"#;
        let result = decode_result(bytes).unwrap();
        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(result.seo_score, None);
    }
}
