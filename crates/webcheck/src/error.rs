//! Error types shared by the scheduler and worker pipelines.

use deadpool_redis::redis::RedisError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebcheckError {
    #[error("failed to create redis pool: {0}")]
    PoolSetup(#[from] deadpool_redis::CreatePoolError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("serialisation error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("corrupt record at {key}: {value:?}")]
    CorruptRecord { key: String, value: String },

    #[error("invalid stream entry id: {0:?}")]
    InvalidEntryId(String),

    #[error("stream entry {entry_id} has no `{field}` field")]
    MissingField { entry_id: String, field: &'static str },

    #[error("consumer group {group} does not exist on stream {stream}")]
    NoGroup { stream: String, group: String },

    #[error("malformed stream reply: {0}")]
    UnexpectedReply(String),
}

impl WebcheckError {
    /// True when a stream read failed because the consumer group vanished,
    /// e.g. after the stream key was deleted.
    pub fn is_missing_group(&self) -> bool {
        match self {
            Self::NoGroup { .. } => true,
            Self::Redis(error) => error.code() == Some("NOGROUP"),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebcheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_group_detection() {
        let error = WebcheckError::NoGroup { stream: "check_jobs".into(), group: "workers".into() };
        assert!(error.is_missing_group());

        let error = WebcheckError::UnexpectedReply("nil".into());
        assert!(!error.is_missing_group());
    }
}
