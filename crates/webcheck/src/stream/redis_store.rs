use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, Value};

use super::{CLAIM_CURSOR_START, ClaimedPage, GroupCreation, StreamEntry, StreamStore};
use crate::error::{Result, WebcheckError};
use crate::pool::RedisPool;

/// Redis Streams backend (XADD / XGROUP / XREADGROUP / XAUTOCLAIM / XACK).
#[derive(Clone)]
pub struct RedisStreamStore {
    pool: RedisPool,
}

impl RedisStreamStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn append(&self, stream: &str, fields: &[(&str, String)]) -> Result<String> {
        let mut conn = self.pool.get().await?;
        let mut command = redis::cmd("XADD");
        command.arg(stream).arg("*");
        for (field, value) in fields {
            command.arg(*field).arg(value);
        }
        let id: String = command.query_async(&mut conn).await?;
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<GroupCreation> {
        let mut conn = self.pool.get().await?;
        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => Ok(GroupCreation::Created),
            Err(error) if is_busy_group_error(&error) => Ok(GroupCreation::AlreadyExists),
            Err(error) => Err(error.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.pool.get().await?;
        // BLOCK 0 would wait forever
        let block_ms = u64::try_from(block.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count.max(1))
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        parse_xreadgroup_reply(reply)
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        after: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.pool.get().await?;
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count.max(1))
            .arg("STREAMS")
            .arg(stream)
            .arg(after)
            .query_async(&mut conn)
            .await?;

        parse_xreadgroup_reply(reply)
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        cursor: &str,
        count: usize,
    ) -> Result<ClaimedPage> {
        let mut conn = self.pool.get().await?;
        let min_idle_ms = u64::try_from(min_idle.as_millis()).unwrap_or(u64::MAX);
        let reply: Value = redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(cursor)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await?;

        parse_xautoclaim_reply(reply)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let acked: i64 = redis::cmd("XACK").arg(stream).arg(group).arg(id).query_async(&mut conn).await?;
        Ok(acked > 0)
    }
}

fn is_busy_group_error(error: &redis::RedisError) -> bool {
    error.code() == Some("BUSYGROUP") || error.to_string().to_ascii_uppercase().contains("BUSYGROUP")
}

/// `[[stream, [[id, [field, value, ...]], ...]], ...]`, a RESP3 map of the same, or nil on timeout.
fn parse_xreadgroup_reply(reply: Value) -> Result<Vec<StreamEntry>> {
    match reply {
        Value::Nil => Ok(Vec::new()),
        Value::Array(streams) => {
            let mut entries = Vec::new();
            for stream in streams {
                let Value::Array(stream_entry) = stream else {
                    continue;
                };
                entries.extend(parse_entries(stream_entry.get(1)));
            }
            Ok(entries)
        }
        Value::Map(streams) => {
            let mut entries = Vec::new();
            for (_, stream_entries) in streams {
                entries.extend(parse_entries(Some(&stream_entries)));
            }
            Ok(entries)
        }
        other => Err(WebcheckError::UnexpectedReply(format!("xreadgroup returned {other:?}"))),
    }
}

/// `[next-cursor, [[id, [field, value, ...]], ...], [deleted-id, ...]]`
fn parse_xautoclaim_reply(reply: Value) -> Result<ClaimedPage> {
    match reply {
        Value::Array(parts) => Ok(ClaimedPage {
            entries: parse_entries(parts.get(1)),
            next_cursor: value_to_string(parts.first()).unwrap_or_else(|| CLAIM_CURSOR_START.to_string()),
        }),
        other => Err(WebcheckError::UnexpectedReply(format!("xautoclaim returned {other:?}"))),
    }
}

fn parse_entries(entries: Option<&Value>) -> Vec<StreamEntry> {
    let Some(Value::Array(entries)) = entries else {
        return Vec::new();
    };

    let mut parsed = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Array(parts) = entry else {
            continue;
        };
        let Some(id) = value_to_string(parts.first()) else {
            continue;
        };
        // Entries trimmed from the stream while pending come back with nil fields;
        // keep them so the consumer can acknowledge them away.
        parsed.push(StreamEntry { id, fields: parse_fields(parts.get(1)) });
    }
    parsed
}

fn parse_fields(value: Option<&Value>) -> HashMap<String, String> {
    match value {
        Some(Value::Array(parts)) => parts
            .chunks(2)
            .filter_map(|pair| {
                let field = value_to_string(pair.first())?;
                Some((field, value_to_string(pair.get(1)).unwrap_or_default()))
            })
            .collect(),
        Some(Value::Map(pairs)) => pairs
            .iter()
            .filter_map(|(field, value)| {
                let field = value_to_string(Some(field))?;
                Some((field, value_to_string(Some(value)).unwrap_or_default()))
            })
            .collect(),
        _ => HashMap::new(),
    }
}

fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        Value::SimpleString(value) => Some(value.clone()),
        Value::Okay => Some("OK".to_string()),
        Value::Int(value) => Some(value.to_string()),
        _ => None,
    }
}
