//! Durable, ordered job stream with consumer groups.
//!
//! The store assigns every appended entry a unique, monotonically increasing id and
//! load-balances entries across the consumers of a group. Delivered entries stay
//! pending for their consumer until acknowledged, which gives at-least-once delivery:
//! an entry whose consumer dies before the ack can be claimed by another consumer.

mod memory;
mod redis_store;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryStreamStore;
pub use redis_store::RedisStreamStore;

/// A single stream entry as delivered to a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Cursor value that starts a claim scan at the head of the pending list, and that
/// `claim_stale` hands back once the scan has wrapped around.
pub const CLAIM_CURSOR_START: &str = "0-0";

/// One page of a stale-entry claim scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimedPage {
    pub entries: Vec<StreamEntry>,
    /// Where the next page starts; `CLAIM_CURSOR_START` when the scan is complete.
    pub next_cursor: String,
}

/// What `create_group` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreation {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Append one entry, returning the id the store assigned to it.
    async fn append(&self, stream: &str, fields: &[(&str, String)]) -> Result<String>;

    /// Create `group` on `stream` (creating the stream too), starting from the first entry.
    async fn create_group(&self, stream: &str, group: &str) -> Result<GroupCreation>;

    /// Entries never delivered to any consumer of the group, waiting up to `block`.
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>>;

    /// Entries already delivered to `consumer` but not acknowledged yet, with ids
    /// strictly greater than `after` (`"0"` for the start).
    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        after: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>>;

    /// Take over up to `count` entries pending on any consumer for at least `min_idle`,
    /// scanning the pending list from `cursor` (inclusive).
    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        cursor: &str,
        count: usize,
    ) -> Result<ClaimedPage>;

    /// Returns false when the entry was not pending (already acked or unknown).
    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool>;
}
