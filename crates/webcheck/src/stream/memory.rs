use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout};

use super::{CLAIM_CURSOR_START, ClaimedPage, GroupCreation, StreamEntry, StreamStore};
use crate::error::{Result, WebcheckError};

type EntryId = (u64, u64);

#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: BTreeMap<EntryId, HashMap<String, String>>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

impl StreamState {
    fn next_id(&mut self) -> EntryId {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let (last_ms, last_seq) = self.last_id;
        self.last_id = if now_ms > last_ms { (now_ms, 0) } else { (last_ms, last_seq + 1) };
        self.last_id
    }

    fn entry(&self, id: EntryId) -> StreamEntry {
        StreamEntry {
            id: format_id(id),
            fields: self.entries.get(&id).cloned().unwrap_or_default(),
        }
    }
}

/// In-process stream store with Redis-like consumer group semantics.
///
/// Cloning shares the underlying streams, so a scheduler and several workers in one
/// test can talk through the same instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamStore {
    streams: Arc<Mutex<HashMap<String, StreamState>>>,
    appended: Arc<Notify>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamState>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every entry ever appended to `stream`, in order.
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        let streams = self.lock();
        streams
            .get(stream)
            .map(|state| state.entries.keys().map(|id| state.entry(*id)).collect())
            .unwrap_or_default()
    }

    /// Number of delivered but unacknowledged entries in the group.
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        let streams = self.lock();
        streams
            .get(stream)
            .and_then(|state| state.groups.get(group))
            .map(|group| group.pending.len())
            .unwrap_or(0)
    }

    /// How many times the entry has been handed out, if it is still pending.
    pub fn delivery_count(&self, stream: &str, group: &str, id: &str) -> Option<u32> {
        let id = parse_id(id)?;
        let streams = self.lock();
        streams.get(stream)?.groups.get(group)?.pending.get(&id).map(|p| p.deliveries)
    }

    fn no_group(stream: &str, group: &str) -> WebcheckError {
        WebcheckError::NoGroup { stream: stream.to_string(), group: group.to_string() }
    }

    fn try_deliver(&self, stream: &str, group: &str, consumer: &str, count: usize) -> Result<Vec<StreamEntry>> {
        let mut streams = self.lock();
        let state = streams.get_mut(stream).ok_or_else(|| Self::no_group(stream, group))?;
        let group_state = state.groups.get_mut(group).ok_or_else(|| Self::no_group(stream, group))?;

        let fresh: Vec<EntryId> = state
            .entries
            .range((Bound::Excluded(group_state.last_delivered), Bound::Unbounded))
            .take(count.max(1))
            .map(|(id, _)| *id)
            .collect();

        let now = Instant::now();
        for id in &fresh {
            group_state.last_delivered = *id;
            group_state
                .pending
                .insert(*id, PendingEntry { consumer: consumer.to_string(), delivered_at: now, deliveries: 1 });
        }

        Ok(fresh.into_iter().map(|id| state.entry(id)).collect())
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn append(&self, stream: &str, fields: &[(&str, String)]) -> Result<String> {
        let id = {
            let mut streams = self.lock();
            let state = streams.entry(stream.to_string()).or_default();
            let id = state.next_id();
            let fields = fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
            state.entries.insert(id, fields);
            id
        };
        self.appended.notify_waiters();
        Ok(format_id(id))
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<GroupCreation> {
        let mut streams = self.lock();
        let state = streams.entry(stream.to_string()).or_default();
        if state.groups.contains_key(group) {
            return Ok(GroupCreation::AlreadyExists);
        }
        state.groups.insert(group.to_string(), GroupState::default());
        Ok(GroupCreation::Created)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;
        loop {
            // Registered before the check so an append in between still wakes us.
            let appended = self.appended.notified();

            let entries = self.try_deliver(stream, group, consumer, count)?;
            if !entries.is_empty() {
                return Ok(entries);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || timeout(remaining, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        after: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let after = parse_bound(after)?;
        let mut streams = self.lock();
        let state = streams.get_mut(stream).ok_or_else(|| Self::no_group(stream, group))?;
        let group_state = state.groups.get_mut(group).ok_or_else(|| Self::no_group(stream, group))?;

        let now = Instant::now();
        let mut ids = Vec::new();
        for (id, pending) in group_state.pending.range_mut((Bound::Excluded(after), Bound::Unbounded)) {
            if ids.len() >= count.max(1) {
                break;
            }
            if pending.consumer == consumer {
                pending.delivered_at = now;
                pending.deliveries += 1;
                ids.push(*id);
            }
        }

        Ok(ids.into_iter().map(|id| state.entry(id)).collect())
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
        let start = parse_bound(cursor)?;
        let mut streams = self.lock();
        let state = streams.get_mut(stream).ok_or_else(|| Self::no_group(stream, group))?;
        let group_state = state.groups.get_mut(group).ok_or_else(|| Self::no_group(stream, group))?;

        let now = Instant::now();
        let mut ids = Vec::new();
        let mut next_cursor = None;
        for (id, pending) in group_state.pending.range_mut(start..) {
            if ids.len() >= count.max(1) {
                next_cursor = Some(*id);
                break;
            }
            if now.duration_since(pending.delivered_at) >= min_idle {
                pending.consumer = consumer.to_string();
                pending.delivered_at = now;
                pending.deliveries += 1;
                ids.push(*id);
            }
        }

        Ok(ClaimedPage {
            entries: ids.into_iter().map(|id| state.entry(id)).collect(),
            next_cursor: next_cursor.map_or_else(|| CLAIM_CURSOR_START.to_string(), format_id),
        })
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<bool> {
        let Some(id) = parse_id(id) else {
            return Ok(false);
        };
        let mut streams = self.lock();
        let acked = streams
            .get_mut(stream)
            .and_then(|state| state.groups.get_mut(group))
            .map(|group| group.pending.remove(&id).is_some())
            .unwrap_or(false);
        Ok(acked)
    }
}

fn format_id((ms, seq): EntryId) -> String {
    format!("{ms}-{seq}")
}

fn parse_id(raw: &str) -> Option<EntryId> {
    let (ms, seq) = raw.split_once('-')?;
    Some((ms.parse().ok()?, seq.parse().ok()?))
}

/// Range bound in stream-id syntax; a bare `ms` means `ms-0`.
fn parse_bound(raw: &str) -> Result<EntryId> {
    parse_id(raw)
        .or_else(|| raw.parse::<u64>().ok().map(|ms| (ms, 0)))
        .ok_or_else(|| WebcheckError::InvalidEntryId(raw.to_string()))
}
