// src/block.rs - Suppression of repeated notifications per target

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::Result;
use crate::keyspace;
use crate::models::{AlarmDefinition, TagMap};
use crate::store::{get_value, CoordinationStore};

/// Lower bound of the suppression window, minutes.
pub const MIN_BLOCK_MINUTES: u64 = 5;

/// Subtracted from the status TTL so it expires before the intended boundary.
pub const STATUS_TTL_MARGIN: Duration = Duration::from_secs(5);

/// Added to the times TTL so the counter outlives the status key.
pub const TIMES_TTL_MARGIN: Duration = Duration::from_secs(10);

/// Persisted suppression state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Nothing recorded
    NoBlock = 0,
    /// Status expired but the counter survived
    AddBlock = 1,
    /// Currently suppressing
    AlreadyAlertWhileBlock = 2,
}

impl BlockState {
    fn from_value(value: u64) -> Self {
        match value {
            1 => BlockState::AddBlock,
            2 => BlockState::AlreadyAlertWhileBlock,
            _ => BlockState::NoBlock,
        }
    }

    pub fn as_value(&self) -> u64 {
        *self as u64
    }
}

/// Values to persist after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWrite {
    pub times: u64,
    pub status_ttl: Duration,
    pub times_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDecision {
    pub blocked: bool,
    pub write: Option<BlockWrite>,
}

/// Suppression window in minutes: `step * times`, at least
/// [`MIN_BLOCK_MINUTES`], at most `max`.
pub fn status_ttl_minutes(step: u64, times: u64, max: u64) -> u64 {
    step.saturating_mul(times).max(MIN_BLOCK_MINUTES).min(max)
}

/// Persisted TTLs for a window of `status_minutes` and a check interval of
/// `every_minutes`. The times key always outlives the status key by one
/// interval plus both margins.
pub fn block_ttls(status_minutes: u64, every_minutes: u64) -> (Duration, Duration) {
    let status_ttl =
        Duration::from_secs(status_minutes.saturating_mul(60)).saturating_sub(STATUS_TTL_MARGIN);
    let times_ttl = Duration::from_secs(status_minutes.saturating_add(every_minutes).saturating_mul(60))
        .saturating_add(TIMES_TTL_MARGIN);
    (status_ttl, times_ttl)
}

/// Transition from the stored state. Pure; the caller persists `write`.
pub fn next_state(current: BlockState, times: u64, alarm: &AlarmDefinition) -> BlockDecision {
    let times = match current {
        BlockState::AlreadyAlertWhileBlock => {
            return BlockDecision {
                blocked: true,
                write: None,
            }
        }
        BlockState::NoBlock => 1,
        BlockState::AddBlock => times.saturating_add(1),
    };

    let minutes = status_ttl_minutes(alarm.block_step_minutes, times, alarm.max_block_minutes);
    let (status_ttl, times_ttl) = block_ttls(minutes, alarm.every_minutes);

    BlockDecision {
        blocked: false,
        write: Some(BlockWrite {
            times,
            status_ttl,
            times_ttl,
        }),
    }
}

/// Per-target suppression backed by two TTL'd store keys.
///
/// Reads that fail count as absent, so an unavailable store never suppresses.
/// The read-then-write is not atomic across instances; two instances handling
/// the same target concurrently may both notify.
pub struct BlockEngine {
    store: Arc<dyn CoordinationStore>,
}

impl BlockEngine {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    async fn read_counter(&self, key: &str) -> Option<u64> {
        match get_value(self.store.as_ref(), key).await {
            Ok(value) => value.and_then(|v| v.trim().parse().ok()),
            Err(e) => {
                debug!(key, error = %e, "Block read failed, treating as absent");
                None
            }
        }
    }

    /// Stored state and counter for a target.
    pub async fn read_block(
        &self,
        ns: &str,
        version: &str,
        host: &str,
        tag_fp: &str,
    ) -> (BlockState, u64) {
        let status = self
            .read_counter(&keyspace::block_status_key(ns, version, host, tag_fp))
            .await;
        let times = self
            .read_counter(&keyspace::block_times_key(ns, version, host, tag_fp))
            .await
            .unwrap_or(0);

        let state = match status {
            Some(value) if value > 0 => BlockState::from_value(value),
            _ if times > 0 => BlockState::AddBlock,
            _ => BlockState::NoBlock,
        };
        (state, times)
    }

    /// Decide whether this event is suppressed and record the next state.
    ///
    /// The decision is made before anything is written; write failures are
    /// logged and never change it.
    pub async fn is_block(
        &self,
        ns: &str,
        alarm: &AlarmDefinition,
        host: &str,
        tags: &TagMap,
    ) -> bool {
        let tag_fp = keyspace::tag_fingerprint(tags);
        let (state, times) = self.read_block(ns, &alarm.version, host, &tag_fp).await;
        let decision = next_state(state, times, alarm);

        debug!(
            ns,
            version = %alarm.version,
            host,
            ?state,
            times,
            blocked = decision.blocked,
            "Block decision"
        );

        if let Some(write) = decision.write {
            self.persist(ns, &alarm.version, host, &tag_fp, write).await;
        }
        decision.blocked
    }

    async fn persist(&self, ns: &str, version: &str, host: &str, tag_fp: &str, write: BlockWrite) {
        let status_key = keyspace::block_status_key(ns, version, host, tag_fp);
        let status_value = BlockState::AlreadyAlertWhileBlock.as_value().to_string();
        if let Err(e) = self
            .store
            .set_with_ttl(&status_key, &status_value, write.status_ttl)
            .await
        {
            error!(key = %status_key, error = %e, "Failed to write block status");
        }

        let times_key = keyspace::block_times_key(ns, version, host, tag_fp);
        if let Err(e) = self
            .store
            .set_with_ttl(&times_key, &write.times.to_string(), write.times_ttl)
            .await
        {
            error!(key = %times_key, error = %e, "Failed to write block times");
        }
    }

    /// Drop the suppression state of a target. Absent state is success.
    pub async fn clear_block(&self, ns: &str, version: &str, host: &str, tags: &TagMap) -> Result<()> {
        let tag_fp = keyspace::tag_fingerprint(tags);
        match self
            .store
            .delete_dir(&keyspace::block_dir(ns, version, host, &tag_fp))
            .await
        {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }
}
