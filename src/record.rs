//! Per-client throttle state and its byte encoding.

use crate::error::CodecError;
use serde::{Deserialize, Serialize};

/// Counter state persisted under one client key.
///
/// Timestamps are unix milliseconds taken from the throttler's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleRecord {
    pub hits: u64,
    pub first_throttled_at: u64,
    pub last_throttled_at: u64,
}

impl ThrottleRecord {
    /// A record for a client seen for the first time at `now`.
    pub fn first(now: u64) -> Self {
        Self {
            hits: 1,
            first_throttled_at: now,
            last_throttled_at: now,
        }
    }

    /// Counts one more throttle event at `now`.
    pub fn hit(&mut self, now: u64) {
        self.hits = self.hits.saturating_add(1);
        self.last_throttled_at = now;
    }

    /// Milliseconds elapsed since the last throttle event.
    ///
    /// Clock skew between processes sharing a store can put the last hit in
    /// the future; that counts as no time elapsed.
    pub fn idle_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_throttled_at)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
