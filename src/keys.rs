//! Wire encoding of call identifiers.
//!
//! Activities use the plain call id, timers append [`TIMER_SUFFIX`], and
//! sub-workflows prepend a random UUID because the service never allows a
//! workflow id to be reused, while call ids restart from zero after every
//! continue-as-new. Every encoding is reversible by the projector.

use crate::error::HistoryError;
use crate::limits::TIMER_SUFFIX;
use uuid::Uuid;

pub fn activity_key(call_id: u64) -> String {
    call_id.to_string()
}

pub fn parse_activity_key(key: &str) -> Result<u64, HistoryError> {
    key.parse().map_err(|_| HistoryError::MalformedKey {
        kind: "activity",
        value: key.to_string(),
    })
}

pub fn timer_key(call_id: u64) -> String {
    format!("{call_id}{TIMER_SUFFIX}")
}

pub fn parse_timer_key(key: &str) -> Result<u64, HistoryError> {
    key.strip_suffix(TIMER_SUFFIX)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HistoryError::MalformedKey {
            kind: "timer",
            value: key.to_string(),
        })
}

/// Globally unique workflow id embedding `call_id` as its last `-` segment.
pub fn subworkflow_key(call_id: u64) -> String {
    format!("{}-{call_id}", Uuid::new_v4())
}

pub fn parse_subworkflow_key(key: &str) -> Result<u64, HistoryError> {
    key.rsplit_once('-')
        .and_then(|(_, id)| id.parse().ok())
        .ok_or_else(|| HistoryError::MalformedKey {
            kind: "sub-workflow",
            value: key.to_string(),
        })
}
