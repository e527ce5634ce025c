//! Limits and defaults.
//!
//! Collect all hard limits in one place so they're easy to find, document,
//! and reference from the decider, the poller and the activity reporting path.

/// Maximum size in bytes of a failure reason accepted by the coordination
/// service. Longer reasons are cut on a UTF-8 boundary by [`truncate_reason`].
pub const MAX_REASON_BYTES: usize = 256;

/// Maximum length of a worker identity string.
pub const MAX_IDENTITY_CHARS: usize = 256;

/// Default cap on outbound commands per decision response.
pub const DEFAULT_RATE_LIMIT: usize = 64;

/// Attempts made to fetch one history page before the whole poll is
/// abandoned and redone from a fresh first page.
pub const PAGE_FETCH_ATTEMPTS: u32 = 7;

/// Default `executionStartToClose` for registered workflow types, in seconds.
pub const DEFAULT_WORKFLOW_DURATION_SECS: u64 = 3600;

/// Default `taskStartToClose` for decision tasks, in seconds.
pub const DEFAULT_DECISION_DURATION_SECS: u64 = 600;

/// Suffix appended to a call id to form a timer identifier.
pub const TIMER_SUFFIX: &str = ":t";

/// Cut `reason` to at most [`MAX_REASON_BYTES`] bytes without splitting a
/// UTF-8 sequence.
pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_REASON_BYTES {
        return reason.to_string();
    }
    let mut end = MAX_REASON_BYTES;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

/// Keep the trailing [`MAX_IDENTITY_CHARS`] characters of an identity.
pub fn clamp_identity(identity: &str) -> String {
    let count = identity.chars().count();
    identity
        .chars()
        .skip(count.saturating_sub(MAX_IDENTITY_CHARS))
        .collect()
}
