//! Deterministic call-id allocation over a [`Snapshot`].
//!
//! Every call site consumes a fixed block of ids: one for the call, one more
//! when a start delay is gated by a timer, and one per allowed retry. The
//! block size never depends on which attempt finished, so re-executed code
//! lands on the same ids at the same call sites in every round.

use crate::history::{CallKey, Snapshot};

/// Status of one logical call as seen in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The start delay has not been requested yet; a timer must be started
    /// under `timer_id`.
    TimerNotFound { timer_id: u64 },
    /// The start delay is still running.
    TimerRunning,
    /// An attempt is still running.
    Running,
    /// The first unscheduled attempt; it must be scheduled under `call_id`.
    NotFound { call_id: u64 },
    Found { call_id: u64, payload: Option<String> },
    Failed { call_id: u64, reason: String },
    /// Every attempt in the window timed out; `call_id` is the last one.
    Exhausted { call_id: u64 },
}

impl Lookup {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Lookup::TimerNotFound { .. } | Lookup::TimerRunning | Lookup::Running | Lookup::NotFound { .. }
        )
    }
}

/// Sequential replay cursor; starts at id 0 every round.
#[derive(Debug)]
pub struct ReplayCursor<'a> {
    snapshot: &'a Snapshot,
    next: u64,
}

impl<'a> ReplayCursor<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot, next: 0 }
    }

    /// Next id to be handed out.
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Number of ids one call site reserves.
    pub fn block_size(retry: u32, delay_secs: u64) -> u64 {
        1 + u64::from(delay_secs > 0) + u64::from(retry)
    }

    /// Resolve the call site at the cursor and advance past its whole block.
    pub fn resolve(&mut self, retry: u32, delay_secs: u64) -> Lookup {
        let start = self.next;
        let lookup = self.scan(start, retry, delay_secs);
        self.next = start + Self::block_size(retry, delay_secs);
        lookup
    }

    fn scan(&self, start: u64, retry: u32, delay_secs: u64) -> Lookup {
        let mut first = start;
        if delay_secs > 0 {
            if self.snapshot.result(start).is_some() {
                first += 1;
            } else if self.snapshot.is_running(CallKey::Timer(start)) {
                return Lookup::TimerRunning;
            } else {
                return Lookup::TimerNotFound { timer_id: start };
            }
        }
        let last = first + u64::from(retry);
        for call_id in first..=last {
            if self.snapshot.is_timed_out(call_id) {
                continue;
            }
            if self.snapshot.is_running(CallKey::Call(call_id)) {
                return Lookup::Running;
            }
            if let Some(reason) = self.snapshot.error(call_id) {
                return Lookup::Failed {
                    call_id,
                    reason: reason.to_string(),
                };
            }
            if let Some(payload) = self.snapshot.result(call_id) {
                return Lookup::Found {
                    call_id,
                    payload: payload.map(str::to_string),
                };
            }
            return Lookup::NotFound { call_id };
        }
        Lookup::Exhausted { call_id: last }
    }
}
