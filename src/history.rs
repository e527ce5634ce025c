//! History events and their projection into a per-round [`Snapshot`].
//!
//! The service delivers history oldest-first. Scheduling events carry the call
//! id directly, while terminal events only point back at the event that
//! scheduled them, so the projector keeps a transient `event id -> call`
//! index while it scans.

use crate::error::HistoryError;
use crate::keys;
use crate::workflow::ChildPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Registered type of a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowType {
    pub name: String,
    pub version: String,
}

/// One immutable history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(event_id: u64, kind: EventKind) -> Self {
        Self { event_id, kind }
    }
}

/// Event attributes, tagged by `eventType` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all_fields = "camelCase")]
pub enum EventKind {
    WorkflowExecutionStarted {
        workflow_type: WorkflowType,
        #[serde(default)]
        input: Option<String>,
        task_list: String,
        #[serde(default)]
        task_start_to_close_timeout: Option<u64>,
        #[serde(default)]
        execution_start_to_close_timeout: Option<u64>,
        #[serde(default)]
        tag_list: Vec<String>,
        #[serde(default)]
        child_policy: Option<ChildPolicy>,
    },
    ActivityTaskScheduled {
        activity_id: String,
    },
    ActivityTaskCompleted {
        scheduled_event_id: u64,
        #[serde(default)]
        result: Option<String>,
    },
    ActivityTaskFailed {
        scheduled_event_id: u64,
        #[serde(default)]
        reason: Option<String>,
    },
    ActivityTaskTimedOut {
        scheduled_event_id: u64,
        #[serde(default)]
        timeout_type: Option<String>,
    },
    ActivityTaskCanceled {
        scheduled_event_id: u64,
    },
    ScheduleActivityTaskFailed {
        activity_id: String,
        cause: String,
    },
    StartChildWorkflowExecutionInitiated {
        workflow_id: String,
    },
    ChildWorkflowExecutionCompleted {
        initiated_event_id: u64,
        workflow_id: String,
        #[serde(default)]
        result: Option<String>,
    },
    ChildWorkflowExecutionFailed {
        initiated_event_id: u64,
        workflow_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    ChildWorkflowExecutionTimedOut {
        initiated_event_id: u64,
        workflow_id: String,
    },
    ChildWorkflowExecutionCanceled {
        initiated_event_id: u64,
        workflow_id: String,
    },
    ChildWorkflowExecutionTerminated {
        initiated_event_id: u64,
        workflow_id: String,
    },
    StartChildWorkflowExecutionFailed {
        workflow_id: String,
        cause: String,
    },
    TimerStarted {
        timer_id: String,
    },
    TimerFired {
        timer_id: String,
        started_event_id: u64,
    },
    /// Any event type the decider does not act on.
    #[serde(other)]
    Other,
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            EventKind::ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
            EventKind::ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
            EventKind::ActivityTaskFailed { .. } => "ActivityTaskFailed",
            EventKind::ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
            EventKind::ActivityTaskCanceled { .. } => "ActivityTaskCanceled",
            EventKind::ScheduleActivityTaskFailed { .. } => "ScheduleActivityTaskFailed",
            EventKind::StartChildWorkflowExecutionInitiated { .. } => "StartChildWorkflowExecutionInitiated",
            EventKind::ChildWorkflowExecutionCompleted { .. } => "ChildWorkflowExecutionCompleted",
            EventKind::ChildWorkflowExecutionFailed { .. } => "ChildWorkflowExecutionFailed",
            EventKind::ChildWorkflowExecutionTimedOut { .. } => "ChildWorkflowExecutionTimedOut",
            EventKind::ChildWorkflowExecutionCanceled { .. } => "ChildWorkflowExecutionCanceled",
            EventKind::ChildWorkflowExecutionTerminated { .. } => "ChildWorkflowExecutionTerminated",
            EventKind::StartChildWorkflowExecutionFailed { .. } => "StartChildWorkflowExecutionFailed",
            EventKind::TimerStarted { .. } => "TimerStarted",
            EventKind::TimerFired { .. } => "TimerFired",
            EventKind::Other => "Other",
        }
    }
}

/// Key of an outstanding schedule. Timers live in their own key space so a
/// running timer never shadows the call id it gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallKey {
    Call(u64),
    Timer(u64),
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKey::Call(id) => write!(f, "{}", keys::activity_key(*id)),
            CallKey::Timer(id) => write!(f, "{}", keys::timer_key(*id)),
        }
    }
}

/// Read-only view of one execution's history, built once per round.
///
/// `running`, `timed_out`, `results` and `errors` are pairwise disjoint over
/// call ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    running: BTreeSet<CallKey>,
    timed_out: BTreeSet<u64>,
    results: BTreeMap<u64, Option<String>>,
    errors: BTreeMap<u64, String>,
    order: Vec<u64>,
}

impl Snapshot {
    /// Project `events` in a single pass.
    pub fn project(events: &[Event]) -> Result<Self, HistoryError> {
        let mut projector = Projector::default();
        for event in events {
            projector.apply(event)?;
        }
        Ok(projector.finish())
    }

    pub fn is_running(&self, key: CallKey) -> bool {
        self.running.contains(&key)
    }

    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn is_timed_out(&self, call_id: u64) -> bool {
        self.timed_out.contains(&call_id)
    }

    /// Result payload recorded for `call_id`. A fired timer reads as `Some(None)`.
    pub fn result(&self, call_id: u64) -> Option<Option<&str>> {
        self.results.get(&call_id).map(|r| r.as_deref())
    }

    pub fn error(&self, call_id: u64) -> Option<&str> {
        self.errors.get(&call_id).map(String::as_str)
    }

    /// Position of `call_id` among terminal arrivals, if it has finished.
    pub fn arrival(&self, call_id: u64) -> Option<usize> {
        self.order.iter().position(|id| *id == call_id)
    }

    pub fn running(&self) -> impl Iterator<Item = &CallKey> {
        self.running.iter()
    }

    pub fn timed_out(&self) -> impl Iterator<Item = &u64> {
        self.timed_out.iter()
    }

    pub fn results(&self) -> impl Iterator<Item = (&u64, &Option<String>)> {
        self.results.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&u64, &String)> {
        self.errors.iter()
    }

    pub fn order(&self) -> &[u64] {
        &self.order
    }
}

/// Incremental left-to-right projector.
///
/// Dropping a projector discards everything scanned so far, which is how a
/// failed page fetch throws away partial state.
#[derive(Debug, Default)]
pub struct Projector {
    scheduled: HashMap<u64, u64>,
    snapshot: Snapshot,
}

impl Projector {
    pub fn apply(&mut self, event: &Event) -> Result<(), HistoryError> {
        let event_id = event.event_id;
        match &event.kind {
            EventKind::ActivityTaskScheduled { activity_id } => {
                let call_id = keys::parse_activity_key(activity_id)?;
                self.scheduled.insert(event_id, call_id);
                self.snapshot.running.insert(CallKey::Call(call_id));
            }
            EventKind::ActivityTaskCompleted {
                scheduled_event_id,
                result,
            } => {
                let call_id = self.resolve(event_id, *scheduled_event_id)?;
                self.finish_running(event_id, call_id)?;
                self.snapshot.results.insert(call_id, result.clone());
                self.snapshot.order.push(call_id);
            }
            EventKind::ActivityTaskFailed {
                scheduled_event_id,
                reason,
            } => {
                let call_id = self.resolve(event_id, *scheduled_event_id)?;
                self.finish_running(event_id, call_id)?;
                self.record_error(call_id, reason.clone().unwrap_or_default());
            }
            EventKind::ActivityTaskTimedOut {
                scheduled_event_id, ..
            }
            | EventKind::ActivityTaskCanceled { scheduled_event_id } => {
                let call_id = self.resolve(event_id, *scheduled_event_id)?;
                self.finish_running(event_id, call_id)?;
                self.record_timeout(call_id);
            }
            EventKind::ScheduleActivityTaskFailed { activity_id, cause } => {
                let call_id = keys::parse_activity_key(activity_id)?;
                self.fail_schedule(event_id, call_id, cause)?;
            }
            EventKind::StartChildWorkflowExecutionInitiated { workflow_id } => {
                let call_id = keys::parse_subworkflow_key(workflow_id)?;
                self.scheduled.insert(event_id, call_id);
                self.snapshot.running.insert(CallKey::Call(call_id));
            }
            EventKind::ChildWorkflowExecutionCompleted {
                initiated_event_id,
                result,
                ..
            } => {
                let call_id = self.resolve(event_id, *initiated_event_id)?;
                self.finish_running(event_id, call_id)?;
                self.snapshot.results.insert(call_id, result.clone());
                self.snapshot.order.push(call_id);
            }
            EventKind::ChildWorkflowExecutionFailed {
                initiated_event_id,
                reason,
                ..
            } => {
                let call_id = self.resolve(event_id, *initiated_event_id)?;
                self.finish_running(event_id, call_id)?;
                self.record_error(call_id, reason.clone().unwrap_or_default());
            }
            EventKind::ChildWorkflowExecutionTimedOut {
                initiated_event_id, ..
            }
            | EventKind::ChildWorkflowExecutionCanceled {
                initiated_event_id, ..
            }
            | EventKind::ChildWorkflowExecutionTerminated {
                initiated_event_id, ..
            } => {
                let call_id = self.resolve(event_id, *initiated_event_id)?;
                self.finish_running(event_id, call_id)?;
                self.record_timeout(call_id);
            }
            EventKind::StartChildWorkflowExecutionFailed { workflow_id, cause } => {
                let call_id = keys::parse_subworkflow_key(workflow_id)?;
                self.fail_schedule(event_id, call_id, cause)?;
            }
            EventKind::TimerStarted { timer_id } => {
                let call_id = keys::parse_timer_key(timer_id)?;
                self.snapshot.running.insert(CallKey::Timer(call_id));
            }
            EventKind::TimerFired { timer_id, .. } => {
                let call_id = keys::parse_timer_key(timer_id)?;
                if !self.snapshot.running.remove(&CallKey::Timer(call_id)) {
                    return Err(HistoryError::NotRunning {
                        event_id,
                        call: keys::timer_key(call_id),
                    });
                }
                self.ensure_unfinished(event_id, call_id)?;
                self.snapshot.results.insert(call_id, None);
            }
            EventKind::WorkflowExecutionStarted { .. } | EventKind::Other => {}
        }
        Ok(())
    }

    pub fn finish(self) -> Snapshot {
        self.snapshot
    }

    fn resolve(&self, event_id: u64, source_event_id: u64) -> Result<u64, HistoryError> {
        self.scheduled
            .get(&source_event_id)
            .copied()
            .ok_or(HistoryError::DanglingReference {
                event_id,
                source_event_id,
            })
    }

    fn finish_running(&mut self, event_id: u64, call_id: u64) -> Result<(), HistoryError> {
        if !self.snapshot.running.remove(&CallKey::Call(call_id)) {
            return Err(HistoryError::NotRunning {
                event_id,
                call: keys::activity_key(call_id),
            });
        }
        self.ensure_unfinished(event_id, call_id)
    }

    /// A schedule rejected by the service. It may or may not follow the
    /// scheduling event for the same id; either way the call stops running.
    fn fail_schedule(&mut self, event_id: u64, call_id: u64, cause: &str) -> Result<(), HistoryError> {
        self.ensure_unfinished(event_id, call_id)?;
        self.snapshot.running.remove(&CallKey::Call(call_id));
        self.record_error(call_id, cause.to_string());
        Ok(())
    }

    fn ensure_unfinished(&self, event_id: u64, call_id: u64) -> Result<(), HistoryError> {
        let s = &self.snapshot;
        if s.results.contains_key(&call_id) || s.errors.contains_key(&call_id) || s.timed_out.contains(&call_id) {
            return Err(HistoryError::DuplicateTerminal { event_id, call_id });
        }
        Ok(())
    }

    fn record_error(&mut self, call_id: u64, reason: String) {
        self.snapshot.errors.insert(call_id, reason);
        self.snapshot.order.push(call_id);
    }

    fn record_timeout(&mut self, call_id: u64) {
        self.snapshot.timed_out.insert(call_id);
        self.snapshot.order.push(call_id);
    }
}
