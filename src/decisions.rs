//! Outbound decisions and the per-round accumulator.

use crate::history::WorkflowType;
use crate::keys;
use crate::limits::truncate_reason;
use crate::proxy::{ActivityProxy, WorkflowProxy};
use crate::transport::Transport;
use crate::workflow::ChildPolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Registered type of an activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
    pub version: String,
}

/// One command in a decision response, tagged by `decisionType` on the wire.
/// Durations are whole seconds; `None` defers to the registered defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decisionType", rename_all_fields = "camelCase")]
pub enum Decision {
    ScheduleActivityTask {
        activity_id: String,
        activity_type: ActivityType,
        input: String,
        task_list: Option<String>,
        heartbeat_timeout: Option<u64>,
        schedule_to_close_timeout: Option<u64>,
        schedule_to_start_timeout: Option<u64>,
        start_to_close_timeout: Option<u64>,
    },
    StartChildWorkflowExecution {
        workflow_id: String,
        workflow_type: WorkflowType,
        input: String,
        task_list: Option<String>,
        execution_start_to_close_timeout: Option<u64>,
        task_start_to_close_timeout: Option<u64>,
    },
    StartTimer {
        timer_id: String,
        start_to_fire_timeout: u64,
    },
    CompleteWorkflowExecution {
        result: String,
    },
    FailWorkflowExecution {
        reason: String,
    },
    ContinueAsNewWorkflowExecution {
        input: String,
        tag_list: Vec<String>,
        task_list: Option<String>,
        task_start_to_close_timeout: Option<u64>,
        execution_start_to_close_timeout: Option<u64>,
        child_policy: Option<ChildPolicy>,
    },
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Decision::CompleteWorkflowExecution { .. }
                | Decision::FailWorkflowExecution { .. }
                | Decision::ContinueAsNewWorkflowExecution { .. }
        )
    }
}

/// Options carried into a continue-as-new command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartOptions {
    pub tags: Vec<String>,
    pub task_list: Option<String>,
    pub decision_duration: Option<u64>,
    pub workflow_duration: Option<u64>,
    pub child_policy: Option<ChildPolicy>,
}

/// Accumulates the decisions of one round and sends them exactly once.
///
/// Schedules beyond the rate limit are dropped without error; the affected
/// call ids stay unscheduled and are picked up again by a later round. A
/// terminal command replaces everything accumulated so far, and schedules
/// requested after it are ignored.
#[derive(Debug)]
pub struct Scheduler {
    token: String,
    rate_limit: Option<usize>,
    decisions: Vec<Decision>,
    terminal: bool,
    closed: bool,
}

impl Scheduler {
    pub fn new(token: impl Into<String>, rate_limit: Option<usize>) -> Self {
        Self {
            token: token.into(),
            rate_limit,
            decisions: Vec::new(),
            terminal: false,
            closed: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn schedule_activity(&mut self, call_id: u64, proxy: &ActivityProxy, input: String) -> bool {
        self.push(Decision::ScheduleActivityTask {
            activity_id: keys::activity_key(call_id),
            activity_type: ActivityType {
                name: proxy.name.clone(),
                version: proxy.version.clone(),
            },
            input,
            task_list: proxy.task_list.clone(),
            heartbeat_timeout: proxy.heartbeat,
            schedule_to_close_timeout: proxy.schedule_to_close,
            schedule_to_start_timeout: proxy.schedule_to_start,
            start_to_close_timeout: proxy.start_to_close,
        })
    }

    pub fn schedule_workflow(&mut self, call_id: u64, proxy: &WorkflowProxy, input: String) -> bool {
        self.push(Decision::StartChildWorkflowExecution {
            workflow_id: keys::subworkflow_key(call_id),
            workflow_type: WorkflowType {
                name: proxy.name.clone(),
                version: proxy.version.clone(),
            },
            input,
            task_list: proxy.task_list.clone(),
            execution_start_to_close_timeout: proxy.workflow_duration,
            task_start_to_close_timeout: proxy.decision_duration,
        })
    }

    pub fn schedule_timer(&mut self, call_id: u64, delay_secs: u64) -> bool {
        self.push(Decision::StartTimer {
            timer_id: keys::timer_key(call_id),
            start_to_fire_timeout: delay_secs,
        })
    }

    pub fn complete(&mut self, result: String) {
        self.replace(Decision::CompleteWorkflowExecution { result });
    }

    pub fn fail(&mut self, reason: &str) {
        self.replace(Decision::FailWorkflowExecution {
            reason: truncate_reason(reason),
        });
    }

    pub fn restart(&mut self, input: String, options: RestartOptions) {
        self.replace(Decision::ContinueAsNewWorkflowExecution {
            input,
            tag_list: options.tags,
            task_list: options.task_list,
            task_start_to_close_timeout: options.decision_duration,
            execution_start_to_close_timeout: options.workflow_duration,
            child_policy: options.child_policy,
        });
    }

    /// True when at least one command is waiting to be flushed.
    pub fn has_scheduled(&self) -> bool {
        !self.decisions.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Send the batch. Only the first call reaches the transport. A transport
    /// failure is logged and swallowed: the decision task times out on the
    /// service side and is delivered again.
    pub async fn flush(&mut self, transport: &dyn Transport) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        let decisions = std::mem::take(&mut self.decisions);
        let count = decisions.len();
        match transport.respond_decisions(&self.token, decisions).await {
            Ok(()) => {
                debug!(decisions = count, "decisions sent");
                true
            }
            Err(e) => {
                error!(error = %e, decisions = count, "Error while sending the decisions");
                false
            }
        }
    }

    fn push(&mut self, decision: Decision) -> bool {
        if self.terminal || self.closed {
            debug!(?decision, "round already decided; ignoring schedule");
            return false;
        }
        if let Some(limit) = self.rate_limit
            && self.decisions.len() >= limit
        {
            debug!(limit, "rate limit reached; deferring schedule to a later round");
            return false;
        }
        self.decisions.push(decision);
        true
    }

    fn replace(&mut self, decision: Decision) {
        if self.closed {
            return;
        }
        self.decisions.clear();
        self.decisions.push(decision);
        self.terminal = true;
    }
}
