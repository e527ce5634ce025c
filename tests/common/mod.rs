#![allow(dead_code)]

use replayflow::{
    Decision, DecisionTask, Event, EventKind, RoundOutcome, Workflow, WorkflowConfig, WorkflowType, execute_round,
};
use std::collections::HashMap;

/// Builds well-formed histories event by event.
pub struct HistoryBuilder {
    events: Vec<Event>,
    scheduled: HashMap<u64, u64>,
    timers: HashMap<u64, u64>,
    children: HashMap<u64, (u64, String)>,
}

impl HistoryBuilder {
    pub fn started(name: &str, version: &str, input: Option<&str>) -> Self {
        let mut b = Self {
            events: Vec::new(),
            scheduled: HashMap::new(),
            timers: HashMap::new(),
            children: HashMap::new(),
        };
        b.push(EventKind::WorkflowExecutionStarted {
            workflow_type: WorkflowType {
                name: name.into(),
                version: version.into(),
            },
            input: input.map(str::to_string),
            task_list: "main".into(),
            task_start_to_close_timeout: Some(600),
            execution_start_to_close_timeout: Some(3600),
            tag_list: vec!["tag".into()],
            child_policy: None,
        });
        b
    }

    fn push(&mut self, kind: EventKind) -> u64 {
        let id = self.events.len() as u64 + 1;
        self.events.push(Event::new(id, kind));
        id
    }

    pub fn schedule_activity(mut self, call_id: u64) -> Self {
        let id = self.push(EventKind::ActivityTaskScheduled {
            activity_id: call_id.to_string(),
        });
        self.scheduled.insert(call_id, id);
        self
    }

    pub fn complete_activity(mut self, call_id: u64, result: &str) -> Self {
        let scheduled_event_id = self.scheduled[&call_id];
        self.push(EventKind::ActivityTaskCompleted {
            scheduled_event_id,
            result: Some(result.into()),
        });
        self
    }

    pub fn fail_activity(mut self, call_id: u64, reason: &str) -> Self {
        let scheduled_event_id = self.scheduled[&call_id];
        self.push(EventKind::ActivityTaskFailed {
            scheduled_event_id,
            reason: Some(reason.into()),
        });
        self
    }

    pub fn time_out_activity(mut self, call_id: u64) -> Self {
        let scheduled_event_id = self.scheduled[&call_id];
        self.push(EventKind::ActivityTaskTimedOut {
            scheduled_event_id,
            timeout_type: Some("START_TO_CLOSE".into()),
        });
        self
    }

    pub fn start_timer(mut self, call_id: u64) -> Self {
        let id = self.push(EventKind::TimerStarted {
            timer_id: format!("{call_id}:t"),
        });
        self.timers.insert(call_id, id);
        self
    }

    pub fn fire_timer(mut self, call_id: u64) -> Self {
        let started_event_id = self.timers[&call_id];
        self.push(EventKind::TimerFired {
            timer_id: format!("{call_id}:t"),
            started_event_id,
        });
        self
    }

    pub fn initiate_child(mut self, call_id: u64) -> Self {
        let workflow_id = format!("2f1c8f9e-4a7b-4d0e-9c55-8d1e0f6a7b3c-{call_id}");
        let id = self.push(EventKind::StartChildWorkflowExecutionInitiated {
            workflow_id: workflow_id.clone(),
        });
        self.children.insert(call_id, (id, workflow_id));
        self
    }

    pub fn complete_child(mut self, call_id: u64, result: &str) -> Self {
        let (initiated_event_id, workflow_id) = self.children[&call_id].clone();
        self.push(EventKind::ChildWorkflowExecutionCompleted {
            initiated_event_id,
            workflow_id,
            result: Some(result.into()),
        });
        self
    }

    pub fn cancel_activity(mut self, call_id: u64) -> Self {
        let scheduled_event_id = self.scheduled[&call_id];
        self.push(EventKind::ActivityTaskCanceled { scheduled_event_id });
        self
    }

    /// Rejected schedule. Follows the scheduling event when there is one.
    pub fn fail_activity_schedule(mut self, call_id: u64, cause: &str) -> Self {
        self.push(EventKind::ScheduleActivityTaskFailed {
            activity_id: call_id.to_string(),
            cause: cause.into(),
        });
        self
    }

    pub fn fail_child(mut self, call_id: u64, reason: &str) -> Self {
        let (initiated_event_id, workflow_id) = self.children[&call_id].clone();
        self.push(EventKind::ChildWorkflowExecutionFailed {
            initiated_event_id,
            workflow_id,
            reason: Some(reason.into()),
        });
        self
    }

    pub fn time_out_child(mut self, call_id: u64) -> Self {
        let (initiated_event_id, workflow_id) = self.children[&call_id].clone();
        self.push(EventKind::ChildWorkflowExecutionTimedOut {
            initiated_event_id,
            workflow_id,
        });
        self
    }

    pub fn cancel_child(mut self, call_id: u64) -> Self {
        let (initiated_event_id, workflow_id) = self.children[&call_id].clone();
        self.push(EventKind::ChildWorkflowExecutionCanceled {
            initiated_event_id,
            workflow_id,
        });
        self
    }

    pub fn terminate_child(mut self, call_id: u64) -> Self {
        let (initiated_event_id, workflow_id) = self.children[&call_id].clone();
        self.push(EventKind::ChildWorkflowExecutionTerminated {
            initiated_event_id,
            workflow_id,
        });
        self
    }

    /// Child start rejected after its initiation.
    pub fn fail_child_start(mut self, call_id: u64, cause: &str) -> Self {
        let (_, workflow_id) = self.children[&call_id].clone();
        self.push(EventKind::StartChildWorkflowExecutionFailed {
            workflow_id,
            cause: cause.into(),
        });
        self
    }

    pub fn build(self) -> Vec<Event> {
        self.events
    }
}

pub fn task(events: Vec<Event>) -> DecisionTask {
    DecisionTask::from_history("token-1", events).unwrap()
}

/// Run one round and return its outcome with the decisions it would flush.
pub fn round(workflow: &dyn Workflow, config: &WorkflowConfig, events: Vec<Event>) -> (RoundOutcome, Vec<Decision>) {
    let (outcome, scheduler) = execute_round(workflow, config, &task(events));
    (outcome, scheduler.decisions().to_vec())
}

/// Activity ids of the schedule commands, in order.
pub fn activity_ids(decisions: &[Decision]) -> Vec<String> {
    decisions
        .iter()
        .filter_map(|d| match d {
            Decision::ScheduleActivityTask { activity_id, .. } => Some(activity_id.clone()),
            _ => None,
        })
        .collect()
}

/// Call-id suffixes of the child start commands, in order.
pub fn child_ids(decisions: &[Decision]) -> Vec<String> {
    decisions
        .iter()
        .filter_map(|d| match d {
            Decision::StartChildWorkflowExecution { workflow_id, .. } => {
                workflow_id.rsplit('-').next().map(str::to_string)
            }
            _ => None,
        })
        .collect()
}

pub fn timer_ids(decisions: &[Decision]) -> Vec<String> {
    decisions
        .iter()
        .filter_map(|d| match d {
            Decision::StartTimer { timer_id, .. } => Some(timer_id.clone()),
            _ => None,
        })
        .collect()
}
