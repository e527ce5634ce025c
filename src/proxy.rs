//! Static descriptors of remote calls.
//!
//! A proxy only describes *what* to call; it is bound to a round when a
//! workflow passes it to [`WorkflowContext::call`](crate::WorkflowContext::call).

use crate::decisions::Scheduler;

/// Kind of remote work behind a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Activity,
    SubWorkflow,
}

/// Read-only summary used by the execution frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'a> {
    pub kind: CallKind,
    pub name: &'a str,
    pub version: &'a str,
    /// Additional attempts allowed after a timed-out attempt.
    pub retry: u32,
    /// Seconds to wait before the first attempt; zero means no delay.
    pub delay: u64,
}

/// Capability shared by every proxy kind.
pub trait Invocation {
    fn describe(&self) -> Descriptor<'_>;

    /// Record the schedule command for attempt `call_id`. Returns `false`
    /// when the scheduler did not accept it.
    fn schedule(&self, scheduler: &mut Scheduler, call_id: u64, input: String) -> bool;
}

/// Activity call descriptor. Timeouts are seconds; `None` uses the
/// activity type's registered defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityProxy {
    pub name: String,
    pub version: String,
    pub task_list: Option<String>,
    pub heartbeat: Option<u64>,
    pub schedule_to_close: Option<u64>,
    pub schedule_to_start: Option<u64>,
    pub start_to_close: Option<u64>,
    pub retry: u32,
    pub delay: u64,
}

impl ActivityProxy {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            task_list: None,
            heartbeat: None,
            schedule_to_close: None,
            schedule_to_start: None,
            start_to_close: None,
            retry: 0,
            delay: 0,
        }
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat = Some(secs);
        self
    }

    pub fn with_schedule_to_close(mut self, secs: u64) -> Self {
        self.schedule_to_close = Some(secs);
        self
    }

    pub fn with_schedule_to_start(mut self, secs: u64) -> Self {
        self.schedule_to_start = Some(secs);
        self
    }

    pub fn with_start_to_close(mut self, secs: u64) -> Self {
        self.start_to_close = Some(secs);
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_delay(mut self, secs: u64) -> Self {
        self.delay = secs;
        self
    }
}

impl Invocation for ActivityProxy {
    fn describe(&self) -> Descriptor<'_> {
        Descriptor {
            kind: CallKind::Activity,
            name: &self.name,
            version: &self.version,
            retry: self.retry,
            delay: self.delay,
        }
    }

    fn schedule(&self, scheduler: &mut Scheduler, call_id: u64, input: String) -> bool {
        scheduler.schedule_activity(call_id, self, input)
    }
}

/// Sub-workflow call descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowProxy {
    pub name: String,
    pub version: String,
    pub task_list: Option<String>,
    pub workflow_duration: Option<u64>,
    pub decision_duration: Option<u64>,
    pub retry: u32,
    pub delay: u64,
}

impl WorkflowProxy {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            task_list: None,
            workflow_duration: None,
            decision_duration: None,
            retry: 0,
            delay: 0,
        }
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn with_workflow_duration(mut self, secs: u64) -> Self {
        self.workflow_duration = Some(secs);
        self
    }

    pub fn with_decision_duration(mut self, secs: u64) -> Self {
        self.decision_duration = Some(secs);
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_delay(mut self, secs: u64) -> Self {
        self.delay = secs;
        self
    }
}

impl Invocation for WorkflowProxy {
    fn describe(&self) -> Descriptor<'_> {
        Descriptor {
            kind: CallKind::SubWorkflow,
            name: &self.name,
            version: &self.version,
            retry: self.retry,
            delay: self.delay,
        }
    }

    fn schedule(&self, scheduler: &mut Scheduler, call_id: u64, input: String) -> bool {
        scheduler.schedule_workflow(call_id, self, input)
    }
}

/// Either proxy kind, as stored in a workflow's dependency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proxy {
    Activity(ActivityProxy),
    SubWorkflow(WorkflowProxy),
}

impl Invocation for Proxy {
    fn describe(&self) -> Descriptor<'_> {
        match self {
            Proxy::Activity(p) => p.describe(),
            Proxy::SubWorkflow(p) => p.describe(),
        }
    }

    fn schedule(&self, scheduler: &mut Scheduler, call_id: u64, input: String) -> bool {
        match self {
            Proxy::Activity(p) => p.schedule(scheduler, call_id, input),
            Proxy::SubWorkflow(p) => p.schedule(scheduler, call_id, input),
        }
    }
}

impl From<ActivityProxy> for Proxy {
    fn from(p: ActivityProxy) -> Self {
        Proxy::Activity(p)
    }
}

impl From<WorkflowProxy> for Proxy {
    fn from(p: WorkflowProxy) -> Self {
        Proxy::SubWorkflow(p)
    }
}
