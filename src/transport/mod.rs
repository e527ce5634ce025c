use crate::decisions::{ActivityType, Decision};
use crate::error::TransportError;
use crate::history::{Event, WorkflowType};
use crate::workflow::ChildPolicy;
use serde::{Deserialize, Serialize};

/// One page of a decision task's history.
///
/// An empty `task_token` means the long poll returned without work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPage {
    #[serde(default)]
    pub task_token: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl DecisionPage {
    pub fn has_task(&self) -> bool {
        self.task_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Registered defaults of a workflow type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTypeDefaults {
    pub task_list: Option<String>,
    pub decision_duration: Option<u64>,
    pub workflow_duration: Option<u64>,
    pub child_policy: Option<ChildPolicy>,
}

/// Registered defaults of an activity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTypeDefaults {
    pub task_list: Option<String>,
    pub heartbeat: Option<u64>,
    pub schedule_to_close: Option<u64>,
    pub schedule_to_start: Option<u64>,
    pub start_to_close: Option<u64>,
}

/// Outcome of a type registration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

/// Client of the remote task-coordination service, bound to one domain.
///
/// The decider only needs a handful of calls: long-poll decision tasks and
/// page through their history, answer them, register types at startup, and
/// report activity progress. Implementations classify their failures with
/// [`TransportError::is_retryable`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Long-poll the first page of the next decision task on `task_list`.
    async fn poll_for_decision(&self, task_list: &str, identity: &str) -> Result<DecisionPage, TransportError>;

    /// Fetch a follow-up history page of the current decision task.
    async fn poll_history_page(
        &self,
        task_list: &str,
        identity: &str,
        next_page_token: &str,
    ) -> Result<DecisionPage, TransportError>;

    /// Answer a decision task.
    async fn respond_decisions(&self, task_token: &str, decisions: Vec<Decision>) -> Result<(), TransportError>;

    async fn register_workflow_type(
        &self,
        workflow_type: &WorkflowType,
        defaults: &WorkflowTypeDefaults,
    ) -> Result<Registration, TransportError>;

    async fn describe_workflow_type(&self, workflow_type: &WorkflowType) -> Result<WorkflowTypeDefaults, TransportError>;

    async fn register_activity_type(
        &self,
        activity_type: &ActivityType,
        defaults: &ActivityTypeDefaults,
    ) -> Result<Registration, TransportError>;

    async fn describe_activity_type(&self, activity_type: &ActivityType) -> Result<ActivityTypeDefaults, TransportError>;

    async fn respond_activity_completed(&self, task_token: &str, result: &str) -> Result<(), TransportError>;

    async fn respond_activity_failed(&self, task_token: &str, reason: &str) -> Result<(), TransportError>;

    async fn record_activity_heartbeat(&self, task_token: &str) -> Result<(), TransportError>;
}

/// Scripted in-memory transport for tests and local development.
pub mod in_memory;
