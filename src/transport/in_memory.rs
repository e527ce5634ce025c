use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{ActivityTypeDefaults, DecisionPage, Registration, Transport, WorkflowTypeDefaults};
use crate::decisions::{ActivityType, Decision};
use crate::error::TransportError;
use crate::history::{Event, WorkflowType};

const EMPTY_POLL_DELAY: Duration = Duration::from_millis(10);

/// Report sent by an activity worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityReport {
    Completed { token: String, result: String },
    Failed { token: String, reason: String },
    Heartbeat { token: String },
}

/// Transport double driven by scripted histories.
///
/// Decision polls pop from a FIFO; an empty FIFO behaves like a long poll
/// that timed out. Follow-up pages are looked up by their page token.
/// Failures can be injected per operation family.
#[derive(Default)]
pub struct InMemoryTransport {
    polls: Mutex<VecDeque<Result<DecisionPage, TransportError>>>,
    pages: Mutex<HashMap<String, DecisionPage>>,
    page_failures: Mutex<u32>,
    page_fetches: Mutex<u32>,
    responses: Mutex<Vec<(String, Vec<Decision>)>>,
    response_failures: Mutex<u32>,
    workflow_types: Mutex<HashMap<WorkflowType, WorkflowTypeDefaults>>,
    activity_types: Mutex<HashMap<ActivityType, ActivityTypeDefaults>>,
    registration_failures: Mutex<u32>,
    activity_reports: Mutex<Vec<ActivityReport>>,
    report_failures: Mutex<u32>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decrement an injected failure budget; true when a failure is due.
fn take_failure(budget: &Mutex<u32>) -> bool {
    let mut g = lock(budget);
    if *g > 0 {
        *g -= 1;
        true
    } else {
        false
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a decision task whose history is split into pages of
    /// `page_size` events.
    pub fn push_history(&self, token: &str, events: Vec<Event>, page_size: usize) {
        let page_size = page_size.max(1);
        let chunks: Vec<Vec<Event>> = if events.is_empty() {
            vec![Vec::new()]
        } else {
            events.chunks(page_size).map(<[Event]>::to_vec).collect()
        };
        let total = chunks.len();
        let page_token = |i: usize| (i < total).then(|| format!("{token}#{i}"));

        let mut pages = lock(&self.pages);
        let mut first = None;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let page = DecisionPage {
                task_token: Some(token.to_string()),
                events: chunk,
                next_page_token: page_token(i + 1),
            };
            if i == 0 {
                first = Some(page);
            } else {
                pages.insert(format!("{token}#{i}"), page);
            }
        }
        drop(pages);
        if let Some(page) = first {
            lock(&self.polls).push_back(Ok(page));
        }
    }

    /// Queue an error for the next decision poll.
    pub fn push_poll_error(&self, error: TransportError) {
        lock(&self.polls).push_back(Err(error));
    }

    /// Number of decision polls still queued.
    pub fn pending_polls(&self) -> usize {
        lock(&self.polls).len()
    }

    /// Fail the next `n` follow-up page fetches with a retryable error.
    pub fn fail_next_pages(&self, n: u32) {
        *lock(&self.page_failures) += n;
    }

    /// Total follow-up page fetch attempts, failed ones included.
    pub fn page_fetches(&self) -> u32 {
        *lock(&self.page_fetches)
    }

    pub fn fail_next_responses(&self, n: u32) {
        *lock(&self.response_failures) += n;
    }

    /// Decision responses received so far, in order.
    pub fn responses(&self) -> Vec<(String, Vec<Decision>)> {
        lock(&self.responses).clone()
    }

    pub fn fail_next_registrations(&self, n: u32) {
        *lock(&self.registration_failures) += n;
    }

    /// Seed a workflow type as if registered by another process.
    pub fn seed_workflow_type(&self, workflow_type: WorkflowType, defaults: WorkflowTypeDefaults) {
        lock(&self.workflow_types).insert(workflow_type, defaults);
    }

    pub fn seed_activity_type(&self, activity_type: ActivityType, defaults: ActivityTypeDefaults) {
        lock(&self.activity_types).insert(activity_type, defaults);
    }

    pub fn workflow_type_defaults(&self, workflow_type: &WorkflowType) -> Option<WorkflowTypeDefaults> {
        lock(&self.workflow_types).get(workflow_type).cloned()
    }

    pub fn activity_type_defaults(&self, activity_type: &ActivityType) -> Option<ActivityTypeDefaults> {
        lock(&self.activity_types).get(activity_type).cloned()
    }

    pub fn fail_next_activity_reports(&self, n: u32) {
        *lock(&self.report_failures) += n;
    }

    pub fn activity_reports(&self) -> Vec<ActivityReport> {
        lock(&self.activity_reports).clone()
    }

    fn report(&self, operation: &str, report: ActivityReport) -> Result<(), TransportError> {
        if take_failure(&self.report_failures) {
            return Err(TransportError::retryable(operation, "injected failure"));
        }
        lock(&self.activity_reports).push(report);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryTransport {
    async fn poll_for_decision(&self, _task_list: &str, _identity: &str) -> Result<DecisionPage, TransportError> {
        let next = lock(&self.polls).pop_front();
        match next {
            Some(page) => page,
            None => {
                tokio::time::sleep(EMPTY_POLL_DELAY).await;
                Ok(DecisionPage::default())
            }
        }
    }

    async fn poll_history_page(
        &self,
        _task_list: &str,
        _identity: &str,
        next_page_token: &str,
    ) -> Result<DecisionPage, TransportError> {
        *lock(&self.page_fetches) += 1;
        if take_failure(&self.page_failures) {
            return Err(TransportError::retryable("poll_history_page", "injected failure"));
        }
        lock(&self.pages)
            .remove(next_page_token)
            .ok_or_else(|| TransportError::permanent("poll_history_page", format!("unknown page token: {next_page_token}")))
    }

    async fn respond_decisions(&self, task_token: &str, decisions: Vec<Decision>) -> Result<(), TransportError> {
        if take_failure(&self.response_failures) {
            return Err(TransportError::retryable("respond_decisions", "injected failure"));
        }
        lock(&self.responses).push((task_token.to_string(), decisions));
        Ok(())
    }

    async fn register_workflow_type(
        &self,
        workflow_type: &WorkflowType,
        defaults: &WorkflowTypeDefaults,
    ) -> Result<Registration, TransportError> {
        if take_failure(&self.registration_failures) {
            return Err(TransportError::retryable("register_workflow_type", "injected failure"));
        }
        let mut types = lock(&self.workflow_types);
        if types.contains_key(workflow_type) {
            return Ok(Registration::AlreadyExists);
        }
        types.insert(workflow_type.clone(), defaults.clone());
        Ok(Registration::Created)
    }

    async fn describe_workflow_type(&self, workflow_type: &WorkflowType) -> Result<WorkflowTypeDefaults, TransportError> {
        lock(&self.workflow_types).get(workflow_type).cloned().ok_or_else(|| {
            TransportError::permanent(
                "describe_workflow_type",
                format!("unknown type: {}@{}", workflow_type.name, workflow_type.version),
            )
        })
    }

    async fn register_activity_type(
        &self,
        activity_type: &ActivityType,
        defaults: &ActivityTypeDefaults,
    ) -> Result<Registration, TransportError> {
        if take_failure(&self.registration_failures) {
            return Err(TransportError::retryable("register_activity_type", "injected failure"));
        }
        let mut types = lock(&self.activity_types);
        if types.contains_key(activity_type) {
            return Ok(Registration::AlreadyExists);
        }
        types.insert(activity_type.clone(), defaults.clone());
        Ok(Registration::Created)
    }

    async fn describe_activity_type(&self, activity_type: &ActivityType) -> Result<ActivityTypeDefaults, TransportError> {
        lock(&self.activity_types).get(activity_type).cloned().ok_or_else(|| {
            TransportError::permanent(
                "describe_activity_type",
                format!("unknown type: {}@{}", activity_type.name, activity_type.version),
            )
        })
    }

    async fn respond_activity_completed(&self, task_token: &str, result: &str) -> Result<(), TransportError> {
        self.report(
            "respond_activity_completed",
            ActivityReport::Completed {
                token: task_token.to_string(),
                result: result.to_string(),
            },
        )
    }

    async fn respond_activity_failed(&self, task_token: &str, reason: &str) -> Result<(), TransportError> {
        self.report(
            "respond_activity_failed",
            ActivityReport::Failed {
                token: task_token.to_string(),
                reason: reason.to_string(),
            },
        )
    }

    async fn record_activity_heartbeat(&self, task_token: &str) -> Result<(), TransportError> {
        self.report(
            "record_activity_heartbeat",
            ActivityReport::Heartbeat {
                token: task_token.to_string(),
            },
        )
    }
}
