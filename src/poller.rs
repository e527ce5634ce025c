//! Decision task polling and history pagination.

use crate::decisions::{RestartOptions, Scheduler};
use crate::error::{HistoryError, TransportError};
use crate::history::{Event, EventKind, WorkflowType};
use crate::limits::PAGE_FETCH_ATTEMPTS;
use crate::transport::{DecisionPage, Transport};
use crate::workflow::ChildPolicy;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Everything a round needs, extracted from one fully paginated poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionTask {
    pub token: String,
    pub workflow_type: WorkflowType,
    pub input: Option<String>,
    pub task_list: String,
    pub decision_duration: Option<u64>,
    pub workflow_duration: Option<u64>,
    pub tags: Vec<String>,
    pub child_policy: Option<ChildPolicy>,
    pub events: Vec<Event>,
}

impl DecisionTask {
    /// Build the round input from the full history. The first event must be
    /// the execution start.
    pub fn from_history(token: impl Into<String>, events: Vec<Event>) -> Result<Self, HistoryError> {
        let first = events.first().ok_or(HistoryError::Empty)?;
        let EventKind::WorkflowExecutionStarted {
            workflow_type,
            input,
            task_list,
            task_start_to_close_timeout,
            execution_start_to_close_timeout,
            tag_list,
            child_policy,
        } = &first.kind
        else {
            return Err(HistoryError::MissingStart(first.kind.type_name().to_string()));
        };
        Ok(Self {
            token: token.into(),
            workflow_type: workflow_type.clone(),
            input: input.clone(),
            task_list: task_list.clone(),
            decision_duration: *task_start_to_close_timeout,
            workflow_duration: *execution_start_to_close_timeout,
            tags: tag_list.clone(),
            child_policy: *child_policy,
            events,
        })
    }

    /// Reject a task whose execution was started on another task list.
    pub fn ensure_task_list(self, polled: &str) -> Result<Self, HistoryError> {
        if self.task_list != polled {
            return Err(HistoryError::ForeignTaskList {
                polled: polled.to_string(),
                started: self.task_list,
            });
        }
        Ok(self)
    }

    /// Options a continue-as-new carries forward by default.
    pub fn restart_options(&self) -> RestartOptions {
        RestartOptions {
            tags: self.tags.clone(),
            task_list: Some(self.task_list.clone()),
            decision_duration: self.decision_duration,
            workflow_duration: self.workflow_duration,
            child_policy: self.child_policy,
        }
    }
}

/// Polling parameters.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub task_list: String,
    pub identity: String,
    /// Attempts per follow-up history page before the poll is redone.
    pub page_attempts: u32,
    /// Base delay between failed transport calls; doubled per consecutive
    /// failure.
    pub error_backoff: Duration,
}

impl PollOptions {
    pub fn new(task_list: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            task_list: task_list.into(),
            identity: identity.into(),
            page_attempts: PAGE_FETCH_ATTEMPTS,
            error_backoff: Duration::from_millis(100),
        }
    }
}

enum PollFailure {
    Transport(TransportError),
    PaginationExhausted { token: String, last: TransportError },
}

fn backoff(base: Duration, attempts: u32) -> Duration {
    base.saturating_mul(1 << attempts.min(5))
}

/// Block until a decision task with a complete, well-formed history is
/// available.
///
/// Transport errors on the first page are retried indefinitely with
/// backoff. A follow-up page that keeps failing abandons the whole poll and
/// starts over. A history that does not begin with the execution start, or
/// whose start names another task list, is answered with a failure decision
/// and polling continues.
pub async fn poll_next_decision(transport: &dyn Transport, options: &PollOptions) -> DecisionTask {
    let mut failures: u32 = 0;
    loop {
        let (token, events) = match poll_full_history(transport, options).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                failures = 0;
                continue;
            }
            Err(PollFailure::Transport(e)) => {
                let delay = backoff(options.error_backoff, failures);
                warn!(
                    task_list = %options.task_list,
                    retryable = e.is_retryable(),
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "decision poll failed; retrying"
                );
                failures = failures.saturating_add(1);
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(PollFailure::PaginationExhausted { token, last }) => {
                warn!(
                    task_list = %options.task_list,
                    token = %token,
                    attempts = options.page_attempts,
                    error = %last,
                    "history pagination exhausted; restarting poll"
                );
                continue;
            }
        };
        failures = 0;

        match DecisionTask::from_history(token.clone(), events).and_then(|t| t.ensure_task_list(&options.task_list)) {
            Ok(task) => {
                debug!(
                    task_list = %options.task_list,
                    workflow = %task.workflow_type.name,
                    version = %task.workflow_type.version,
                    events = task.events.len(),
                    "decision task received"
                );
                return task;
            }
            Err(e) => {
                error!(task_list = %options.task_list, error = %e, "Error while reading the execution start");
                let mut scheduler = Scheduler::new(token, None);
                scheduler.fail(&format!("history: {e}"));
                scheduler.flush(transport).await;
            }
        }
    }
}

/// One poll: the first page plus every follow-up page. `None` when the long
/// poll returned without a task.
async fn poll_full_history(
    transport: &dyn Transport,
    options: &PollOptions,
) -> Result<Option<(String, Vec<Event>)>, PollFailure> {
    let first = transport
        .poll_for_decision(&options.task_list, &options.identity)
        .await
        .map_err(PollFailure::Transport)?;
    if !first.has_task() {
        return Ok(None);
    }
    let token = first.task_token.unwrap_or_default();
    let mut events = first.events;
    let mut next = first.next_page_token;

    while let Some(page_token) = next.take().filter(|t| !t.is_empty()) {
        let page = fetch_page(transport, options, &page_token)
            .await
            .map_err(|last| PollFailure::PaginationExhausted {
                token: token.clone(),
                last,
            })?;
        events.extend(page.events);
        next = page.next_page_token;
    }
    Ok(Some((token, events)))
}

async fn fetch_page(
    transport: &dyn Transport,
    options: &PollOptions,
    page_token: &str,
) -> Result<DecisionPage, TransportError> {
    let mut attempt: u32 = 0;
    loop {
        match transport
            .poll_history_page(&options.task_list, &options.identity, page_token)
            .await
        {
            Ok(page) => return Ok(page),
            Err(e) => {
                attempt += 1;
                if attempt >= options.page_attempts.max(1) {
                    return Err(e);
                }
                warn!(attempt, error = %e, "history page fetch failed; retrying");
                tokio::time::sleep(backoff(options.error_backoff, attempt - 1)).await;
            }
        }
    }
}
