//! The execution frame of one decision round.
//!
//! Workflow code runs start to finish on every round. Each proxy call is
//! answered from the snapshot through the [`ReplayCursor`]; calls with no
//! recorded outcome yet are handed to the [`Scheduler`] and report
//! [`CallResult::Pending`]. There is no suspension inside a round: code that
//! needs a pending value returns [`Interrupt::Suspend`] (usually through `?`
//! on [`Call::value`]) and the whole round ends.

use crate::codec::{Codec, Json};
use crate::cursor::{Lookup, ReplayCursor};
use crate::decisions::{Decision, RestartOptions, Scheduler};
use crate::error::ConfigError;
use crate::history::Snapshot;
use crate::proxy::{Invocation, Proxy};
use crate::workflow::WorkflowConfig;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use tracing::{debug, warn};

/// Why a call produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The remote work failed (or could not be scheduled) with this reason.
    Error(String),
    /// Every allowed attempt timed out.
    TimedOut,
    /// The input could not be encoded or the result could not be decoded.
    Codec(String),
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::Error(reason) => f.write_str(reason),
            CallFailure::TimedOut => f.write_str("timed out"),
            CallFailure::Codec(e) => f.write_str(e),
        }
    }
}

/// Three-valued outcome of a proxy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResult<T> {
    Found(T),
    Pending,
    Failed(CallFailure),
}

/// A proxy call bound to its position in the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call<T> {
    settled_id: Option<u64>,
    result: CallResult<T>,
}

impl<T> Call<T> {
    pub fn result(&self) -> &CallResult<T> {
        &self.result
    }

    pub fn into_result(self) -> CallResult<T> {
        self.result
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.result, CallResult::Pending)
    }

    /// Take the value, turning a pending call into a round suspension and a
    /// failed call into a workflow failure.
    pub fn value(self) -> Result<T, Interrupt> {
        match self.result {
            CallResult::Found(v) => Ok(v),
            CallResult::Pending => Err(Interrupt::Suspend),
            CallResult::Failed(f) => Err(Interrupt::Fail(f.to_string())),
        }
    }
}

/// Anything whose terminal arrival can be ranked.
pub trait Settled {
    /// Call id of the terminal attempt, if the call has finished.
    fn settled_id(&self) -> Option<u64>;
}

impl<T> Settled for Call<T> {
    fn settled_id(&self) -> Option<u64> {
        self.settled_id
    }
}

/// Proof that a restart command was recorded; only [`WorkflowContext::restart`]
/// creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRecorded(());

/// Early exit from workflow code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// A needed value is not available yet; end the round with the
    /// accumulated schedules.
    Suspend,
    /// Fail the workflow execution with this reason.
    Fail(String),
    /// Continue as new; the command is already recorded.
    Restart(RestartRecorded),
}

impl From<CallFailure> for Interrupt {
    fn from(f: CallFailure) -> Self {
        Interrupt::Fail(f.to_string())
    }
}

impl From<ConfigError> for Interrupt {
    fn from(e: ConfigError) -> Self {
        Interrupt::Fail(e.to_string())
    }
}

/// Overrides applied inside [`WorkflowContext::options`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub task_list: Option<String>,
    pub decision_duration: Option<u64>,
    pub workflow_duration: Option<u64>,
    pub tags: Option<Vec<String>>,
}

/// The single terminal action taken by a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Schedules (possibly none) were sent; wait for more history.
    Suspended { scheduled: usize },
    Completed { result: String },
    Failed { reason: String },
    Restarted { input: String },
}

impl RoundOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            RoundOutcome::Suspended { .. } => "suspended",
            RoundOutcome::Completed { .. } => "completed",
            RoundOutcome::Failed { .. } => "failed",
            RoundOutcome::Restarted { .. } => "restarted",
        }
    }
}

/// Execution frame handed to workflow code. Lives for one round.
pub struct WorkflowContext<'a> {
    snapshot: &'a Snapshot,
    cursor: ReplayCursor<'a>,
    scheduler: Scheduler,
    restart: RestartOptions,
    config: Option<&'a WorkflowConfig>,
}

impl<'a> WorkflowContext<'a> {
    pub fn new(snapshot: &'a Snapshot, scheduler: Scheduler, restart: RestartOptions) -> Self {
        Self {
            snapshot,
            cursor: ReplayCursor::new(snapshot),
            scheduler,
            restart,
            config: None,
        }
    }

    /// Make the dependencies configured on `config` reachable through
    /// [`WorkflowContext::dependency`].
    pub fn with_config(mut self, config: &'a WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Proxy configured under `dep_name`. The borrow is tied to the config,
    /// not the frame, so it can be passed straight to [`WorkflowContext::call`].
    pub fn dependency(&self, dep_name: &str) -> Result<&'a Proxy, ConfigError> {
        match self.config {
            Some(config) => config.dependency(dep_name),
            None => Err(ConfigError::UnknownDependency(dep_name.to_string())),
        }
    }

    /// Call a remote activity or sub-workflow.
    pub fn call<T, I, P>(&mut self, proxy: &P, input: &I) -> Call<T>
    where
        T: DeserializeOwned,
        I: Serialize + ?Sized,
        P: Invocation + ?Sized,
    {
        let desc = proxy.describe();
        let lookup = self.cursor.resolve(desc.retry, desc.delay);
        match lookup {
            Lookup::TimerNotFound { timer_id } => {
                self.scheduler.schedule_timer(timer_id, desc.delay);
                pending()
            }
            Lookup::TimerRunning | Lookup::Running => pending(),
            Lookup::NotFound { call_id } => match Json::encode(input) {
                Ok(encoded) => {
                    if !proxy.schedule(&mut self.scheduler, call_id, encoded) {
                        debug!(call_id, name = desc.name, "schedule not accepted this round");
                    }
                    pending()
                }
                Err(e) => {
                    warn!(call_id, name = desc.name, error = %e, "Error while serializing call input");
                    Call {
                        settled_id: None,
                        result: CallResult::Failed(CallFailure::Codec(e)),
                    }
                }
            },
            Lookup::Found { call_id, payload } => {
                let raw = payload.as_deref().unwrap_or("null");
                let result = match Json::decode(raw) {
                    Ok(v) => CallResult::Found(v),
                    Err(e) => {
                        warn!(call_id, name = desc.name, error = %e, "Error while decoding call result");
                        CallResult::Failed(CallFailure::Codec(e))
                    }
                };
                Call {
                    settled_id: Some(call_id),
                    result,
                }
            }
            Lookup::Failed { call_id, reason } => Call {
                settled_id: Some(call_id),
                result: CallResult::Failed(CallFailure::Error(reason)),
            },
            Lookup::Exhausted { call_id } => Call {
                settled_id: Some(call_id),
                result: CallResult::Failed(CallFailure::TimedOut),
            },
        }
    }

    /// Indices of the settled `calls`, ordered by terminal arrival. Pending
    /// calls are left out.
    pub fn finish_order(&self, calls: &[&dyn Settled]) -> Vec<usize> {
        let mut ranked: Vec<(usize, usize)> = calls
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| {
                c.settled_id()
                    .map(|id| (self.snapshot.arrival(id).unwrap_or(usize::MAX), idx))
            })
            .collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, idx)| idx).collect()
    }

    /// Record a continue-as-new with `input`, discarding everything
    /// scheduled so far. Return the interrupt from the workflow.
    pub fn restart<I: Serialize + ?Sized>(&mut self, input: &I) -> Interrupt {
        match Json::encode(input) {
            Ok(encoded) => {
                self.scheduler.restart(encoded, self.restart.clone());
                Interrupt::Restart(RestartRecorded(()))
            }
            Err(e) => {
                warn!(error = %e, "Error while serializing restart input");
                Interrupt::Fail(e)
            }
        }
    }

    /// Run `f` with overridden restart options, restoring them afterwards.
    pub fn options<R>(&mut self, overrides: ExecutionOptions, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.restart.clone();
        if let Some(task_list) = overrides.task_list {
            self.restart.task_list = Some(task_list);
        }
        if let Some(secs) = overrides.decision_duration {
            self.restart.decision_duration = Some(secs);
        }
        if let Some(secs) = overrides.workflow_duration {
            self.restart.workflow_duration = Some(secs);
        }
        if let Some(tags) = overrides.tags {
            self.restart.tags = tags;
        }
        let out = f(self);
        self.restart = saved;
        out
    }

    pub fn tags(&self) -> &[String] {
        &self.restart.tags
    }

    /// Next call id the cursor will hand out.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn has_scheduled(&self) -> bool {
        self.scheduler.has_scheduled()
    }

    /// Apply the round algorithm to the workflow's return and hand back the
    /// scheduler holding the single batch to flush.
    pub fn conclude(self, returned: Result<String, Interrupt>) -> (RoundOutcome, Scheduler) {
        let WorkflowContext {
            snapshot,
            mut scheduler,
            ..
        } = self;

        if scheduler.is_terminal() {
            let outcome = match scheduler.decisions().first() {
                Some(Decision::ContinueAsNewWorkflowExecution { input, .. }) => {
                    RoundOutcome::Restarted { input: input.clone() }
                }
                Some(Decision::FailWorkflowExecution { reason }) => RoundOutcome::Failed { reason: reason.clone() },
                Some(Decision::CompleteWorkflowExecution { result }) => {
                    RoundOutcome::Completed { result: result.clone() }
                }
                _ => RoundOutcome::Suspended {
                    scheduled: scheduler.decisions().len(),
                },
            };
            return (outcome, scheduler);
        }

        let outcome = match returned {
            Ok(result) if !scheduler.has_scheduled() && !snapshot.has_running() => {
                scheduler.complete(result.clone());
                RoundOutcome::Completed { result }
            }
            Ok(_) | Err(Interrupt::Suspend) | Err(Interrupt::Restart(_)) => RoundOutcome::Suspended {
                scheduled: scheduler.decisions().len(),
            },
            Err(Interrupt::Fail(reason)) => {
                scheduler.fail(&reason);
                let reason = match scheduler.decisions().first() {
                    Some(Decision::FailWorkflowExecution { reason }) => reason.clone(),
                    _ => reason,
                };
                RoundOutcome::Failed { reason }
            }
        };
        (outcome, scheduler)
    }
}

fn pending<T>() -> Call<T> {
    Call {
        settled_id: None,
        result: CallResult::Pending,
    }
}
