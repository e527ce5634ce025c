//! Deterministic workflow decider on top of a remote task-coordination
//! service.
//!
//! The service keeps the history of every workflow execution. Each decision
//! round, a worker polls one execution's history, replays the workflow code
//! against it from the start, and answers with a batch of decisions: new
//! activities, sub-workflows and timers to schedule, or a single terminal
//! command (complete, fail, continue as new). Because call ids are allocated
//! deterministically, replayed code lands on the same ids at the same call
//! sites and finds the outcomes recorded for them.
//!
//! ```rust,no_run
//! use replayflow::{ActivityProxy, FnWorkflow, Interrupt, WorkflowConfig, WorkflowContext, WorkflowRegistry};
//! use serde_json::{Value, json};
//!
//! fn double_then_add(ctx: &mut WorkflowContext<'_>, input: Value) -> Result<Value, Interrupt> {
//!     let double = ActivityProxy::new("double", "1").with_retry(2);
//!     let doubled: i64 = ctx.call(&double, &input).value()?;
//!     Ok(json!(doubled + 1))
//! }
//!
//! # fn main() -> Result<(), replayflow::ConfigError> {
//! let registry = WorkflowRegistry::builder()
//!     .register(WorkflowConfig::named("DoubleThenAdd", "1"), FnWorkflow(double_then_add))
//!     .build()?;
//! assert!(registry.has("DoubleThenAdd", "1"));
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod codec;
pub mod context;
pub mod cursor;
pub mod decisions;
pub mod error;
pub mod history;
pub mod keys;
pub mod limits;
pub mod logging;
pub mod poller;
pub mod proxy;
pub mod registration;
pub mod registry;
pub mod transport;
pub mod worker;
pub mod workflow;

pub use activity::{ActivityConfig, ActivityTask};
pub use codec::{Codec, Json};
pub use context::{
    Call, CallFailure, CallResult, ExecutionOptions, Interrupt, RoundOutcome, Settled, WorkflowContext,
};
pub use decisions::{ActivityType, Decision, RestartOptions, Scheduler};
pub use error::{ConfigError, Error, HistoryError, RegistrationError, Result, TransportError};
pub use history::{CallKey, Event, EventKind, Snapshot, WorkflowType};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use poller::{DecisionTask, PollOptions, poll_next_decision};
pub use proxy::{ActivityProxy, Invocation, Proxy, WorkflowProxy};
pub use registration::{register_activity_type, register_workflow_type};
pub use registry::{RegisteredWorkflow, WorkflowRegistry};
pub use transport::{ActivityTypeDefaults, DecisionPage, Registration, Transport, WorkflowTypeDefaults};
pub use worker::{WorkerOptions, WorkflowWorker, default_identity};
pub use workflow::{ChildPolicy, FnWorkflow, TypedWorkflow, Workflow, WorkflowConfig, execute_round};
