//! Workflow definitions, their configuration, and the round driver.

use crate::codec::{Codec, Json};
use crate::context::{Interrupt, RoundOutcome, WorkflowContext};
use crate::decisions::Scheduler;
use crate::error::ConfigError;
use crate::history::{Snapshot, WorkflowType};
use crate::limits::{DEFAULT_DECISION_DURATION_SECS, DEFAULT_RATE_LIMIT, DEFAULT_WORKFLOW_DURATION_SECS};
use crate::poller::DecisionTask;
use crate::proxy::{ActivityProxy, Proxy, WorkflowProxy};
use crate::transport::WorkflowTypeDefaults;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::str::FromStr;
use tracing::{debug, error};

/// What happens to running children when their parent closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChildPolicy {
    Terminate,
    RequestCancel,
    Abandon,
}

impl ChildPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildPolicy::Terminate => "TERMINATE",
            ChildPolicy::RequestCancel => "REQUEST_CANCEL",
            ChildPolicy::Abandon => "ABANDON",
        }
    }
}

impl FromStr for ChildPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TERMINATE" => Ok(ChildPolicy::Terminate),
            "REQUEST_CANCEL" => Ok(ChildPolicy::RequestCancel),
            "ABANDON" => Ok(ChildPolicy::Abandon),
            other => Err(ConfigError::InvalidChildPolicy(other.to_string())),
        }
    }
}

/// Static configuration of one workflow type.
///
/// Durations are seconds. `None` leaves a default unset, in which case
/// whoever starts the workflow (or a proxy) must provide it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub name: Option<String>,
    pub version: String,
    pub default_task_list: Option<String>,
    pub default_workflow_duration: Option<u64>,
    pub default_decision_duration: Option<u64>,
    pub default_child_policy: Option<ChildPolicy>,
    /// Cap on commands per decision response; `None` disables the cap.
    pub rate_limit: Option<usize>,
    dependencies: BTreeMap<String, Proxy>,
}

impl WorkflowConfig {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            name: None,
            version: version.into(),
            default_task_list: None,
            default_workflow_duration: Some(DEFAULT_WORKFLOW_DURATION_SECS),
            default_decision_duration: Some(DEFAULT_DECISION_DURATION_SECS),
            default_child_policy: Some(ChildPolicy::Terminate),
            rate_limit: Some(DEFAULT_RATE_LIMIT),
            dependencies: BTreeMap::new(),
        }
    }

    pub fn named(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(version)
        }
    }

    /// Set the name only if none is set yet.
    pub fn with_alternate_name(mut self, name: impl Into<String>) -> Self {
        if self.name.is_none() {
            self.name = Some(name.into());
        }
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.default_task_list = Some(task_list.into());
        self
    }

    pub fn with_workflow_duration(mut self, secs: Option<u64>) -> Self {
        self.default_workflow_duration = secs;
        self
    }

    pub fn with_decision_duration(mut self, secs: Option<u64>) -> Self {
        self.default_decision_duration = secs;
        self
    }

    pub fn with_child_policy(mut self, policy: Option<ChildPolicy>) -> Self {
        self.default_child_policy = policy;
        self
    }

    pub fn with_rate_limit(mut self, limit: Option<usize>) -> Self {
        self.rate_limit = limit;
        self
    }

    /// Register a dependency proxy under `dep_name`.
    pub fn conf(mut self, dep_name: impl Into<String>, proxy: impl Into<Proxy>) -> Self {
        self.dependencies.insert(dep_name.into(), proxy.into());
        self
    }

    /// Activity dependency whose remote name is the dependency name.
    pub fn conf_activity(self, dep_name: &str, version: impl Into<String>) -> Self {
        self.conf(dep_name, ActivityProxy::new(dep_name, version))
    }

    /// Sub-workflow dependency whose remote name is the dependency name.
    pub fn conf_workflow(self, dep_name: &str, version: impl Into<String>) -> Self {
        self.conf(dep_name, WorkflowProxy::new(dep_name, version))
    }

    pub fn dependency(&self, dep_name: &str) -> Result<&Proxy, ConfigError> {
        self.dependencies
            .get(dep_name)
            .ok_or_else(|| ConfigError::UnknownDependency(dep_name.to_string()))
    }

    pub fn dependencies(&self) -> impl Iterator<Item = (&String, &Proxy)> {
        self.dependencies.iter()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.workflow_type()?;
        if self.default_workflow_duration == Some(0) {
            return Err(ConfigError::NonPositiveDuration {
                field: "default_workflow_duration",
            });
        }
        if self.default_decision_duration == Some(0) {
            return Err(ConfigError::NonPositiveDuration {
                field: "default_decision_duration",
            });
        }
        if self.rate_limit == Some(0) {
            return Err(ConfigError::ZeroRateLimit);
        }
        Ok(())
    }

    pub fn workflow_type(&self) -> Result<WorkflowType, ConfigError> {
        let name = self.name.clone().ok_or_else(|| ConfigError::MissingName {
            version: self.version.clone(),
        })?;
        Ok(WorkflowType {
            name,
            version: self.version.clone(),
        })
    }

    /// Defaults as registered with the coordination service.
    pub fn type_defaults(&self) -> WorkflowTypeDefaults {
        WorkflowTypeDefaults {
            task_list: self.default_task_list.clone(),
            decision_duration: self.default_decision_duration,
            workflow_duration: self.default_workflow_duration,
            child_policy: self.default_child_policy,
        }
    }
}

/// Deterministic workflow code.
///
/// `run` is re-executed from the start on every round and must reach the
/// same calls in the same order given the same history.
pub trait Workflow: Send + Sync {
    fn run(&self, ctx: &mut WorkflowContext<'_>, input: Value) -> Result<Value, Interrupt>;
}

/// Function wrapper that implements [`Workflow`] over raw JSON values.
pub struct FnWorkflow<F>(pub F);

impl<F> Workflow for FnWorkflow<F>
where
    F: Fn(&mut WorkflowContext<'_>, Value) -> Result<Value, Interrupt> + Send + Sync,
{
    fn run(&self, ctx: &mut WorkflowContext<'_>, input: Value) -> Result<Value, Interrupt> {
        (self.0)(ctx, input)
    }
}

/// Function wrapper decoding the input into `In` and encoding `Out`.
pub struct TypedWorkflow<F, In, Out> {
    f: F,
    _types: PhantomData<fn(In) -> Out>,
}

impl<F, In, Out> TypedWorkflow<F, In, Out>
where
    F: Fn(&mut WorkflowContext<'_>, In) -> Result<Out, Interrupt> + Send + Sync,
    In: DeserializeOwned,
    Out: Serialize,
{
    pub fn new(f: F) -> Self {
        Self { f, _types: PhantomData }
    }
}

impl<F, In, Out> Workflow for TypedWorkflow<F, In, Out>
where
    F: Fn(&mut WorkflowContext<'_>, In) -> Result<Out, Interrupt> + Send + Sync,
    In: DeserializeOwned,
    Out: Serialize,
{
    fn run(&self, ctx: &mut WorkflowContext<'_>, input: Value) -> Result<Value, Interrupt> {
        let input: In = serde_json::from_value(input).map_err(|e| Interrupt::Fail(format!("decode: {e}")))?;
        let out = (self.f)(ctx, input)?;
        serde_json::to_value(out).map_err(|e| Interrupt::Fail(format!("encode: {e}")))
    }
}

/// Run one decision round of `workflow` against `task`.
///
/// Returns the outcome and the scheduler holding the batch to flush. A
/// history that cannot be projected, or an input that cannot be decoded,
/// fails the execution.
pub fn execute_round(workflow: &dyn Workflow, config: &WorkflowConfig, task: &DecisionTask) -> (RoundOutcome, Scheduler) {
    let mut scheduler = Scheduler::new(task.token.clone(), config.rate_limit);
    let name = task.workflow_type.name.as_str();
    let version = task.workflow_type.version.as_str();

    let snapshot = match Snapshot::project(&task.events) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(workflow = name, version, error = %e, "Error while projecting history");
            let reason = format!("history: {e}");
            scheduler.fail(&reason);
            return (RoundOutcome::Failed { reason }, scheduler);
        }
    };

    let input: Value = match task.input.as_deref() {
        None | Some("") => Value::Null,
        Some(raw) => match Json::decode(raw) {
            Ok(v) => v,
            Err(e) => {
                error!(workflow = name, version, error = %e, "Error while deserializing the input");
                scheduler.fail(&e);
                return (RoundOutcome::Failed { reason: e }, scheduler);
            }
        },
    };

    let mut ctx = WorkflowContext::new(&snapshot, scheduler, task.restart_options()).with_config(config);
    let returned = workflow
        .run(&mut ctx, input)
        .and_then(|out| Json::encode(&out).map_err(Interrupt::Fail));
    let (outcome, scheduler) = ctx.conclude(returned);
    debug!(
        workflow = name,
        version,
        outcome = outcome.name(),
        decisions = scheduler.decisions().len(),
        "round decided"
    );
    (outcome, scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_policy_parses_wire_names() {
        assert_eq!("ABANDON".parse::<ChildPolicy>(), Ok(ChildPolicy::Abandon));
        assert_eq!(ChildPolicy::RequestCancel.as_str(), "REQUEST_CANCEL");
        assert_eq!(
            "KILL".parse::<ChildPolicy>(),
            Err(ConfigError::InvalidChildPolicy("KILL".into()))
        );
        assert_eq!(serde_json::to_string(&ChildPolicy::Terminate).unwrap(), "\"TERMINATE\"");
    }

    #[test]
    fn config_defaults() {
        let cfg = WorkflowConfig::new("1");
        assert_eq!(cfg.default_workflow_duration, Some(3600));
        assert_eq!(cfg.default_decision_duration, Some(600));
        assert_eq!(cfg.default_child_policy, Some(ChildPolicy::Terminate));
        assert_eq!(cfg.rate_limit, Some(64));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MissingName { version: "1".into() })
        );
    }

    #[test]
    fn alternate_name_only_fills_missing_name() {
        let cfg = WorkflowConfig::new("1").with_alternate_name("Fallback");
        assert_eq!(cfg.name.as_deref(), Some("Fallback"));
        let cfg = WorkflowConfig::named("Explicit", "1").with_alternate_name("Fallback");
        assert_eq!(cfg.name.as_deref(), Some("Explicit"));
    }

    #[test]
    fn invalid_values_are_rejected_at_configuration_time() {
        let cfg = WorkflowConfig::named("W", "1").with_decision_duration(Some(0));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NonPositiveDuration {
                field: "default_decision_duration"
            })
        );
        let cfg = WorkflowConfig::named("W", "1").with_rate_limit(Some(0));
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRateLimit));
        assert!(WorkflowConfig::named("W", "1").with_rate_limit(None).validate().is_ok());
    }

    #[test]
    fn dependencies_default_to_their_own_name() {
        let cfg = WorkflowConfig::named("W", "1")
            .conf_activity("resize", "2")
            .conf("notify", ActivityProxy::new("SendMail", "1"))
            .conf_workflow("child", "3");
        match cfg.dependency("resize").unwrap() {
            Proxy::Activity(p) => assert_eq!((p.name.as_str(), p.version.as_str()), ("resize", "2")),
            other => panic!("unexpected {other:?}"),
        }
        match cfg.dependency("notify").unwrap() {
            Proxy::Activity(p) => assert_eq!(p.name, "SendMail"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(cfg.dependency("child"), Ok(Proxy::SubWorkflow(_))));
        assert_eq!(
            cfg.dependency("missing"),
            Err(ConfigError::UnknownDependency("missing".into()))
        );
    }
}
