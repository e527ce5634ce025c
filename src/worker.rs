//! Process-level decision worker.
//!
//! Each poller task owns its rounds end to end: poll, replay, flush. Rounds
//! of different executions share nothing but the immutable registry.

use crate::context::RoundOutcome;
use crate::decisions::Scheduler;
use crate::error::RegistrationError;
use crate::limits::{PAGE_FETCH_ATTEMPTS, clamp_identity};
use crate::logging::{LogConfig, init_logging};
use crate::poller::{DecisionTask, PollOptions, poll_next_decision};
use crate::registration::{register_activity_type, register_workflow_type};
use crate::registry::WorkflowRegistry;
use crate::transport::Transport;
use crate::workflow::execute_round;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration options for a [`WorkflowWorker`].
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub task_list: String,
    /// Reported to the service with every poll. Defaults to `<host>-<pid>`.
    pub identity: String,
    /// Number of independent poller tasks.
    pub concurrency: usize,
    /// Register every configured type before polling.
    pub register_on_start: bool,
    pub page_attempts: u32,
    /// Base delay after a failed poll, doubled per consecutive failure.
    pub error_backoff_ms: u64,
    /// Subscriber installed by [`WorkflowWorker::start`] unless one is
    /// already set.
    pub log: LogConfig,
}

impl WorkerOptions {
    pub fn new(task_list: impl Into<String>) -> Self {
        Self {
            task_list: task_list.into(),
            identity: default_identity(),
            concurrency: 1,
            register_on_start: true,
            page_attempts: PAGE_FETCH_ATTEMPTS,
            error_backoff_ms: 100,
            log: LogConfig::default(),
        }
    }

    fn poll_options(&self) -> PollOptions {
        PollOptions {
            task_list: self.task_list.clone(),
            identity: self.identity.clone(),
            page_attempts: self.page_attempts,
            error_backoff: Duration::from_millis(self.error_backoff_ms),
        }
    }
}

/// `<hostname>-<pid>`, keeping the last 256 characters.
pub fn default_identity() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    clamp_identity(&format!("{host}-{}", std::process::id()))
}

pub struct WorkflowWorker {
    transport: Arc<dyn Transport>,
    registry: WorkflowRegistry,
    options: WorkerOptions,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkflowWorker {
    pub fn new(transport: Arc<dyn Transport>, registry: WorkflowRegistry, options: WorkerOptions) -> Arc<Self> {
        Arc::new(Self {
            transport,
            registry,
            options,
            joins: Mutex::new(Vec::new()),
        })
    }

    /// Build a worker, register types if enabled, and spawn the pollers.
    pub async fn start(transport: Arc<dyn Transport>, registry: WorkflowRegistry, options: WorkerOptions) -> Arc<Self> {
        if let Err(e) = init_logging(&options.log) {
            debug!(error = %e, "keeping the installed subscriber");
        }

        let worker = Self::new(transport, registry, options);
        if worker.options.register_on_start {
            let failures = worker.register_remote().await;
            if !failures.is_empty() {
                warn!(failures = failures.len(), "some types could not be registered");
            }
        }

        let mut joins = worker.joins.lock().await;
        for poller in 0..worker.options.concurrency.max(1) {
            joins.push(worker.clone().spawn_poller(poller));
        }
        drop(joins);
        info!(
            task_list = %worker.options.task_list,
            identity = %worker.options.identity,
            concurrency = worker.options.concurrency.max(1),
            "workflow worker started"
        );
        worker
    }

    fn spawn_poller(self: Arc<Self>, poller: usize) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let outcome = self.run_once().await;
                debug!(poller, outcome = outcome.name(), "round finished");
            }
        })
    }

    /// Register every workflow and activity type in the registry. Failures
    /// are logged and returned; none of them stop the worker.
    pub async fn register_remote(&self) -> Vec<RegistrationError> {
        let mut failures = Vec::new();
        for registered in self.registry.workflows() {
            if let Err(e) = register_workflow_type(self.transport.as_ref(), &registered.config).await {
                warn!(error = %e, "Error while registering workflow type");
                failures.push(e);
            }
        }
        for config in self.registry.activities() {
            if let Err(e) = register_activity_type(self.transport.as_ref(), config).await {
                warn!(error = %e, "Error while registering activity type");
                failures.push(e);
            }
        }
        failures
    }

    /// Poll one decision task and answer it.
    pub async fn run_once(&self) -> RoundOutcome {
        let task = poll_next_decision(self.transport.as_ref(), &self.options.poll_options()).await;
        self.decide(&task).await
    }

    /// Run one round for an already polled task and flush its decisions.
    pub async fn decide(&self, task: &DecisionTask) -> RoundOutcome {
        let name = task.workflow_type.name.as_str();
        let version = task.workflow_type.version.as_str();
        let Some(registered) = self.registry.resolve(name, version) else {
            error!(workflow = name, version, "unregistered workflow");
            let reason = format!("unregistered workflow: {name}@{version}");
            let mut scheduler = Scheduler::new(task.token.clone(), None);
            scheduler.fail(&reason);
            scheduler.flush(self.transport.as_ref()).await;
            return RoundOutcome::Failed { reason };
        };

        let (outcome, mut scheduler) = execute_round(registered.workflow.as_ref(), &registered.config, task);
        scheduler.flush(self.transport.as_ref()).await;
        outcome
    }

    /// Stop polling. An in-flight round is dropped; the service redelivers it
    /// after its decision timeout.
    pub async fn shutdown(self: Arc<Self>) {
        let handles: Vec<JoinHandle<()>> = self.joins.lock().await.drain(..).collect();
        for h in &handles {
            h.abort();
        }
        let _ = futures::future::join_all(handles).await;
        info!(task_list = %self.options.task_list, "workflow worker stopped");
    }
}
