//! Explicit `(name, version)` registry of workflows, populated at startup.

use crate::activity::ActivityConfig;
use crate::error::ConfigError;
use crate::workflow::{Workflow, WorkflowConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A workflow together with its configuration.
#[derive(Clone)]
pub struct RegisteredWorkflow {
    pub config: WorkflowConfig,
    pub workflow: Arc<dyn Workflow>,
}

impl std::fmt::Debug for RegisteredWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorkflow").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Immutable lookup table shared by all poller tasks.
#[derive(Clone, Default, Debug)]
pub struct WorkflowRegistry {
    inner: Arc<HashMap<String, BTreeMap<String, RegisteredWorkflow>>>,
    activities: Arc<Vec<ActivityConfig>>,
}

pub struct WorkflowRegistryBuilder {
    map: HashMap<String, BTreeMap<String, RegisteredWorkflow>>,
    activities: Vec<ActivityConfig>,
    errors: Vec<ConfigError>,
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder {
            map: HashMap::new(),
            activities: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn resolve(&self, name: &str, version: &str) -> Option<&RegisteredWorkflow> {
        let found = self.inner.get(name).and_then(|versions| versions.get(version));
        if found.is_none() {
            let available: Vec<&String> = self.inner.get(name).map(|v| v.keys().collect()).unwrap_or_default();
            tracing::debug!(
                requested_name = %name,
                requested_version = %version,
                available_versions_for_name = ?available,
                registered_count = self.count(),
                "Registry lookup miss"
            );
        }
        found
    }

    pub fn has(&self, name: &str, version: &str) -> bool {
        self.inner.get(name).is_some_and(|v| v.contains_key(version))
    }

    /// Number of registered `(name, version)` pairs.
    pub fn count(&self) -> usize {
        self.inner.values().map(BTreeMap::len).sum()
    }

    pub fn workflows(&self) -> impl Iterator<Item = &RegisteredWorkflow> {
        self.inner.values().flat_map(BTreeMap::values)
    }

    /// Activity types registered alongside the workflows.
    pub fn activities(&self) -> &[ActivityConfig] {
        &self.activities
    }
}

impl WorkflowRegistryBuilder {
    /// Add a workflow. Invalid configurations and duplicates are collected
    /// and reported by [`build`](Self::build).
    pub fn register(mut self, config: WorkflowConfig, workflow: impl Workflow + 'static) -> Self {
        self.register_arc(config, Arc::new(workflow));
        self
    }

    pub fn register_arc(&mut self, config: WorkflowConfig, workflow: Arc<dyn Workflow>) {
        if let Err(e) = config.validate() {
            self.errors.push(e);
            return;
        }
        let (name, version) = match config.workflow_type() {
            Ok(t) => (t.name, t.version),
            Err(e) => {
                self.errors.push(e);
                return;
            }
        };
        let versions = self.map.entry(name.clone()).or_default();
        if versions.contains_key(&version) {
            self.errors.push(ConfigError::Duplicate {
                kind: "workflow",
                name,
                version,
            });
            return;
        }
        versions.insert(version, RegisteredWorkflow { config, workflow });
    }

    pub fn activity(mut self, config: ActivityConfig) -> Self {
        if let Err(e) = config.validate() {
            self.errors.push(e);
            return self;
        }
        if self
            .activities
            .iter()
            .any(|a| a.name == config.name && a.version == config.version)
        {
            self.errors.push(ConfigError::Duplicate {
                kind: "activity",
                name: config.name,
                version: config.version,
            });
            return self;
        }
        self.activities.push(config);
        self
    }

    /// Build the registry, failing with the first registration error.
    pub fn build(self) -> Result<WorkflowRegistry, ConfigError> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(first);
        }
        Ok(WorkflowRegistry {
            inner: Arc::new(self.map),
            activities: Arc::new(self.activities),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Interrupt, WorkflowContext};
    use serde_json::Value;

    fn noop(_: &mut WorkflowContext<'_>, input: Value) -> Result<Value, Interrupt> {
        Ok(input)
    }

    #[test]
    fn resolves_exact_name_and_version() {
        let reg = WorkflowRegistry::builder()
            .register(WorkflowConfig::named("W", "1"), crate::FnWorkflow(noop))
            .register(WorkflowConfig::named("W", "2"), crate::FnWorkflow(noop))
            .build()
            .unwrap();
        assert_eq!(reg.count(), 2);
        assert!(reg.resolve("W", "2").is_some());
        assert!(reg.resolve("W", "3").is_none());
        assert!(reg.resolve("X", "1").is_none());
        assert!(reg.has("W", "1"));
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = WorkflowRegistry::builder()
            .register(WorkflowConfig::named("W", "1"), crate::FnWorkflow(noop))
            .register(WorkflowConfig::named("W", "1"), crate::FnWorkflow(noop))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Duplicate {
                kind: "workflow",
                name: "W".into(),
                version: "1".into()
            }
        );
    }

    #[test]
    fn invalid_configs_fail_the_build() {
        let err = WorkflowRegistry::builder()
            .register(WorkflowConfig::new("1"), crate::FnWorkflow(noop))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingName { version: "1".into() });
    }

    #[test]
    fn activities_are_kept_for_registration() {
        let reg = WorkflowRegistry::builder()
            .activity(ActivityConfig::new("resize", "1"))
            .build()
            .unwrap();
        assert_eq!(reg.activities().len(), 1);
        let err = WorkflowRegistry::builder()
            .activity(ActivityConfig::new("resize", "1"))
            .activity(ActivityConfig::new("resize", "1"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { kind: "activity", .. }));
    }
}
