//! Activity-side reporting.
//!
//! Executing activities is up to the caller; this module only describes
//! activity types for registration and reports task outcomes back to the
//! coordination service.

use crate::codec::{Codec, Json};
use crate::decisions::ActivityType;
use crate::error::ConfigError;
use crate::limits::truncate_reason;
use crate::transport::{ActivityTypeDefaults, Transport};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::error;

/// Registered defaults of one activity type. Durations are seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityConfig {
    pub name: String,
    pub version: String,
    pub default_task_list: Option<String>,
    pub default_heartbeat: Option<u64>,
    pub default_schedule_to_close: Option<u64>,
    pub default_schedule_to_start: Option<u64>,
    pub default_start_to_close: Option<u64>,
}

impl ActivityConfig {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            default_task_list: None,
            default_heartbeat: None,
            default_schedule_to_close: None,
            default_schedule_to_start: None,
            default_start_to_close: None,
        }
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.default_task_list = Some(task_list.into());
        self
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.default_heartbeat = Some(secs);
        self
    }

    pub fn with_schedule_to_close(mut self, secs: u64) -> Self {
        self.default_schedule_to_close = Some(secs);
        self
    }

    pub fn with_schedule_to_start(mut self, secs: u64) -> Self {
        self.default_schedule_to_start = Some(secs);
        self
    }

    pub fn with_start_to_close(mut self, secs: u64) -> Self {
        self.default_start_to_close = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("default_heartbeat", self.default_heartbeat),
            ("default_schedule_to_close", self.default_schedule_to_close),
            ("default_schedule_to_start", self.default_schedule_to_start),
            ("default_start_to_close", self.default_start_to_close),
        ];
        for (field, value) in durations {
            if value == Some(0) {
                return Err(ConfigError::NonPositiveDuration { field });
            }
        }
        Ok(())
    }

    pub fn activity_type(&self) -> ActivityType {
        ActivityType {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn type_defaults(&self) -> ActivityTypeDefaults {
        ActivityTypeDefaults {
            task_list: self.default_task_list.clone(),
            heartbeat: self.default_heartbeat,
            schedule_to_close: self.default_schedule_to_close,
            schedule_to_start: self.default_schedule_to_start,
            start_to_close: self.default_start_to_close,
        }
    }
}

/// One polled activity task. Reporting methods return `false` when the
/// transport call failed; the failure is logged and the service's own
/// timeouts take over.
pub struct ActivityTask {
    transport: Arc<dyn Transport>,
    token: String,
    input: Option<String>,
}

impl ActivityTask {
    pub fn new(transport: Arc<dyn Transport>, token: impl Into<String>, input: Option<String>) -> Self {
        Self {
            transport,
            token: token.into(),
            input,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decode the task input; a missing input decodes as JSON `null`.
    pub fn input<T: DeserializeOwned>(&self) -> Result<T, String> {
        Json::decode(self.input.as_deref().unwrap_or("null"))
    }

    pub async fn complete<T: Serialize + ?Sized>(&self, result: &T) -> bool {
        let encoded = match Json::encode(result) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(token = %self.token, error = %e, "Error while serializing the activity result");
                return self.fail(&e).await;
            }
        };
        match self.transport.respond_activity_completed(&self.token, &encoded).await {
            Ok(()) => true,
            Err(e) => {
                error!(token = %self.token, error = %e, "Error while completing the activity");
                false
            }
        }
    }

    pub async fn fail(&self, reason: &str) -> bool {
        let reason = truncate_reason(reason);
        match self.transport.respond_activity_failed(&self.token, &reason).await {
            Ok(()) => true,
            Err(e) => {
                error!(token = %self.token, error = %e, "Error while failing the activity");
                false
            }
        }
    }

    pub async fn heartbeat(&self) -> bool {
        match self.transport.record_activity_heartbeat(&self.token).await {
            Ok(()) => true,
            Err(e) => {
                error!(token = %self.token, error = %e, "Error while sending the heartbeat");
                false
            }
        }
    }
}
