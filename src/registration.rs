//! Startup registration of workflow and activity types.
//!
//! A type that already exists remotely is accepted only if its registered
//! defaults match the local configuration.

use crate::activity::ActivityConfig;
use crate::error::RegistrationError;
use crate::transport::{Registration, Transport};
use crate::workflow::WorkflowConfig;
use tracing::{info, warn};

pub async fn register_workflow_type(
    transport: &dyn Transport,
    config: &WorkflowConfig,
) -> Result<Registration, RegistrationError> {
    config.validate()?;
    let workflow_type = config.workflow_type()?;
    let local = config.type_defaults();
    let outcome = transport.register_workflow_type(&workflow_type, &local).await?;
    if outcome == Registration::AlreadyExists {
        let remote = transport.describe_workflow_type(&workflow_type).await?;
        if remote != local {
            warn!(
                workflow = %workflow_type.name,
                version = %workflow_type.version,
                ?local,
                ?remote,
                "workflow type registered with different defaults"
            );
            return Err(RegistrationError::Incompatible {
                kind: "workflow",
                name: workflow_type.name,
                version: workflow_type.version,
            });
        }
    }
    info!(
        workflow = %workflow_type.name,
        version = %workflow_type.version,
        ?outcome,
        "workflow type registered"
    );
    Ok(outcome)
}

pub async fn register_activity_type(
    transport: &dyn Transport,
    config: &ActivityConfig,
) -> Result<Registration, RegistrationError> {
    config.validate()?;
    let activity_type = config.activity_type();
    let local = config.type_defaults();
    let outcome = transport.register_activity_type(&activity_type, &local).await?;
    if outcome == Registration::AlreadyExists {
        let remote = transport.describe_activity_type(&activity_type).await?;
        if remote != local {
            warn!(
                activity = %activity_type.name,
                version = %activity_type.version,
                ?local,
                ?remote,
                "activity type registered with different defaults"
            );
            return Err(RegistrationError::Incompatible {
                kind: "activity",
                name: activity_type.name,
                version: activity_type.version,
            });
        }
    }
    info!(
        activity = %activity_type.name,
        version = %activity_type.version,
        ?outcome,
        "activity type registered"
    );
    Ok(outcome)
}
