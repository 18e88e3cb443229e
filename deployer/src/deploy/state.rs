//! Deployment state derived from container runtime status

use crate::deploy::labels;
use crate::docker::ContainerSummary;
use crate::models::deployment::{DeploymentAction, DeploymentState};

pub const CONTAINER_RUNNING: &str = "running";
pub const CONTAINER_EXITED: &str = "exited";

/// Action recorded on the container, if the label is present and valid
pub fn container_action(container: &ContainerSummary) -> Option<DeploymentAction> {
    container
        .label(labels::DEPLOYMENT_ACTION)
        .and_then(|action| action.parse().ok())
}

/// Map a container's runtime status to a deployment state.
///
/// `None` means the runtime reported a status with no deployment meaning.
pub fn derive_state(container: &ContainerSummary) -> Option<DeploymentState> {
    match container.state.as_str() {
        CONTAINER_RUNNING => Some(DeploymentState::Running),
        CONTAINER_EXITED => match container.exit_code() {
            Some(0) => match container_action(container) {
                Some(DeploymentAction::Deploy) => Some(DeploymentState::Deployed),
                _ => Some(DeploymentState::Destroyed),
            },
            _ => Some(DeploymentState::Failed),
        },
        _ => None,
    }
}
