//! Read-side view of deployments, rebuilt from the container runtime on every query

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::deploy::labels;
use crate::deploy::state::{container_action, derive_state};
use crate::docker::log_stream;
use crate::docker::{ContainerRuntime, ContainerSummary, ImageSummary, LabelQuery};
use crate::errors::DeployerError;
use crate::models::deployment::{Deployment, DeploymentState, Image, LogRecord};
use crate::storage::state_dirs::{validate_deployment_id, StateDirectoryManager};

/// `file` value of the log record holding a container's own combined output
pub const CONTAINER_LOG: &str = "ContainerLog";

/// Label marking images that can be deployed
pub const DEFAULT_IMAGE_LABEL: &str = "dimensiondata";

/// Queries deployments and template images
#[derive(Clone)]
pub struct DeploymentRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    state_dirs: StateDirectoryManager,
    image_label: String,
}

impl DeploymentRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, state_dirs: StateDirectoryManager) -> Self {
        Self {
            runtime,
            state_dirs,
            image_label: DEFAULT_IMAGE_LABEL.to_string(),
        }
    }

    /// Use a different label to identify template images
    pub fn with_image_label(mut self, image_label: impl Into<String>) -> Self {
        self.image_label = image_label.into();
        self
    }

    /// Every container carrying a deployment id, as a snapshot each
    pub async fn list_deployments(&self) -> Result<Vec<Deployment>, DeployerError> {
        info!("Retrieving all deployments...");

        let containers = self
            .runtime
            .list_containers(&LabelQuery::has_key(labels::DEPLOYMENT_ID))
            .await?;

        let mut deployments = Vec::with_capacity(containers.len());
        for container in &containers {
            deployments.push(self.to_deployment_model(container).await);
        }

        info!("Retrieved {} deployments", deployments.len());
        Ok(deployments)
    }

    /// Snapshot of the newest container for `deployment_id`, or `None` if there is none
    pub async fn get_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>, DeployerError> {
        validate_deployment_id(deployment_id)?;
        info!(deployment_id = %deployment_id, "Retrieving deployment...");

        let containers = self
            .runtime
            .list_containers(&LabelQuery::equals(labels::DEPLOYMENT_ID, deployment_id))
            .await?;

        let Some(container) = newest(&containers) else {
            info!(deployment_id = %deployment_id, "Deployment not found");
            return Ok(None);
        };

        let mut deployment = self.to_deployment_model(container).await;

        match self.runtime.container_logs(&container.id).await {
            Ok(raw) => {
                let log = combined_log_text(&raw);
                if !log.is_empty() {
                    deployment.logs.push(LogRecord {
                        file: CONTAINER_LOG.to_string(),
                        content: log,
                    });
                }
            }
            Err(e) => warn!(
                deployment_id = %deployment_id,
                container_id = %container.id,
                "Unable to read container log: {}",
                e
            ),
        }

        info!(deployment_id = %deployment_id, "Retrieved deployment ({})", deployment.state);
        Ok(Some(deployment))
    }

    /// Build a deployment snapshot from a container.
    ///
    /// Exited containers also carry the state directory's logs and outputs.
    pub async fn to_deployment_model(&self, container: &ContainerSummary) -> Deployment {
        let id = container.label(labels::DEPLOYMENT_ID).unwrap_or_default().to_string();

        let state = derive_state(container).unwrap_or_else(|| {
            warn!(
                deployment_id = %id,
                container_id = %container.id,
                "Unexpected container state '{}'",
                container.state
            );
            DeploymentState::Unknown
        });

        let mut deployment = Deployment {
            id,
            container_id: container.id.clone(),
            action: container_action(container),
            state,
            logs: Vec::new(),
            outputs: serde_json::Map::new(),
        };

        if state.is_complete() {
            self.attach_state(&mut deployment).await;
        }

        deployment
    }

    async fn attach_state(&self, deployment: &mut Deployment) {
        if let Err(e) = validate_deployment_id(&deployment.id) {
            warn!(container_id = %deployment.container_id, "Skipping state directory: {}", e);
            return;
        }

        let state_dir = self.state_dirs.local_root().subdir(&deployment.id);

        match self.state_dirs.read_logs(&state_dir).await {
            Ok(logs) => deployment.logs.extend(logs),
            Err(e) => warn!(deployment_id = %deployment.id, "Unable to read deployment logs: {}", e),
        }

        match self.state_dirs.read_outputs(&state_dir).await {
            Ok(outputs) => deployment.outputs = outputs,
            Err(e) => warn!(deployment_id = %deployment.id, "Unable to read deployment outputs: {}", e),
        }
    }

    /// Template images known to the runtime
    pub async fn list_images(&self) -> Result<Vec<Image>, DeployerError> {
        let images = self
            .runtime
            .list_images(&LabelQuery::has_key(&self.image_label))
            .await?;

        debug!("Found {} images labelled '{}'", images.len(), self.image_label);
        Ok(images.into_iter().map(to_image_model).collect())
    }
}

/// The latest-created container; ties go to whichever the runtime listed first
pub fn newest(containers: &[ContainerSummary]) -> Option<&ContainerSummary> {
    containers
        .iter()
        .rev()
        .max_by_key(|container| container.created)
}

/// Decode a combined log stream into text, dropping a trailing partial frame
pub fn combined_log_text(raw: &[u8]) -> String {
    let (frames, consumed) = log_stream::decode_all(raw);
    if consumed < raw.len() {
        debug!("Ignoring {} trailing bytes of container log", raw.len() - consumed);
    }

    frames.iter().map(|frame| frame.text()).collect()
}

fn to_image_model(image: ImageSummary) -> Image {
    let created = DateTime::<Utc>::from_timestamp(image.created, 0).unwrap_or_default();

    Image {
        id: image.id,
        tags: image.repo_tags.into_iter().collect::<BTreeSet<_>>(),
        digests: image.repo_digests.into_iter().collect::<BTreeSet<_>>(),
        created,
    }
}
