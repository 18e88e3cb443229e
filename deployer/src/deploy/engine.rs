//! Deployment lifecycle engine
//!
//! Each lifecycle call launches (or removes) containers and reports a
//! `DeploymentOutcome`. Only caller misuse is returned as an error; every
//! operational failure is reported as `Failed`.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use crate::deploy::labels::{self, deployment_labels, destroy_image_tag};
use crate::deploy::registry::newest;
use crate::docker::{ContainerRuntime, ContainerSpec, LabelQuery, NetworkAttachment, RegistryAuth};
use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::models::deployment::{DeploymentAction, DeploymentOutcome, DeploymentState};
use crate::network::ip_lookup::ExternalAddressLookup;
use crate::secrets::staging::SecretsStaging;
use crate::storage::state_dirs::{validate_deployment_id, StateDirectoryManager};

/// Where the host state directory is mounted inside workload containers
pub const STATE_MOUNT_PATH: &str = "/root/state";

/// Parameter carrying the engine's external address to the workload
pub const DEPLOYMENT_IP_PARAMETER: &str = "deployment_ip";

pub const PURGE_ACTION: &str = "Purge";

/// Credentials for the image registry
#[derive(Debug)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Where template images are pulled from
#[derive(Debug, Default)]
pub struct RegistryOptions {
    /// Registry host (and port), e.g. `registry.example.com:5000`
    pub address: Option<String>,
    pub namespace: Option<String>,
    pub credentials: Option<RegistryCredentials>,
}

impl RegistryOptions {
    /// Prefix `image_tag` with the configured registry address and namespace
    pub fn qualify(&self, image_tag: &str) -> String {
        let prefix = [&self.address, &self.namespace]
            .into_iter()
            .flatten()
            .map(|part| part.trim_matches('/'))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();

        if prefix.is_empty() {
            image_tag.to_string()
        } else {
            format!("{}/{}", prefix.join("/"), image_tag)
        }
    }

    fn auth(&self) -> Option<RegistryAuth> {
        self.credentials.as_ref().map(|credentials| RegistryAuth {
            username: credentials.username.clone(),
            password: SecretString::from(credentials.password.expose_secret().to_string()),
            server_address: self.address.clone().unwrap_or_default(),
        })
    }
}

/// Secret store access handed to workloads
#[derive(Debug)]
pub struct WorkloadVaultOptions {
    pub endpoint: String,
    pub token: SecretString,
}

/// Network workload containers join
#[derive(Debug, Clone, Default)]
pub struct NetworkOptions {
    pub name: String,

    /// `container` or `container:alias`
    pub links: Vec<String>,
}

impl NetworkOptions {
    /// Links in `container:alias` form
    pub fn normalized_links(&self) -> Vec<String> {
        self.links
            .iter()
            .map(|link| link.trim())
            .filter(|link| !link.is_empty())
            .map(|link| {
                if link.contains(':') {
                    link.to_string()
                } else {
                    format!("{}:{}", link, link)
                }
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct EngineOptions {
    pub registry: RegistryOptions,
    pub vault: WorkloadVaultOptions,
    pub network: Option<NetworkOptions>,
}

/// Drives deploy, destroy and purge against the container runtime
pub struct DeploymentLifecycleEngine {
    options: EngineOptions,
    runtime: Arc<dyn ContainerRuntime>,
    secrets: SecretsStaging,
    address_lookup: Arc<dyn ExternalAddressLookup>,
    state_dirs: StateDirectoryManager,
}

impl DeploymentLifecycleEngine {
    pub fn new(
        options: EngineOptions,
        runtime: Arc<dyn ContainerRuntime>,
        secrets: SecretsStaging,
        address_lookup: Arc<dyn ExternalAddressLookup>,
        state_dirs: StateDirectoryManager,
    ) -> Self {
        Self {
            options,
            runtime,
            secrets,
            address_lookup,
            state_dirs,
        }
    }

    /// Start a deployment from `image_tag`.
    ///
    /// Reports `Initiated` once the container is started, `Failed` otherwise.
    pub async fn deploy(
        &self,
        deployment_id: &str,
        image_tag: &str,
        parameters: HashMap<String, String>,
        sensitive_parameters: HashMap<String, String>,
    ) -> Result<DeploymentOutcome, DeployerError> {
        validate_deployment_id(deployment_id)?;
        if image_tag.trim().is_empty() {
            return Err(DeployerError::ValidationError(
                "Must supply a valid template image name".to_string(),
            ));
        }

        let action = DeploymentAction::Deploy.as_label();
        let state = match self
            .try_deploy(deployment_id, image_tag, parameters, &sensitive_parameters)
            .await
        {
            Ok(container_id) => {
                info!(deployment_id = %deployment_id, container_id = %container_id, "Deployment initiated");
                DeploymentState::Initiated
            }
            Err(e) => {
                error!(deployment_id = %deployment_id, "Unexpected error while executing deployment: {}", e);
                DeploymentState::Failed
            }
        };

        Ok(DeploymentOutcome::new(deployment_id, action, state))
    }

    async fn try_deploy(
        &self,
        deployment_id: &str,
        image_tag: &str,
        mut parameters: HashMap<String, String>,
        sensitive_parameters: &HashMap<String, String>,
    ) -> Result<String, DeployerError> {
        let image = self.options.registry.qualify(image_tag);
        info!(deployment_id = %deployment_id, "Starting deployment using image '{}'...", image);

        let auth = self.options.registry.auth();
        self.runtime.pull_image(&image, auth.as_ref()).await?;

        debug!("Determining deployer's external IP address...");
        let address = self.address_lookup.external_address().await?;
        info!("Deployer's external IP address is '{}'", address);
        parameters.insert(DEPLOYMENT_IP_PARAMETER.to_string(), address.to_string());

        let local_dir = self.state_dirs.resolve_local_state_dir(deployment_id).await?;
        let host_dir = self.state_dirs.resolve_host_state_dir(deployment_id).await?;
        debug!(
            deployment_id = %deployment_id,
            "State directories: local '{}', host '{}'",
            local_dir.path().display(),
            host_dir.path().display()
        );

        self.state_dirs.write_parameters(&local_dir, &parameters).await?;
        self.secrets.stage_secrets(deployment_id, sensitive_parameters).await?;

        let spec = ContainerSpec {
            name: format!("deploy-{}", deployment_id),
            image: image.clone(),
            env: self.container_env(deployment_id),
            labels: deployment_labels(
                deployment_id,
                DeploymentAction::Deploy,
                &image,
                &destroy_image_tag(&image),
            ),
            binds: vec![state_bind(&host_dir)],
            network: self.resolve_network().await?,
        };

        self.launch(&spec).await
    }

    /// Launch the destroyer image recorded on the deployment's newest container.
    ///
    /// Reports `Running` once started, `NotFound` if the deployment has no
    /// containers, `Failed` otherwise.
    pub async fn destroy(&self, deployment_id: &str) -> Result<DeploymentOutcome, DeployerError> {
        validate_deployment_id(deployment_id)?;
        info!(deployment_id = %deployment_id, "Destroying deployment...");

        let action = DeploymentAction::Destroy.as_label();
        let state = match self.try_destroy(deployment_id).await {
            Ok(Some(container_id)) => {
                info!(deployment_id = %deployment_id, container_id = %container_id, "Destruction started");
                DeploymentState::Running
            }
            Ok(None) => {
                warn!(deployment_id = %deployment_id, "Deployment not found");
                DeploymentState::NotFound
            }
            Err(e) => {
                error!(deployment_id = %deployment_id, "Unexpected error while destroying deployment: {}", e);
                DeploymentState::Failed
            }
        };

        Ok(DeploymentOutcome::new(deployment_id, action, state))
    }

    async fn try_destroy(&self, deployment_id: &str) -> Result<Option<String>, DeployerError> {
        let containers = self
            .runtime
            .list_containers(&LabelQuery::equals(labels::DEPLOYMENT_ID, deployment_id))
            .await?;

        let Some(latest) = newest(&containers) else {
            return Ok(None);
        };

        let destroy_image = latest.label(labels::DESTROY_IMAGE_TAG).ok_or_else(|| {
            DeployerError::ContainerRuntimeError(format!(
                "Container '{}' has no '{}' label",
                latest.id,
                labels::DESTROY_IMAGE_TAG
            ))
        })?;
        let deploy_image = latest.label(labels::DEPLOY_IMAGE_TAG).unwrap_or_default();

        info!(deployment_id = %deployment_id, "Starting destruction using image '{}'...", destroy_image);

        let host_dir = self.state_dirs.resolve_host_state_dir(deployment_id).await?;
        self.state_dirs.resolve_local_state_dir(deployment_id).await?;

        let spec = ContainerSpec {
            name: format!("destroy-{}", deployment_id),
            image: destroy_image.to_string(),
            env: self.container_env(deployment_id),
            labels: deployment_labels(
                deployment_id,
                DeploymentAction::Destroy,
                deploy_image,
                destroy_image,
            ),
            binds: vec![state_bind(&host_dir)],
            network: self.resolve_network().await?,
        };

        self.launch(&spec).await.map(Some)
    }

    /// Remove every container and the staged secrets of a deployment.
    ///
    /// Reports `Deleted`, `NotFound` if the deployment has no containers, or
    /// `Failed`. A failure to delete secrets does not stop the purge.
    pub async fn purge(&self, deployment_id: &str) -> Result<DeploymentOutcome, DeployerError> {
        validate_deployment_id(deployment_id)?;
        info!(deployment_id = %deployment_id, "Purging deployment...");

        let state = match self.try_purge(deployment_id).await {
            Ok(0) => {
                warn!(deployment_id = %deployment_id, "Deployment not found");
                DeploymentState::NotFound
            }
            Ok(removed) => {
                info!(deployment_id = %deployment_id, "Purged deployment ({} containers removed)", removed);
                DeploymentState::Deleted
            }
            Err(e) => {
                error!(deployment_id = %deployment_id, "Unexpected error while purging deployment: {}", e);
                DeploymentState::Failed
            }
        };

        Ok(DeploymentOutcome::new(deployment_id, PURGE_ACTION, state))
    }

    async fn try_purge(&self, deployment_id: &str) -> Result<usize, DeployerError> {
        let containers = self
            .runtime
            .list_containers(&LabelQuery::equals(labels::DEPLOYMENT_ID, deployment_id))
            .await?;

        if containers.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.secrets.destroy_secrets(deployment_id).await {
            warn!(deployment_id = %deployment_id, "Unable to destroy secrets, continuing: {}", e);
        }

        for container in &containers {
            debug!(deployment_id = %deployment_id, "Removing container '{}'...", container.id);
            self.runtime.remove_container(&container.id, true).await?;
        }

        Ok(containers.len())
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<String, DeployerError> {
        let container_id = self.runtime.create_container(spec).await?;
        info!("Created container '{}' ({})", spec.name, container_id);

        self.runtime.start_container(&container_id).await?;
        info!("Started container '{}'", container_id);

        Ok(container_id)
    }

    async fn resolve_network(&self) -> Result<Option<NetworkAttachment>, DeployerError> {
        let Some(network) = &self.options.network else {
            return Ok(None);
        };

        let found = self.runtime.list_networks(&network.name).await?;
        let summary = found.into_iter().next().ok_or_else(|| {
            DeployerError::ContainerRuntimeError(format!("Network '{}' not found", network.name))
        })?;

        Ok(Some(NetworkAttachment {
            network_id: summary.id,
            network_name: summary.name,
            links: network.normalized_links(),
        }))
    }

    /// Environment for workload containers
    fn container_env(&self, deployment_id: &str) -> Vec<String> {
        vec![
            "ANSIBLE_NOCOLOR=1".to_string(),
            format!("VAULT_ADDR={}", self.options.vault.endpoint),
            format!("VAULT_PATH={}", self.secrets.secret_path(deployment_id)),
            format!("VAULT_TOKEN={}", self.options.vault.token.expose_secret()),
        ]
    }
}

fn state_bind(host_dir: &Dir) -> String {
    format!("{}:{}", host_dir.path().display(), STATE_MOUNT_PATH)
}
