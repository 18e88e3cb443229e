//! Per-deployment secret staging

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::errors::DeployerError;
use crate::secrets::SecretStore;

/// Stages sensitive parameters under `<secret root>/<deployment id>`
#[derive(Clone)]
pub struct SecretsStaging {
    store: Arc<dyn SecretStore>,
    secret_root: String,
}

impl SecretsStaging {
    pub fn new(store: Arc<dyn SecretStore>, secret_root: impl Into<String>) -> Self {
        Self {
            store,
            secret_root: secret_root.into(),
        }
    }

    /// Path the deployment's secrets live at
    pub fn secret_path(&self, deployment_id: &str) -> String {
        let root = self.secret_root.trim_end_matches('/');
        if root.is_empty() {
            deployment_id.to_string()
        } else {
            format!("{}/{}", root, deployment_id)
        }
    }

    /// Replace the deployment's secret set
    pub async fn stage_secrets(
        &self,
        deployment_id: &str,
        secrets: &HashMap<String, String>,
    ) -> Result<(), DeployerError> {
        let path = self.secret_path(deployment_id);
        info!(deployment_id = %deployment_id, "Staging {} secrets at '{}'", secrets.len(), path);

        self.store.write(&path, secrets).await
    }

    /// Delete the deployment's secrets
    pub async fn destroy_secrets(&self, deployment_id: &str) -> Result<(), DeployerError> {
        let path = self.secret_path(deployment_id);
        info!(deployment_id = %deployment_id, "Destroying secrets at '{}'", path);

        self.store.delete(&path).await
    }
}
