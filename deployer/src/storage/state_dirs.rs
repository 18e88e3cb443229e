//! Per-deployment state directories
//!
//! Every deployment owns a directory under two roots: the local root, which is
//! where this process reads and writes, and the host root, which is the same
//! location as seen by the container runtime host and is bind-mounted into
//! workload containers.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::LogRecord;

/// Parameter file written before a workload starts
pub const PARAMETERS_FILE: &str = "tfvars.json";

/// Output artifact produced by the workload
pub const OUTPUTS_FILE: &str = "terraform.output.json";

/// Subdirectory holding workload log files
pub const LOGS_DIR: &str = "logs";

const LOG_FILE_EXTENSION: &str = "log";

/// Maps deployment ids to their local and host state directories
#[derive(Debug, Clone)]
pub struct StateDirectoryManager {
    local_root: Dir,
    host_root: Dir,
}

impl StateDirectoryManager {
    /// Create a new manager over the given local and host roots
    pub fn new(local_root: impl Into<PathBuf>, host_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: Dir::new(local_root),
            host_root: Dir::new(host_root),
        }
    }

    /// Root of the locally visible state directories
    pub fn local_root(&self) -> &Dir {
        &self.local_root
    }

    /// Root of the host-visible state directories
    pub fn host_root(&self) -> &Dir {
        &self.host_root
    }

    /// Resolve (and create) the local state directory for a deployment
    pub async fn resolve_local_state_dir(&self, deployment_id: &str) -> Result<Dir, DeployerError> {
        Self::resolve(&self.local_root, deployment_id).await
    }

    /// Resolve (and create) the host state directory for a deployment
    pub async fn resolve_host_state_dir(&self, deployment_id: &str) -> Result<Dir, DeployerError> {
        Self::resolve(&self.host_root, deployment_id).await
    }

    async fn resolve(root: &Dir, deployment_id: &str) -> Result<Dir, DeployerError> {
        validate_deployment_id(deployment_id)?;

        let dir = root.subdir(deployment_id);
        dir.create().await?;
        Ok(dir)
    }

    /// Write the parameter file, replacing any previous content
    pub async fn write_parameters(
        &self,
        state_dir: &Dir,
        parameters: &HashMap<String, String>,
    ) -> Result<(), DeployerError> {
        state_dir.create().await?;

        let file = state_dir.file(PARAMETERS_FILE);
        info!(
            "Writing {} parameters to '{}'...",
            parameters.len(),
            file.path().display()
        );

        file.write_json(parameters).await?;

        debug!("Wrote parameters to '{}'", file.path().display());
        Ok(())
    }

    /// Read the workload outputs; empty if the workload has not produced them yet
    pub async fn read_outputs(
        &self,
        state_dir: &Dir,
    ) -> Result<serde_json::Map<String, serde_json::Value>, DeployerError> {
        let file = state_dir.file(OUTPUTS_FILE);
        if !file.exists().await {
            debug!("Outputs file '{}' does not exist", file.path().display());
            return Ok(serde_json::Map::new());
        }

        let outputs: serde_json::Map<String, serde_json::Value> = file.read_json().await?;
        debug!(
            "Read {} outputs from '{}'",
            outputs.len(),
            file.path().display()
        );

        Ok(outputs)
    }

    /// Read the workload log files in the order they were last written
    pub async fn read_logs(&self, state_dir: &Dir) -> Result<Vec<LogRecord>, DeployerError> {
        let logs_dir = state_dir.subdir(LOGS_DIR);
        if !logs_dir.exists().await {
            return Ok(Vec::new());
        }

        let mut logs = Vec::new();
        for path in logs_dir.list_files_by_modified(LOG_FILE_EXTENSION).await? {
            let file = File::new(path);
            debug!("Reading deployment log '{}'...", file.path().display());

            logs.push(LogRecord {
                file: file.name(),
                content: file.read_lossy().await?,
            });
        }

        Ok(logs)
    }
}

/// Reject ids that are empty or unusable as a directory or container name.
///
/// Ids must match `[A-Za-z0-9][A-Za-z0-9_.-]*`, which keeps them inside the
/// state root and valid as the suffix of a runtime container name.
pub fn validate_deployment_id(deployment_id: &str) -> Result<(), DeployerError> {
    if deployment_id.trim().is_empty() {
        return Err(DeployerError::ValidationError(
            "Must supply a valid deployment Id".to_string(),
        ));
    }

    let mut chars = deployment_id.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));

    if !leading_ok || !rest_ok {
        return Err(DeployerError::ValidationError(format!(
            "Invalid deployment Id: '{}'",
            deployment_id
        )));
    }

    Ok(())
}
