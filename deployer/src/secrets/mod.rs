//! Secret store integration

pub mod staging;
pub mod vault;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::DeployerError;

/// Key/value secret storage addressed by path
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Write the full key/value set at `path`, replacing what was there
    async fn write(&self, path: &str, values: &HashMap<String, String>) -> Result<(), DeployerError>;

    /// Delete everything at `path`; a missing path is not an error
    async fn delete(&self, path: &str) -> Result<(), DeployerError>;
}
