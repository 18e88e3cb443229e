//! HashiCorp Vault KV client

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::DeployerError;
use crate::http::client::HttpClient;
use crate::secrets::SecretStore;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Vault client using a fixed token
#[derive(Debug)]
pub struct VaultClient {
    http: HttpClient,
    token: SecretString,
}

impl VaultClient {
    pub fn new(endpoint: &str, token: SecretString) -> Result<Self, DeployerError> {
        let http = HttpClient::new(endpoint, DeployerError::SecretStoreError)?;
        Ok(Self { http, token })
    }

    pub fn endpoint(&self) -> &str {
        self.http.base_url()
    }

    fn secret_api_path(path: &str) -> String {
        format!("/v1/{}", path.trim_start_matches('/'))
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn write(&self, path: &str, values: &HashMap<String, String>) -> Result<(), DeployerError> {
        debug!("Writing {} secrets to '{}'", values.len(), path);

        let request = self
            .http
            .post(&Self::secret_api_path(path))
            .header(TOKEN_HEADER, self.token.expose_secret())
            .json(values);

        self.http.send(request).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), DeployerError> {
        debug!("Deleting secrets at '{}'", path);

        let request = self
            .http
            .delete(&Self::secret_api_path(path))
            .header(TOKEN_HEADER, self.token.expose_secret());

        self.http.send_allowing(request, &[404]).await?;
        Ok(())
    }
}
