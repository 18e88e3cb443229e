//! Application configuration options

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::deploy::engine::{
    EngineOptions, NetworkOptions, RegistryCredentials, RegistryOptions, WorkloadVaultOptions,
};
use crate::docker::api::DockerEndpoint;
use crate::errors::DeployerError;
use crate::storage::settings::Settings;

/// Validated runtime configuration
#[derive(Debug)]
pub struct AppOptions {
    pub server: ServerOptions,

    pub docker_endpoint: DockerEndpoint,

    pub local_state_directory: PathBuf,
    pub host_state_directory: PathBuf,

    /// Secret store root deployment secrets are written under
    pub vault_path: String,

    pub ip_lookup_url: String,
    pub image_label: String,

    pub engine: EngineOptions,
}

impl AppOptions {
    /// Build options from settings; relative state directories resolve against `working_dir`
    pub fn from_settings(settings: &Settings, working_dir: &Path) -> Result<Self, DeployerError> {
        let docker_endpoint = DockerEndpoint::parse(&settings.docker.endpoint)?;

        let vault_endpoint = settings.vault.endpoint.clone().ok_or_else(|| {
            DeployerError::ConfigError("Vault endpoint is not configured".to_string())
        })?;
        let vault_token = settings.vault.token.clone().ok_or_else(|| {
            DeployerError::ConfigError("Vault token is not configured".to_string())
        })?;

        if settings.state.local_state_directory.trim().is_empty() {
            return Err(DeployerError::ConfigError(
                "Local state directory is not configured".to_string(),
            ));
        }
        let local_state_directory = working_dir.join(&settings.state.local_state_directory);
        let host_state_directory = match &settings.state.host_state_directory {
            Some(dir) => working_dir.join(dir),
            None => local_state_directory.clone(),
        };

        let credentials = match (&settings.registry.username, &settings.registry.password) {
            (Some(username), Some(password)) => Some(RegistryCredentials {
                username: username.clone(),
                password: SecretString::from(password.clone()),
            }),
            (Some(_), None) => {
                return Err(DeployerError::ConfigError(
                    "Registry username is configured without a password".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(DeployerError::ConfigError(
                    "Registry password is configured without a username".to_string(),
                ))
            }
            (None, None) => None,
        };

        let network = settings.network.name.as_ref().map(|name| NetworkOptions {
            name: name.clone(),
            links: settings.network.links.clone(),
        });

        Ok(Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            docker_endpoint,
            local_state_directory,
            host_state_directory,
            vault_path: settings.vault.path.clone(),
            ip_lookup_url: settings.ip_lookup_url.clone(),
            image_label: settings.image_label.clone(),
            engine: EngineOptions {
                registry: RegistryOptions {
                    address: settings.registry.address.clone(),
                    namespace: settings.registry.namespace.clone(),
                    credentials,
                },
                vault: WorkloadVaultOptions {
                    endpoint: vault_endpoint,
                    token: SecretString::from(vault_token),
                },
                network,
            },
        })
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
        }
    }
}
