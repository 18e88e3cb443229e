//! Settings file management

use serde::{Deserialize, Serialize};

use crate::deploy::registry::DEFAULT_IMAGE_LABEL;
use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::network::ip_lookup::DEFAULT_IP_ECHO_URL;

/// Prefix of environment variables that override the settings file
pub const ENV_PREFIX: &str = "GLIDERGUN_";

/// Settings file read when no `--config` is given
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub docker: DockerSettings,

    #[serde(default)]
    pub state: StateSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub vault: VaultSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    /// IP echo service used to discover the deployer's external address
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,

    /// Label identifying template images
    #[serde(default = "default_image_label")]
    pub image_label: String,
}

fn default_ip_lookup_url() -> String {
    DEFAULT_IP_ECHO_URL.to_string()
}

fn default_image_label() -> String {
    DEFAULT_IMAGE_LABEL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            server: ServerSettings::default(),
            docker: DockerSettings::default(),
            state: StateSettings::default(),
            registry: RegistrySettings::default(),
            vault: VaultSettings::default(),
            network: NetworkSettings::default(),
            ip_lookup_url: default_ip_lookup_url(),
            image_label: default_image_label(),
        }
    }
}

impl Settings {
    /// Read settings from `file`, falling back to defaults if it does not exist
    pub async fn load(file: &File) -> Result<Self, DeployerError> {
        if !file.exists().await {
            return Ok(Self::default().normalized());
        }

        let settings: Settings = file.read_json().await.map_err(|e| {
            DeployerError::ConfigError(format!(
                "Unable to read settings file '{}': {}",
                file.path().display(),
                e
            ))
        })?;

        Ok(settings.normalized())
    }

    /// Apply `GLIDERGUN_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), DeployerError> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides; `lookup` receives the variable name without the prefix
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), DeployerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.parse().map_err(DeployerError::ConfigError)?;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| DeployerError::ConfigError(format!("Invalid port '{}': {}", port, e)))?;
        }
        if let Some(endpoint) = lookup("DOCKER_ENDPOINT") {
            self.docker.endpoint = endpoint;
        }
        if let Some(dir) = lookup("LOCAL_STATE_DIRECTORY") {
            self.state.local_state_directory = dir;
        }
        if let Some(dir) = lookup("HOST_STATE_DIRECTORY") {
            self.state.host_state_directory = Some(dir);
        }
        if let Some(endpoint) = lookup("VAULT_ENDPOINT") {
            self.vault.endpoint = Some(endpoint);
        }
        if let Some(token) = lookup("VAULT_TOKEN") {
            self.vault.token = Some(token);
        }
        if let Some(password) = lookup("REGISTRY_PASSWORD") {
            self.registry.password = Some(password);
        }

        *self = std::mem::take(self).normalized();
        Ok(())
    }

    /// Treat blank optional values as absent
    fn normalized(mut self) -> Self {
        fn blank_to_none(value: &mut Option<String>) {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }

        blank_to_none(&mut self.state.host_state_directory);
        blank_to_none(&mut self.registry.address);
        blank_to_none(&mut self.registry.namespace);
        blank_to_none(&mut self.registry.username);
        blank_to_none(&mut self.registry.password);
        blank_to_none(&mut self.vault.endpoint);
        blank_to_none(&mut self.vault.token);
        blank_to_none(&mut self.network.name);
        self
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    5050
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSettings {
    /// Docker Engine API endpoint (`http://`, `https://` or `tcp://`)
    #[serde(default = "default_docker_endpoint")]
    pub endpoint: String,
}

fn default_docker_endpoint() -> String {
    "http://localhost:2375".to_string()
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            endpoint: default_docker_endpoint(),
        }
    }
}

/// State directory roots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSettings {
    /// Root this process reads and writes
    #[serde(default = "default_local_state_directory")]
    pub local_state_directory: String,

    /// The same root as seen by the container runtime host; defaults to the local root
    #[serde(default)]
    pub host_state_directory: Option<String>,
}

fn default_local_state_directory() -> String {
    "state".to_string()
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            local_state_directory: default_local_state_directory(),
            host_state_directory: None,
        }
    }
}

/// Template image registry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Secret store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSettings {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    /// Root path deployment secrets are written under
    #[serde(default = "default_vault_path")]
    pub path: String,
}

fn default_vault_path() -> String {
    "secret/glidergun".to_string()
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            path: default_vault_path(),
        }
    }
}

/// Network workload containers join
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub name: Option<String>,

    /// `container` or `container:alias`
    #[serde(default)]
    pub links: Vec<String>,
}
