//! Container runtime integration

pub mod api;
pub mod log_stream;

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::DeployerError;

/// Label-based container and image lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelQuery {
    /// Objects carrying the label, whatever its value
    HasKey(String),

    /// Objects whose label equals the value
    Equals(String, String),
}

impl LabelQuery {
    pub fn has_key(key: &str) -> Self {
        LabelQuery::HasKey(key.to_string())
    }

    pub fn equals(key: &str, value: &str) -> Self {
        LabelQuery::Equals(key.to_string(), value.to_string())
    }

    /// The runtime's `label` filter expression
    pub fn to_filter(&self) -> String {
        match self {
            LabelQuery::HasKey(key) => key.clone(),
            LabelQuery::Equals(key, value) => format!("{}={}", key, value),
        }
    }

    /// The runtime's `filters` query parameter
    pub fn to_filters_json(&self) -> String {
        serde_json::json!({ "label": [self.to_filter()] }).to_string()
    }

    /// Whether a label set satisfies this query
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match self {
            LabelQuery::HasKey(key) => labels.contains_key(key),
            LabelQuery::Equals(key, value) => labels.get(key) == Some(value),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A container as reported by the runtime's list endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,

    #[serde(default)]
    pub image: String,

    /// Creation time, seconds since the Unix epoch
    #[serde(default)]
    pub created: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,

    /// Runtime state, e.g. `running` or `exited`
    #[serde(default)]
    pub state: String,

    /// Human readable status, e.g. `Exited (0) 5 minutes ago`
    #[serde(default)]
    pub status: String,
}

impl ContainerSummary {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Exit code parsed from the status text, if the container has exited
    pub fn exit_code(&self) -> Option<i64> {
        let rest = self.status.strip_prefix("Exited (")?;
        let (code, _) = rest.split_once(')')?;
        code.trim().parse().ok()
    }
}

/// Network a new container is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network_id: String,
    pub network_name: String,

    /// Links in `container:alias` form
    pub links: Vec<String>,
}

/// Everything needed to create a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,

    /// `KEY=value` entries
    pub env: Vec<String>,

    pub labels: HashMap<String, String>,

    /// `<hostPath>:<containerPath>` bind mounts
    pub binds: Vec<String>,

    pub network: Option<NetworkAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
}

/// An image as reported by the runtime's list endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSummary {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub repo_tags: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub repo_digests: Vec<String>,

    /// Creation time, seconds since the Unix epoch
    #[serde(default)]
    pub created: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

/// Credentials for pulling from a private registry
#[derive(Debug)]
pub struct RegistryAuth {
    pub username: String,
    pub password: SecretString,
    pub server_address: String,
}

impl RegistryAuth {
    /// Value for the `X-Registry-Auth` header
    pub fn to_header(&self) -> String {
        let auth = serde_json::json!({
            "username": self.username,
            "password": self.password.expose_secret(),
            "serveraddress": self.server_address,
        });

        base64::engine::general_purpose::URL_SAFE.encode(auth.to_string())
    }
}

/// Operations the deployer needs from a container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers (including stopped ones) matching the query
    async fn list_containers(&self, query: &LabelQuery) -> Result<Vec<ContainerSummary>, DeployerError>;

    /// Create a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DeployerError>;

    async fn start_container(&self, container_id: &str) -> Result<(), DeployerError>;

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), DeployerError>;

    /// Combined stdout/stderr of a container in the multiplexed frame format
    async fn container_logs(&self, container_id: &str) -> Result<Vec<u8>, DeployerError>;

    /// Networks with exactly this name
    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>, DeployerError>;

    /// Pull an image, failing if the registry reports an error
    async fn pull_image(&self, reference: &str, auth: Option<&RegistryAuth>) -> Result<(), DeployerError>;

    async fn list_images(&self, query: &LabelQuery) -> Result<Vec<ImageSummary>, DeployerError>;
}
