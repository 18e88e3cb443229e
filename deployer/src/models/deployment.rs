//! Deployment models

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The logical state of a deployment, derived from its newest container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentState {
    /// Uninitialised or unrecognised runtime status
    #[default]
    Unknown,

    /// Create call accepted and container started
    Initiated,

    /// Container is executing
    Running,

    /// Deploy container exited cleanly
    Deployed,

    /// Destroy container exited cleanly
    Destroyed,

    /// Container exited non-zero, or the lifecycle call failed
    Failed,

    /// Purge completed
    Deleted,

    /// No matching container
    NotFound,
}

impl DeploymentState {
    /// Whether the workload behind this state has finished executing
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            DeploymentState::Deployed | DeploymentState::Destroyed | DeploymentState::Failed
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The lifecycle action a container was launched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentAction {
    Deploy,
    Destroy,
}

impl DeploymentAction {
    /// Value stored in the `deployment.action` label
    pub fn as_label(&self) -> &'static str {
        match self {
            DeploymentAction::Deploy => "Deploy",
            DeploymentAction::Destroy => "Destroy",
        }
    }
}

impl fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for DeploymentAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deploy" => Ok(DeploymentAction::Deploy),
            "Destroy" => Ok(DeploymentAction::Destroy),
            _ => Err(format!("Invalid deployment action: {}", s)),
        }
    }
}

/// A single log attached to a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Log file name, or the combined container log marker
    pub file: String,

    /// Decoded log text
    pub content: String,
}

/// Snapshot of one deployment, recomputed from the container runtime on every query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub container_id: String,
    pub action: Option<DeploymentAction>,
    pub state: DeploymentState,

    /// Logs in chronological order
    #[serde(default)]
    pub logs: Vec<LogRecord>,

    /// Workload outputs; empty until the workload produces them
    #[serde(default)]
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl Deployment {
    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }
}

/// A parameter supplied for a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentParameter {
    pub name: String,
    pub value: String,

    /// Sensitive values go to the secret store and never touch disk
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_sensitive: bool,
}

impl DeploymentParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_sensitive: false,
        }
    }

    pub fn sensitive(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_sensitive: true,
        }
    }

    /// Partition parameters into (plain, sensitive) maps
    pub fn split(
        parameters: impl IntoIterator<Item = DeploymentParameter>,
    ) -> (HashMap<String, String>, HashMap<String, String>) {
        let mut plain = HashMap::new();
        let mut sensitive = HashMap::new();

        for parameter in parameters {
            if parameter.is_sensitive {
                sensitive.insert(parameter.name, parameter.value);
            } else {
                plain.insert(parameter.name, parameter.value);
            }
        }

        (plain, sensitive)
    }
}

/// A template image known to the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    pub tags: BTreeSet<String>,
    pub digests: BTreeSet<String>,
    pub created: DateTime<Utc>,
}

/// Result of a lifecycle call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentOutcome {
    pub deployment_id: String,
    pub action: String,
    pub state: DeploymentState,
}

impl DeploymentOutcome {
    pub fn new(deployment_id: &str, action: &str, state: DeploymentState) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            action: action.to_string(),
            state,
        }
    }
}
