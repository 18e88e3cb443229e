//! Server state

use std::sync::Arc;

use crate::deploy::engine::DeploymentLifecycleEngine;
use crate::deploy::registry::DeploymentRegistry;

/// Server state shared across handlers
pub struct ServerState {
    pub engine: Arc<DeploymentLifecycleEngine>,
    pub registry: DeploymentRegistry,
}

impl ServerState {
    pub fn new(engine: Arc<DeploymentLifecycleEngine>, registry: DeploymentRegistry) -> Self {
        Self { engine, registry }
    }
}
