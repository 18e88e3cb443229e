//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::deploy::engine::DeploymentLifecycleEngine;
use crate::deploy::registry::DeploymentRegistry;
use crate::docker::api::DockerApiClient;
use crate::docker::ContainerRuntime;
use crate::errors::DeployerError;
use crate::network::ip_lookup::IpEchoLookup;
use crate::secrets::staging::SecretsStaging;
use crate::secrets::vault::VaultClient;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::storage::state_dirs::StateDirectoryManager;

/// Run the deployer until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployerError> {
    info!("Initializing glidergun...");

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    let server_options = options.server.clone();
    let server_state = init_server_state(options).await?;

    let server_handle = serve(&server_options, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_signal.await;
    drop(shutdown_tx);

    match server_handle.await {
        Ok(result) => {
            info!("HTTP server stopped");
            result
        }
        Err(e) => {
            error!("HTTP server task failed: {}", e);
            Err(DeployerError::ServerError(e.to_string()))
        }
    }
}

// =============================== INITIALIZATION ================================== //

async fn init_server_state(options: AppOptions) -> Result<ServerState, DeployerError> {
    let state_dirs = StateDirectoryManager::new(
        options.local_state_directory.clone(),
        options.host_state_directory.clone(),
    );
    state_dirs.local_root().create().await?;
    info!(
        "State directories: local '{}', host '{}'",
        state_dirs.local_root().path().display(),
        state_dirs.host_root().path().display()
    );

    let docker = DockerApiClient::new(&options.docker_endpoint)?;
    info!("Using Docker endpoint '{}'", docker.endpoint());
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(docker);

    let token = SecretString::from(options.engine.vault.token.expose_secret().to_string());
    let vault = VaultClient::new(&options.engine.vault.endpoint, token)?;
    info!("Using Vault endpoint '{}'", vault.endpoint());
    let secrets = SecretsStaging::new(Arc::new(vault), options.vault_path.clone());

    let address_lookup = Arc::new(IpEchoLookup::new(&options.ip_lookup_url)?);

    let registry = DeploymentRegistry::new(runtime.clone(), state_dirs.clone())
        .with_image_label(options.image_label.clone());

    let engine = DeploymentLifecycleEngine::new(
        options.engine,
        runtime,
        secrets,
        address_lookup,
        state_dirs,
    );

    Ok(ServerState::new(Arc::new(engine), registry))
}
