//! HTTP request handlers

use std::sync::Arc;

use api_models::{
    DeployRequest, ErrorResponse, HealthResponse, LifecycleResponse, VersionResponse,
};
use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::errors::DeployerError;
use crate::models::deployment::{Deployment, DeploymentOutcome, DeploymentParameter, Image};
use crate::server::state::ServerState;
use crate::utils::{generate_uuid, version_info};

const ERROR_CODE_HEADER: &str = "errorcode";

/// Error returned from a handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn deployment_not_found(deployment_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse::new(
                "DeploymentNotFound",
                format!("Deployment not found with Id '{}'", deployment_id),
            ),
        }
    }
}

impl From<DeployerError> for ApiError {
    fn from(err: DeployerError) -> Self {
        let (status, code) = match &err {
            DeployerError::ValidationError(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            DeployerError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            _ => {
                error!("Request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
            }
        };

        Self {
            status,
            body: ErrorResponse::new(code, err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(&self.body)).into_response();
        if let Ok(code) = HeaderValue::from_str(&self.body.error_code) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(ERROR_CODE_HEADER), code);
        }
        response
    }
}

fn lifecycle_response(outcome: DeploymentOutcome) -> Json<LifecycleResponse> {
    Json(LifecycleResponse {
        action: outcome.action,
        state: outcome.state.to_string(),
        deployment_id: outcome.deployment_id,
    })
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "glidergun".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<Deployment>>, ApiError> {
    Ok(Json(state.registry.list_deployments().await?))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<Deployment>, ApiError> {
    state
        .registry
        .get_deployment(&deployment_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::deployment_not_found(&deployment_id))
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DeployRequest>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let deployment_id = request
        .deployment_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_uuid);

    let (parameters, sensitive_parameters) = DeploymentParameter::split(
        request
            .parameters
            .into_iter()
            .map(|p| DeploymentParameter {
                name: p.name,
                value: p.value,
                is_sensitive: p.is_sensitive,
            }),
    );

    let outcome = state
        .engine
        .deploy(&deployment_id, &request.image_name, parameters, sensitive_parameters)
        .await?;

    Ok(lifecycle_response(outcome))
}

pub async fn destroy_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let outcome = state.engine.destroy(&deployment_id).await?;
    Ok(lifecycle_response(outcome))
}

pub async fn purge_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<Json<LifecycleResponse>, ApiError> {
    let outcome = state.engine.purge(&deployment_id).await?;
    Ok(lifecycle_response(outcome))
}

pub async fn list_images_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<Image>>, ApiError> {
    Ok(Json(state.registry.list_images().await?))
}
