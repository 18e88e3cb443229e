//! Docker Engine API client
//!
//! The engine is reached either over TCP (`http://`, `https://`, `tcp://`) or
//! over its local socket (`unix://`).

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use url::{form_urlencoded, Url};

use crate::docker::{
    ContainerRuntime, ContainerSpec, ContainerSummary, ImageSummary, LabelQuery, NetworkSummary,
    RegistryAuth,
};
use crate::errors::DeployerError;
use crate::http::client::HttpClient;

/// Where the Docker Engine API listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// HTTP base URL
    Tcp(String),
    /// Path of the engine's unix socket
    Unix(PathBuf),
}

impl DockerEndpoint {
    /// Parse a configured endpoint; `tcp://` is plain HTTP
    pub fn parse(endpoint: &str) -> Result<Self, DeployerError> {
        let url = Url::parse(endpoint).map_err(|e| {
            DeployerError::ConfigError(format!("Invalid Docker endpoint '{}': {}", endpoint, e))
        })?;

        let scheme = match url.scheme() {
            "http" | "tcp" => "http",
            "https" => "https",
            "unix" => {
                if url.path().is_empty() || url.path() == "/" {
                    return Err(DeployerError::ConfigError(format!(
                        "Docker endpoint '{}' has no socket path",
                        endpoint
                    )));
                }
                return Ok(DockerEndpoint::Unix(PathBuf::from(url.path())));
            }
            other => {
                return Err(DeployerError::ConfigError(format!(
                    "Unsupported Docker endpoint scheme '{}' (expected http, https, tcp or unix)",
                    other
                )))
            }
        };

        let host = url.host_str().ok_or_else(|| {
            DeployerError::ConfigError(format!("Docker endpoint '{}' has no host", endpoint))
        })?;

        Ok(DockerEndpoint::Tcp(match url.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        }))
    }
}

impl fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerEndpoint::Tcp(base_url) => write!(f, "{}", base_url),
            DockerEndpoint::Unix(socket) => write!(f, "unix://{}", socket.display()),
        }
    }
}

/// One Engine API call, independent of transport
#[derive(Debug, Clone)]
struct EngineRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    registry_auth: Option<String>,
    body: Option<serde_json::Value>,
}

impl EngineRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            registry_auth: None,
            body: None,
        }
    }

    fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path plus encoded query string
    fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.query)
            .finish();
        format!("{}?{}", self.path, query)
    }
}

#[derive(Clone)]
enum Transport {
    Tcp(HttpClient),
    Unix {
        socket: PathBuf,
        client: Client<UnixConnector, Full<Bytes>>,
    },
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp(http) => f.debug_tuple("Tcp").field(&http.base_url()).finish(),
            Transport::Unix { socket, .. } => f.debug_struct("Unix").field("socket", socket).finish(),
        }
    }
}

impl Transport {
    /// Send a request; only failures to exchange it are errors
    async fn execute(&self, request: &EngineRequest) -> Result<(StatusCode, Bytes), DeployerError> {
        debug!("{} {}", request.method, request.path_and_query());

        match self {
            Transport::Tcp(http) => {
                let mut builder = http
                    .request(request.method.clone(), &request.path)
                    .query(&request.query);
                if let Some(auth) = &request.registry_auth {
                    builder = builder.header("X-Registry-Auth", auth);
                }
                if let Some(body) = &request.body {
                    builder = builder.json(body);
                }

                let response = http.execute(builder).await?;
                let status = response.status();
                Ok((status, response.bytes().await?))
            }
            Transport::Unix { socket, client } => {
                let uri: hyper::Uri = hyperlocal::Uri::new(socket, &request.path_and_query()).into();

                let mut builder = Request::builder().method(request.method.clone()).uri(uri);
                if let Some(auth) = &request.registry_auth {
                    builder = builder.header("X-Registry-Auth", auth);
                }
                let body = match &request.body {
                    Some(json) => {
                        builder = builder.header(hyper::header::CONTENT_TYPE, "application/json");
                        Bytes::from(serde_json::to_vec(json)?)
                    }
                    None => Bytes::new(),
                };

                let request = builder.body(Full::new(body)).map_err(|e| {
                    DeployerError::ContainerRuntimeError(format!("Failed to build request: {}", e))
                })?;

                let response = client.request(request).await.map_err(|e| {
                    DeployerError::ContainerRuntimeError(format!(
                        "request to {} failed: {}",
                        socket.display(),
                        e
                    ))
                })?;

                let status = response.status();
                let body = response
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| {
                        DeployerError::ContainerRuntimeError(format!("Failed to read response: {}", e))
                    })?
                    .to_bytes();

                Ok((status, body))
            }
        }
    }
}

/// Docker Engine API client
#[derive(Debug, Clone)]
pub struct DockerApiClient {
    endpoint: DockerEndpoint,
    transport: Transport,
}

impl DockerApiClient {
    pub fn new(endpoint: &DockerEndpoint) -> Result<Self, DeployerError> {
        let transport = match endpoint {
            DockerEndpoint::Tcp(base_url) => Transport::Tcp(HttpClient::new(
                base_url,
                DeployerError::ContainerRuntimeError,
            )?),
            DockerEndpoint::Unix(socket) => Transport::Unix {
                socket: socket.clone(),
                client: Client::unix(),
            },
        };

        Ok(Self {
            endpoint: endpoint.clone(),
            transport,
        })
    }

    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }

    async fn call(&self, request: EngineRequest) -> Result<Bytes, DeployerError> {
        self.call_allowing(request, &[]).await
    }

    /// Send a request, additionally accepting the listed non-2xx statuses
    async fn call_allowing(&self, request: EngineRequest, allowed: &[u16]) -> Result<Bytes, DeployerError> {
        let (status, body) = self.transport.execute(&request).await?;
        if status.is_success() || allowed.contains(&status.as_u16()) {
            return Ok(body);
        }

        let message = engine_error_message(&body);
        error!(
            "Docker request failed: {} {} - {} {}",
            request.method, request.path, status, message
        );

        if status == StatusCode::NOT_FOUND {
            return Err(DeployerError::NotFound(message));
        }
        Err(DeployerError::ContainerRuntimeError(format!("{}: {}", status, message)))
    }
}

#[derive(Debug, Deserialize)]
struct EngineError {
    message: String,
}

/// Error text from an Engine API error body (`{"message": "..."}`), or the raw body
fn engine_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<EngineError>(body) {
        Ok(error) => error.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Split an image reference into the `fromImage` and `tag` pull parameters.
///
/// A reference without a tag resolves to `latest`; pulling with an empty tag
/// would fetch every tag in the repository.
pub fn split_image_reference(reference: &str) -> (String, String) {
    if let Some((repository, digest)) = reference.split_once('@') {
        return (repository.to_string(), digest.to_string());
    }

    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(colon) => {
            let split = name_start + colon;
            (reference[..split].to_string(), reference[split + 1..].to_string())
        }
        None => (reference.to_string(), "latest".to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn create_container_body(spec: &ContainerSpec) -> serde_json::Value {
    let mut host_config = serde_json::json!({
        "Binds": spec.binds,
        "LogConfig": {
            "Type": "json-file",
            "Config": {},
        },
    });

    let mut body = serde_json::json!({
        "Image": spec.image,
        "Env": spec.env,
        "Labels": spec.labels,
        "AttachStdout": true,
        "AttachStderr": true,
        "Tty": false,
    });

    if let Some(network) = &spec.network {
        host_config["NetworkMode"] = serde_json::Value::String(network.network_name.clone());

        let mut endpoints = serde_json::Map::new();
        endpoints.insert(
            network.network_name.clone(),
            serde_json::json!({
                "NetworkID": network.network_id,
                "Links": network.links,
            }),
        );
        body["NetworkingConfig"] = serde_json::json!({ "EndpointsConfig": endpoints });
    }

    body["HostConfig"] = host_config;
    body
}

#[async_trait]
impl ContainerRuntime for DockerApiClient {
    async fn list_containers(&self, query: &LabelQuery) -> Result<Vec<ContainerSummary>, DeployerError> {
        let request = EngineRequest::get("/containers/json")
            .query("all", "true")
            .query("filters", query.to_filters_json());

        let containers: Vec<ContainerSummary> = serde_json::from_slice(&self.call(request).await?)?;
        debug!("Found {} containers matching '{}'", containers.len(), query.to_filter());
        Ok(containers)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DeployerError> {
        let request = EngineRequest::post("/containers/create")
            .query("name", spec.name.as_str())
            .json(create_container_body(spec));

        let created: CreateContainerResponse = serde_json::from_slice(&self.call(request).await?)?;
        for warning in created.warnings.unwrap_or_default() {
            warn!("Docker warning while creating '{}': {}", spec.name, warning);
        }

        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), DeployerError> {
        let request = EngineRequest::post(format!("/containers/{}/start", container_id));

        // 304: already started
        self.call_allowing(request, &[304]).await?;
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), DeployerError> {
        let request = EngineRequest::delete(format!("/containers/{}", container_id))
            .query("force", force.to_string());

        self.call(request).await?;
        Ok(())
    }

    async fn container_logs(&self, container_id: &str) -> Result<Vec<u8>, DeployerError> {
        let request = EngineRequest::get(format!("/containers/{}/logs", container_id))
            .query("stdout", "true")
            .query("stderr", "true")
            .query("follow", "false");

        Ok(self.call(request).await?.to_vec())
    }

    async fn list_networks(&self, name: &str) -> Result<Vec<NetworkSummary>, DeployerError> {
        let filters = serde_json::json!({ "name": [name] }).to_string();
        let request = EngineRequest::get("/networks").query("filters", filters);

        let networks: Vec<NetworkSummary> = serde_json::from_slice(&self.call(request).await?)?;

        // The runtime's name filter matches substrings
        Ok(networks.into_iter().filter(|n| n.name == name).collect())
    }

    async fn pull_image(&self, reference: &str, auth: Option<&RegistryAuth>) -> Result<(), DeployerError> {
        let (from_image, tag) = split_image_reference(reference);
        info!("Pulling image '{}' (tag '{}')...", from_image, tag);

        let mut request = EngineRequest::post("/images/create")
            .query("fromImage", from_image.as_str())
            .query("tag", tag.as_str());
        request.registry_auth = auth.map(RegistryAuth::to_header);

        let progress = self.call(request).await?;
        check_pull_progress(reference, &String::from_utf8_lossy(&progress))?;

        info!("Pulled image '{}'", reference);
        Ok(())
    }

    async fn list_images(&self, query: &LabelQuery) -> Result<Vec<ImageSummary>, DeployerError> {
        let request = EngineRequest::get("/images/json")
            .query("all", "false")
            .query("filters", query.to_filters_json());

        let images: Vec<ImageSummary> = serde_json::from_slice(&self.call(request).await?)?;
        Ok(images)
    }
}

/// Failures during a pull arrive as progress lines after a 200
fn check_pull_progress(reference: &str, progress: &str) -> Result<(), DeployerError> {
    for line in progress.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(entry) = serde_json::from_str::<PullProgress>(line) else {
            continue;
        };

        if let Some(error) = entry.error {
            return Err(DeployerError::ContainerRuntimeError(format!(
                "Failed to pull image '{}': {}",
                reference, error
            )));
        }

        if let Some(status) = entry.status {
            debug!("Pull '{}': {}", reference, status);
        }
    }

    Ok(())
}
