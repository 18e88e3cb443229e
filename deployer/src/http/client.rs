//! HTTP client shared by the outbound API integrations

use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, error};

use crate::errors::DeployerError;

/// Constructor for the error reported when a request fails
pub type ErrorKind = fn(String) -> DeployerError;

/// HTTP client bound to one API base URL
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    error_kind: ErrorKind,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// No request timeout is applied: image pulls and similar calls run until
    /// the remote end completes them.
    pub fn new(base_url: &str, error_kind: ErrorKind) -> Result<Self, DeployerError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self::with_client(client, base_url, error_kind))
    }

    /// Create an HTTP client from an existing reqwest client
    pub fn with_client(client: Client, base_url: &str, error_kind: ErrorKind) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            error_kind,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!("{} {}", method, url);
        self.client.request(method, url)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.request(Method::DELETE, path)
    }

    /// Send a request whatever status it returns; only transport failures are errors
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, DeployerError> {
        request
            .send()
            .await
            .map_err(|e| (self.error_kind)(format!("request to {} failed: {}", self.base_url, e)))
    }

    /// Send a request, turning any non-success status into an error
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, DeployerError> {
        self.send_allowing(request, &[]).await
    }

    /// Send a request, additionally accepting the listed non-2xx statuses
    pub async fn send_allowing(
        &self,
        request: RequestBuilder,
        allowed: &[u16],
    ) -> Result<Response, DeployerError> {
        let response = self.execute(request).await?;

        let status = response.status();
        if status.is_success() || allowed.contains(&status.as_u16()) {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        error!("HTTP request failed: {} {} - {}", url, status, body.trim());
        Err((self.error_kind)(format!("{}: {}", status, body.trim())))
    }
}
