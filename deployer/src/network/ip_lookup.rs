//! External address discovery
//!
//! Workloads call back to the deployer, so it needs the address it is seen
//! from outside (typically a SNAT address), not its local interface address.

use std::net::IpAddr;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::errors::DeployerError;
use crate::http::client::HttpClient;

/// Default IP echo service
pub const DEFAULT_IP_ECHO_URL: &str = "http://ifconfig.co/json";

/// Resolves the deployer's externally routable address
#[async_trait]
pub trait ExternalAddressLookup: Send + Sync {
    async fn external_address(&self) -> Result<IpAddr, DeployerError>;
}

#[derive(Debug, Deserialize)]
struct IpEchoResponse {
    ip: String,
}

/// Looks up the external address via a JSON IP echo service
#[derive(Debug, Clone)]
pub struct IpEchoLookup {
    http: HttpClient,
}

impl IpEchoLookup {
    /// Build the lookup once; the underlying connection pool is reused across calls
    pub fn new(echo_url: &str) -> Result<Self, DeployerError> {
        let http = HttpClient::new(echo_url, DeployerError::NetworkError)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ExternalAddressLookup for IpEchoLookup {
    async fn external_address(&self) -> Result<IpAddr, DeployerError> {
        let request = self
            .http
            .get("")
            .header(reqwest::header::ACCEPT, "application/json");

        let response: IpEchoResponse = self
            .http
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| DeployerError::NetworkError(format!("Invalid IP echo response: {}", e)))?;

        debug!("IP echo service reported '{}'", response.ip);
        parse_address(&response.ip)
    }
}

fn parse_address(ip: &str) -> Result<IpAddr, DeployerError> {
    ip.trim()
        .parse()
        .map_err(|_| DeployerError::NetworkError(format!("IP echo service returned an invalid address: '{}'", ip)))
}
