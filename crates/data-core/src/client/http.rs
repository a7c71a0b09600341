//! HTTP subsystem clients
//!
//! One `reqwest` client per subsystem, each bound to a single base URL.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ArtifactRegistry, ClientError, ClientResult, ContextGraph, SecureStore};
use crate::config::EndpointConfig;
use crate::contracts::{ArtifactDescriptor, Attributes};
use crate::error::{ConfigError, DataCoreError, Result};

/// Shared plumbing for the subsystem clients
#[derive(Debug, Clone)]
struct Endpoint {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl Endpoint {
    fn new(config: &EndpointConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url).map_err(|e| {
            ConfigError::Invalid(format!("Invalid endpoint URL {:?}: {}", config.url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "Endpoint URL {:?} cannot carry a path",
                config.url
            ))
            .into());
        }

        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataCoreError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    /// Append `segments` to the base path, percent-encoding each one.
    ///
    /// Identifiers always stay a single path segment: `/`, `?` and `#`
    /// are encoded, and segments that would be resolved away are refused.
    fn url(&self, segments: &[&str]) -> ClientResult<Url> {
        if let Some(segment) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ClientError::InvalidId(segment.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidId(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn dispatch(&self, request: reqwest::RequestBuilder) -> ClientResult<reqwest::Response> {
        request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))
    }

    async fn check(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(ClientError::Server {
                status: status.as_u16(),
                message: error_text,
            })
        }
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ClientResult<reqwest::Response> {
        Self::check(self.dispatch(request).await?).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ClientResult<T> {
        Self::decode(self.send(request).await?).await
    }

    /// GET a JSON document; 404 means there is none
    async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> ClientResult<Option<T>> {
        let response = self.dispatch(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(Self::check(response).await?).await.map(Some)
    }
}

#[derive(Debug, Serialize)]
struct LineageRequest<'a> {
    source_id: &'a str,
    target_id: &'a str,
    operation: &'a str,
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    receipt: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    id: String,
}

/// Context graph over HTTP
#[derive(Debug, Clone)]
pub struct HttpContextGraph {
    endpoint: Endpoint,
}

impl HttpContextGraph {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(config)?,
        })
    }
}

#[async_trait]
impl ContextGraph for HttpContextGraph {
    async fn track_context(&self, entity_id: &str, attributes: &Attributes) -> ClientResult<()> {
        let url = self.endpoint.url(&["api", "v1", "context", entity_id])?;
        self.endpoint
            .send(self.endpoint.client.post(url).json(attributes))
            .await?;
        Ok(())
    }

    async fn record_lineage(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
    ) -> ClientResult<()> {
        let url = self.endpoint.url(&["api", "v1", "lineage"])?;
        let request = LineageRequest {
            source_id,
            target_id,
            operation,
        };
        self.endpoint
            .send(self.endpoint.client.post(url).json(&request))
            .await?;
        Ok(())
    }

    async fn context_history(&self, entity_id: &str) -> ClientResult<Vec<Attributes>> {
        let url = self.endpoint.url(&["api", "v1", "context", entity_id])?;
        let history: Option<Vec<Attributes>> = self.endpoint.get_optional(url).await?;
        Ok(history.unwrap_or_default())
    }
}

/// Secure store over HTTP
#[derive(Debug, Clone)]
pub struct HttpSecureStore {
    endpoint: Endpoint,
}

impl HttpSecureStore {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(config)?,
        })
    }
}

#[async_trait]
impl SecureStore for HttpSecureStore {
    async fn store(&self, key: &str, payload: &serde_json::Value) -> ClientResult<String> {
        let url = self.endpoint.url(&["api", "v1", "data", key])?;
        let response: StoreResponse = self
            .endpoint
            .send_json(self.endpoint.client.put(url).json(payload))
            .await?;
        Ok(response.receipt)
    }

    async fn retrieve(&self, key: &str) -> ClientResult<Option<serde_json::Value>> {
        let url = self.endpoint.url(&["api", "v1", "data", key])?;
        self.endpoint.get_optional(url).await
    }
}

/// Artifact registry over HTTP
#[derive(Debug, Clone)]
pub struct HttpArtifactRegistry {
    endpoint: Endpoint,
}

impl HttpArtifactRegistry {
    pub fn new(config: &EndpointConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(config)?,
        })
    }
}

#[async_trait]
impl ArtifactRegistry for HttpArtifactRegistry {
    async fn register_artifact(&self, descriptor: &ArtifactDescriptor) -> ClientResult<String> {
        let url = self.endpoint.url(&["api", "v1", "artifacts"])?;
        let response: RegisterResponse = self
            .endpoint
            .send_json(self.endpoint.client.post(url).json(descriptor))
            .await?;
        Ok(response.id)
    }

    async fn get_artifact(&self, id: &str) -> ClientResult<Option<ArtifactDescriptor>> {
        let url = self.endpoint.url(&["api", "v1", "artifacts", id])?;
        self.endpoint.get_optional(url).await
    }
}
