//! Subsystem clients
//!
//! The capability interfaces the gateway consumes from the three remote
//! subsystems, plus in-memory (simulator) and HTTP implementations.
//! Failures are opaque: callers only ever see the subsystem's message.

pub mod http;
pub mod memory;

pub use http::{HttpArtifactRegistry, HttpContextGraph, HttpSecureStore};
pub use memory::{InMemoryArtifactRegistry, InMemoryContextGraph, InMemorySecureStore};

use async_trait::async_trait;
use std::sync::Arc;

use crate::contracts::{ArtifactDescriptor, Attributes};

/// Client errors
///
/// `Display` is the message reported for a rejected subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The subsystem refused the call
    #[error("{0}")]
    Rejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// An identifier that cannot be addressed on the subsystem
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),
}

impl ClientError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        ClientError::Rejected(msg.into())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Context / lineage graph subsystem
#[async_trait]
pub trait ContextGraph: Send + Sync {
    /// Record an entity in the context graph with its attributes
    async fn track_context(&self, entity_id: &str, attributes: &Attributes) -> ClientResult<()>;

    /// Record a lineage edge `source_id -> target_id`
    async fn record_lineage(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
    ) -> ClientResult<()>;

    /// Every attribute set tracked for an entity, oldest first
    async fn context_history(&self, entity_id: &str) -> ClientResult<Vec<Attributes>>;
}

/// Secure content store subsystem
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store a payload under `key`, returning the store's receipt
    async fn store(&self, key: &str, payload: &serde_json::Value) -> ClientResult<String>;

    /// Payload stored under `key`, `None` if nothing is
    async fn retrieve(&self, key: &str) -> ClientResult<Option<serde_json::Value>>;
}

/// Metadata registry subsystem
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    /// Register an artifact, returning the id it was registered under
    async fn register_artifact(&self, descriptor: &ArtifactDescriptor) -> ClientResult<String>;

    async fn get_artifact(&self, id: &str) -> ClientResult<Option<ArtifactDescriptor>>;
}

#[async_trait]
impl<T: ContextGraph + ?Sized> ContextGraph for Arc<T> {
    async fn track_context(&self, entity_id: &str, attributes: &Attributes) -> ClientResult<()> {
        (**self).track_context(entity_id, attributes).await
    }

    async fn record_lineage(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
    ) -> ClientResult<()> {
        (**self).record_lineage(source_id, target_id, operation).await
    }

    async fn context_history(&self, entity_id: &str) -> ClientResult<Vec<Attributes>> {
        (**self).context_history(entity_id).await
    }
}

#[async_trait]
impl<T: SecureStore + ?Sized> SecureStore for Arc<T> {
    async fn store(&self, key: &str, payload: &serde_json::Value) -> ClientResult<String> {
        (**self).store(key, payload).await
    }

    async fn retrieve(&self, key: &str) -> ClientResult<Option<serde_json::Value>> {
        (**self).retrieve(key).await
    }
}

#[async_trait]
impl<T: ArtifactRegistry + ?Sized> ArtifactRegistry for Arc<T> {
    async fn register_artifact(&self, descriptor: &ArtifactDescriptor) -> ClientResult<String> {
        (**self).register_artifact(descriptor).await
    }

    async fn get_artifact(&self, id: &str) -> ClientResult<Option<ArtifactDescriptor>> {
        (**self).get_artifact(id).await
    }
}

/// One raw client per subsystem
#[derive(Clone)]
pub struct SubsystemClients {
    pub graph: Arc<dyn ContextGraph>,
    pub store: Arc<dyn SecureStore>,
    pub registry: Arc<dyn ArtifactRegistry>,
}

impl SubsystemClients {
    pub fn new(
        graph: Arc<dyn ContextGraph>,
        store: Arc<dyn SecureStore>,
        registry: Arc<dyn ArtifactRegistry>,
    ) -> Self {
        Self {
            graph,
            store,
            registry,
        }
    }

    /// In-memory simulator clients
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryContextGraph::new()),
            Arc::new(InMemorySecureStore::new()),
            Arc::new(InMemoryArtifactRegistry::new()),
        )
    }

    /// HTTP clients for the configured endpoints
    pub fn from_config(config: &crate::config::DataCoreConfig) -> crate::error::Result<Self> {
        if config.simulator {
            return Ok(Self::in_memory());
        }
        Ok(Self::new(
            Arc::new(HttpContextGraph::new(&config.subsystems.graph)?),
            Arc::new(HttpSecureStore::new(&config.subsystems.store)?),
            Arc::new(HttpArtifactRegistry::new(&config.subsystems.registry)?),
        ))
    }
}

impl std::fmt::Debug for SubsystemClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemClients").finish_non_exhaustive()
    }
}
