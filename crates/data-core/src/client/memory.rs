//! In-memory subsystem clients
//!
//! Used in simulator mode and tests. Each client keeps what it accepted and
//! can be configured to reject every call with a fixed message.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{ArtifactRegistry, ClientError, ClientResult, ContextGraph, SecureStore};
use crate::contracts::{ArtifactDescriptor, Attributes};

/// Lineage edge recorded by the in-memory context graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEdge {
    pub source_id: String,
    pub target_id: String,
    pub operation: String,
}

fn rejection(failure: &Option<String>) -> ClientResult<()> {
    match failure {
        Some(message) => Err(ClientError::Rejected(message.clone())),
        None => Ok(()),
    }
}

/// In-memory context graph
#[derive(Debug, Default)]
pub struct InMemoryContextGraph {
    contexts: RwLock<HashMap<String, Vec<Attributes>>>,
    lineage: RwLock<Vec<LineageEdge>>,
    failure: Option<String>,
}

impl InMemoryContextGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph that rejects every call with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Every attribute set tracked for an entity, oldest first
    pub fn history(&self, entity_id: &str) -> Vec<Attributes> {
        self.contexts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn lineage(&self) -> Vec<LineageEdge> {
        self.lineage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContextGraph for InMemoryContextGraph {
    async fn track_context(&self, entity_id: &str, attributes: &Attributes) -> ClientResult<()> {
        tracing::debug!(entity_id, attributes = attributes.len(), "Track context");
        rejection(&self.failure)?;

        self.contexts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(entity_id.to_string())
            .or_default()
            .push(attributes.clone());
        Ok(())
    }

    async fn record_lineage(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
    ) -> ClientResult<()> {
        tracing::debug!(source_id, target_id, operation, "Record lineage");
        rejection(&self.failure)?;

        self.lineage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LineageEdge {
                source_id: source_id.to_string(),
                target_id: target_id.to_string(),
                operation: operation.to_string(),
            });
        Ok(())
    }

    async fn context_history(&self, entity_id: &str) -> ClientResult<Vec<Attributes>> {
        rejection(&self.failure)?;
        Ok(self.history(entity_id))
    }
}

/// In-memory secure store
#[derive(Debug, Default)]
pub struct InMemorySecureStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
    failure: Option<String>,
}

impl InMemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects every call with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecureStore for InMemorySecureStore {
    async fn store(&self, key: &str, payload: &serde_json::Value) -> ClientResult<String> {
        tracing::debug!(key, "Store");
        rejection(&self.failure)?;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), payload.clone());
        Ok(key.to_string())
    }

    async fn retrieve(&self, key: &str) -> ClientResult<Option<serde_json::Value>> {
        rejection(&self.failure)?;
        Ok(self.get(key))
    }
}

/// In-memory artifact registry
#[derive(Debug, Default)]
pub struct InMemoryArtifactRegistry {
    artifacts: RwLock<HashMap<String, ArtifactDescriptor>>,
    failure: Option<String>,
}

impl InMemoryArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that rejects every call with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<ArtifactDescriptor> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Artifacts carrying `tag`
    pub fn search_by_tag(&self, tag: &str) -> Vec<ArtifactDescriptor> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|a| a.tags.iter().any(|t| t == tag))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ArtifactRegistry for InMemoryArtifactRegistry {
    async fn register_artifact(&self, descriptor: &ArtifactDescriptor) -> ClientResult<String> {
        tracing::debug!(artifact_id = %descriptor.id, artifact_type = %descriptor.artifact_type, "Register artifact");
        rejection(&self.failure)?;

        self.artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.id.clone(), descriptor.clone());
        Ok(descriptor.id.clone())
    }

    async fn get_artifact(&self, id: &str) -> ClientResult<Option<ArtifactDescriptor>> {
        rejection(&self.failure)?;
        Ok(self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_context_graph_keeps_history() {
        let graph = InMemoryContextGraph::new();
        let mut attributes = Attributes::new();
        attributes.insert("simulationId".to_string(), json!("sim-1"));

        graph.track_context("e-1", &attributes).await.unwrap();
        graph.track_context("e-1", &attributes).await.unwrap();
        graph.record_lineage("up", "e-1", "context:persist").await.unwrap();

        assert_eq!(graph.history("e-1").len(), 2);
        assert_eq!(graph.lineage()[0].source_id, "up");
    }

    #[tokio::test]
    async fn test_failing_clients_reject_with_message() {
        let store = InMemorySecureStore::failing("store unavailable");
        let err = store.store("k", &json!({})).await.unwrap_err();

        assert_eq!(err.to_string(), "store unavailable");
        assert!(store.is_empty());

        let registry = InMemoryArtifactRegistry::failing("registry down");
        let descriptor = ArtifactDescriptor {
            id: "a".to_string(),
            artifact_type: "data:store".to_string(),
            version: "1.0.0".to_string(),
            tags: vec![],
            properties: Attributes::new(),
        };
        assert_eq!(
            registry.register_artifact(&descriptor).await.unwrap_err(),
            ClientError::rejected("registry down")
        );
    }

    #[tokio::test]
    async fn test_registry_search_by_tag() {
        let registry = InMemoryArtifactRegistry::new();
        let descriptor = ArtifactDescriptor {
            id: "a".to_string(),
            artifact_type: "artifact:register".to_string(),
            version: "1.0.0".to_string(),
            tags: vec!["simulation:sim-1".to_string()],
            properties: Attributes::new(),
        };

        let id = registry.register_artifact(&descriptor).await.unwrap();

        assert_eq!(id, "a");
        assert_eq!(registry.search_by_tag("simulation:sim-1").len(), 1);
        assert!(registry.search_by_tag("simulation:other").is_empty());
    }

    #[tokio::test]
    async fn test_reads_return_what_was_accepted() {
        let graph = InMemoryContextGraph::new();
        let mut attributes = Attributes::new();
        attributes.insert("step".to_string(), json!(1));
        graph.track_context("e-1", &attributes).await.unwrap();
        assert_eq!(graph.context_history("e-1").await.unwrap(), vec![attributes]);
        assert!(graph.context_history("e-2").await.unwrap().is_empty());

        let store = InMemorySecureStore::new();
        store.store("sim:s:e", &json!({"rows": 3})).await.unwrap();
        assert_eq!(store.retrieve("sim:s:e").await.unwrap(), Some(json!({"rows": 3})));
        assert_eq!(store.retrieve("sim:s:other").await.unwrap(), None);

        let registry = InMemoryArtifactRegistry::failing("registry down");
        assert_eq!(
            registry.get_artifact("a").await.unwrap_err(),
            ClientError::rejected("registry down")
        );
    }
}
