//! Coordination sessions
//!
//! A `DataCore` session owns one `SpanGraph`. Every subsystem client it is
//! given is wrapped so that each call lands in that graph, and the session's
//! gateway only ever talks to the wrapped clients.

use data_core_span::{ExecutionContext, ExecutionResult, ExecutionSpan, SpanGraph};
use std::sync::Arc;

use crate::client::{ArtifactRegistry, ContextGraph, SecureStore, SubsystemClients};
use crate::config::DataCoreConfig;
use crate::contracts::{
    ArtifactDescriptor, Attributes, PersistenceRequest, PersistenceResult, Subsystem,
};
use crate::error::{DataCoreError, Result};
use crate::gateway::PersistenceGateway;
use crate::instrument::{finalize_subsystem_spans, Instrumented};
use crate::tasks::{PostValidationHook, TaskSupervisor};

/// One coordination session
#[derive(Debug)]
pub struct DataCore {
    graph: Arc<SpanGraph>,
    clients: SubsystemClients,
    gateway: PersistenceGateway,
}

impl DataCore {
    pub fn new(
        clients: SubsystemClients,
        config: &DataCoreConfig,
        context: Option<ExecutionContext>,
        supervisor: Arc<TaskSupervisor>,
    ) -> Self {
        let graph = Arc::new(match context {
            Some(context) => SpanGraph::with_context(config.name.clone(), context),
            None => SpanGraph::new(config.name.clone()),
        });

        let instrumented = SubsystemClients::new(
            Arc::new(Instrumented::for_subsystem(
                clients.graph,
                graph.clone(),
                Subsystem::Graph,
            )),
            Arc::new(Instrumented::for_subsystem(
                clients.store,
                graph.clone(),
                Subsystem::Store,
            )),
            Arc::new(Instrumented::for_subsystem(
                clients.registry,
                graph.clone(),
                Subsystem::Registry,
            )),
        );

        let gateway = PersistenceGateway::new(instrumented.clone(), supervisor)
            .with_post_validation(config.post_validation.clone());

        Self {
            graph,
            clients: instrumented,
            gateway,
        }
    }

    /// Use `hook` for this session's post-validation tasks
    pub fn with_hook(mut self, hook: Arc<dyn PostValidationHook>) -> Self {
        self.gateway = self.gateway.with_hook(hook);
        self
    }

    pub async fn persist(&self, request: PersistenceRequest) -> Result<PersistenceResult> {
        self.gateway.persist(request).await
    }

    /// Every context recorded for an entity, oldest first
    pub async fn query_context(&self, entity_id: &str) -> Result<Vec<Attributes>> {
        require("entityId", entity_id)?;
        self.clients
            .graph
            .context_history(entity_id)
            .await
            .map_err(|e| DataCoreError::subsystem(Subsystem::Graph, e))
    }

    pub async fn lookup_artifact(&self, artifact_id: &str) -> Result<Option<ArtifactDescriptor>> {
        require("artifactId", artifact_id)?;
        self.clients
            .registry
            .get_artifact(artifact_id)
            .await
            .map_err(|e| DataCoreError::subsystem(Subsystem::Registry, e))
    }

    /// Payload kept under a storage key (`sim:{simulationId}:{entityId}`)
    pub async fn get_data(&self, key: &str) -> Result<Option<serde_json::Value>> {
        require("key", key)?;
        self.clients
            .store
            .retrieve(key)
            .await
            .map_err(|e| DataCoreError::subsystem(Subsystem::Store, e))
    }

    /// Absorb spans reported by an external system
    pub fn merge_spans(&self, spans: impl IntoIterator<Item = ExecutionSpan>) {
        self.graph.merge_spans(spans);
    }

    pub fn span_graph(&self) -> &Arc<SpanGraph> {
        &self.graph
    }

    pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
        self.gateway.supervisor()
    }

    /// Close the session's subsystem spans and finalize its graph
    pub fn execution_result(&self) -> ExecutionResult {
        let closed = finalize_subsystem_spans(&self.graph);
        let result = self.graph.finalize();
        tracing::debug!(
            session = %self.graph.name(),
            subsystem_spans = closed,
            spans = result.execution_graph.spans.len(),
            success = result.success,
            "Session finalized"
        );
        result
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DataCoreError::invalid_input(format!("{} is required", field)));
    }
    Ok(())
}
