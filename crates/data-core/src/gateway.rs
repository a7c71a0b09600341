//! Two-phase persistence gateway
//!
//! Phase 1 asks the graph, store and registry subsystems to accept a request
//! concurrently and waits for all three to settle. Anything short of three
//! acceptances invalidates the simulation with a `TerminalFailure`.
//!
//! Phase 2 runs only after full acceptance: post-validation tasks are handed
//! to the `TaskSupervisor` and the gateway returns without waiting for them.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::client::{ClientError, SubsystemClients};
use crate::contracts::{
    AcceptanceResult, ArtifactDescriptor, Attributes, PersistenceRequest, PersistenceResult,
    PostValidationTask, Subsystem, SubsystemAcceptance, TaskType,
};
use crate::error::{DataCoreError, Result, SubsystemFailure, TerminalFailure};
use crate::tasks::{PostValidationHook, TaskSupervisor, TracingHook};

/// Version stamped on every registered artifact descriptor
pub const ARTIFACT_VERSION: &str = "1.0.0";

/// Tasks scheduled unless the gateway is given its own list
pub const DEFAULT_POST_VALIDATION: [TaskType; 2] = [TaskType::Index, TaskType::Audit];

/// Coordinates acceptance across the three persistence subsystems
pub struct PersistenceGateway {
    clients: SubsystemClients,
    supervisor: Arc<TaskSupervisor>,
    hook: Arc<dyn PostValidationHook>,
    post_validation: Vec<TaskType>,
}

impl PersistenceGateway {
    pub fn new(clients: SubsystemClients, supervisor: Arc<TaskSupervisor>) -> Self {
        Self {
            clients,
            supervisor,
            hook: Arc::new(TracingHook),
            post_validation: DEFAULT_POST_VALIDATION.to_vec(),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostValidationHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Replace the scheduled task types
    pub fn with_post_validation(mut self, task_types: Vec<TaskType>) -> Self {
        self.post_validation = task_types;
        self
    }

    pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
        &self.supervisor
    }

    /// Persist a request across all three subsystems.
    ///
    /// Fails with `DataCoreError::InvalidInput` before any subsystem is
    /// called if an identifier is blank, and with `DataCoreError::Terminal`
    /// if any subsystem rejects.
    pub async fn persist(&self, request: PersistenceRequest) -> Result<PersistenceResult> {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(DataCoreError::invalid_input(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            )));
        }

        tracing::info!(
            operation_id = %request.operation_id,
            operation_type = %request.operation_type,
            simulation_id = %request.simulation_id,
            entity_id = %request.entity_id,
            "Persisting"
        );

        let acceptance = self.accept(&request).await;
        if !acceptance.accepted {
            let failure = Self::terminal_failure(&acceptance);
            tracing::error!(
                operation_id = %failure.operation_id(),
                simulation_id = %failure.simulation_id(),
                failed = ?failure.failed_subsystems(),
                "{}",
                failure.message()
            );
            return Err(failure.into());
        }

        let post_validation_tasks = self.schedule_post_validation(request);

        Ok(PersistenceResult {
            success: true,
            operation_id: acceptance.operation_id.clone(),
            simulation_id: acceptance.simulation_id.clone(),
            acceptance,
            post_validation_tasks,
            persisted_at: Utc::now(),
        })
    }

    /// Phase 1: ask every subsystem to accept and wait for all of them
    pub async fn accept(&self, request: &PersistenceRequest) -> AcceptanceResult {
        let (graph, store, registry) = tokio::join!(
            self.accept_graph(request),
            self.accept_store(request),
            self.accept_registry(request),
        );

        let subsystems = [
            (Subsystem::Graph, graph),
            (Subsystem::Store, store),
            (Subsystem::Registry, registry),
        ]
        .into_iter()
        .map(|(subsystem, outcome)| match outcome {
            Ok(receipt) => SubsystemAcceptance::accepted(subsystem, receipt),
            Err(e) => {
                tracing::warn!(subsystem = %subsystem, error = %e, "Subsystem rejected");
                SubsystemAcceptance::rejected(subsystem, e.to_string())
            }
        })
        .collect();

        AcceptanceResult::aggregate(request, subsystems)
    }

    async fn accept_graph(&self, request: &PersistenceRequest) -> std::result::Result<String, ClientError> {
        let mut attributes = Attributes::new();
        attributes.insert("simulationId".to_string(), json!(request.simulation_id));
        attributes.insert("operationType".to_string(), json!(request.operation_type));
        attributes.extend(request.payload.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.clients
            .graph
            .track_context(&request.entity_id, &attributes)
            .await?;

        if let Some(source) = request.lineage_source() {
            self.clients
                .graph
                .record_lineage(source, &request.entity_id, request.operation_type.as_str())
                .await?;
        }

        Ok(format!("graph:{}", request.operation_id))
    }

    async fn accept_store(&self, request: &PersistenceRequest) -> std::result::Result<String, ClientError> {
        let payload = json!({
            "operationId": request.operation_id,
            "operationType": request.operation_type,
            "payload": request.payload,
            "metadata": request.metadata,
        });

        let receipt = self
            .clients
            .store
            .store(&request.storage_key(), &payload)
            .await?;
        Ok(format!("store:{}", receipt))
    }

    async fn accept_registry(&self, request: &PersistenceRequest) -> std::result::Result<String, ClientError> {
        let mut properties = Attributes::new();
        properties.insert("operationId".to_string(), json!(request.operation_id));
        if let Some(metadata) = &request.metadata {
            properties.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let descriptor = ArtifactDescriptor {
            id: request.entity_id.clone(),
            artifact_type: request.operation_type.as_str().to_string(),
            version: ARTIFACT_VERSION.to_string(),
            tags: vec![request.simulation_tag()],
            properties,
        };

        let registered_id = self.clients.registry.register_artifact(&descriptor).await?;
        Ok(format!("registry:{}", registered_id))
    }

    fn terminal_failure(acceptance: &AcceptanceResult) -> TerminalFailure {
        let failures = acceptance
            .rejected()
            .map(|s| SubsystemFailure {
                subsystem: s.subsystem,
                error: s.error.clone().unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();

        TerminalFailure::new(
            acceptance.simulation_id.clone(),
            acceptance.operation_id.clone(),
            acceptance
                .rejection_reason
                .clone()
                .unwrap_or_else(|| "Subsystem(s) rejected".to_string()),
            failures,
        )
    }

    /// Phase 2: hand each configured task to the supervisor
    fn schedule_post_validation(&self, request: PersistenceRequest) -> Vec<PostValidationTask> {
        let request = Arc::new(request);
        self.post_validation
            .iter()
            .map(|&task_type| {
                let hook = Arc::clone(&self.hook);
                let request = Arc::clone(&request);
                self.supervisor
                    .spawn(task_type, async move { hook.run(task_type, &request).await })
            })
            .collect()
    }
}

impl std::fmt::Debug for PersistenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceGateway")
            .field("post_validation", &self.post_validation)
            .finish_non_exhaustive()
    }
}
