//! Data Core Contracts
//!
//! Plain-data request and result types of the simulation persistence
//! gateway. Every type here round-trips through JSON without loss.

mod lineage;
mod tasks;

pub use lineage::*;
pub use tasks::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form key/value data carried by requests.
pub type Attributes = HashMap<String, serde_json::Value>;

/// Kind of simulation data being persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    #[serde(rename = "context:persist")]
    ContextPersist,
    #[serde(rename = "artifact:register")]
    ArtifactRegister,
    #[serde(rename = "data:store")]
    DataStore,
    #[serde(rename = "lineage:record")]
    LineageRecord,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::ContextPersist => "context:persist",
            OperationType::ArtifactRegister => "artifact:register",
            OperationType::DataStore => "data:store",
            OperationType::LineageRecord => "lineage:record",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three subsystems every persistence must be accepted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    /// Context / lineage graph
    Graph,
    /// Secure content store
    Store,
    /// Metadata registry
    Registry,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [Subsystem::Graph, Subsystem::Store, Subsystem::Registry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Graph => "graph",
            Subsystem::Store => "store",
            Subsystem::Registry => "registry",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload submitted to the gateway for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceRequest {
    /// Unique ID for this persistence operation
    pub operation_id: String,
    pub operation_type: OperationType,
    /// Simulation this persistence belongs to
    pub simulation_id: String,
    /// Primary entity ID (context, artifact, data...)
    pub entity_id: String,
    #[serde(default)]
    pub payload: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Attributes>,
}

impl PersistenceRequest {
    pub fn new(
        operation_id: impl Into<String>,
        operation_type: OperationType,
        simulation_id: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            operation_type,
            simulation_id: simulation_id.into(),
            entity_id: entity_id.into(),
            payload: Attributes::new(),
            metadata: None,
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(Attributes::new)
            .insert(key.into(), value);
        self
    }

    /// Key under which the payload is kept in the secure store
    pub fn storage_key(&self) -> String {
        format!("sim:{}:{}", self.simulation_id, self.entity_id)
    }

    /// Registry tag linking an artifact to its simulation
    pub fn simulation_tag(&self) -> String {
        format!("simulation:{}", self.simulation_id)
    }

    /// Upstream entity this one derives from, if the caller declared one
    pub fn lineage_source(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("lineageSource"))
            .and_then(|v| v.as_str())
    }

    /// Check the identifiers a request cannot do without
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.operation_id.trim().is_empty() {
            missing.push("operationId");
        }
        if self.simulation_id.trim().is_empty() {
            missing.push("simulationId");
        }
        if self.entity_id.trim().is_empty() {
            missing.push("entityId");
        }
        missing
    }
}

/// Artifact metadata submitted to the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub properties: Attributes,
}

/// Result from a single subsystem's acceptance phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemAcceptance {
    pub subsystem: Subsystem,
    pub accepted: bool,
    /// Subsystem-local reference for the accepted data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    /// Error message if rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
}

impl SubsystemAcceptance {
    pub fn accepted(subsystem: Subsystem, receipt: impl Into<String>) -> Self {
        Self {
            subsystem,
            accepted: true,
            receipt: Some(receipt.into()),
            error: None,
            accepted_at: Some(Utc::now()),
        }
    }

    pub fn rejected(subsystem: Subsystem, error: impl Into<String>) -> Self {
        Self {
            subsystem,
            accepted: false,
            receipt: None,
            error: Some(error.into()),
            accepted_at: None,
        }
    }
}

/// Phase 1 acceptance result: accepted only if every subsystem accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceResult {
    pub accepted: bool,
    pub operation_id: String,
    pub simulation_id: String,
    pub subsystems: Vec<SubsystemAcceptance>,
    /// Set only when not accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Set only when accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
}

impl AcceptanceResult {
    /// Aggregate per-subsystem outcomes for a request
    pub fn aggregate(request: &PersistenceRequest, subsystems: Vec<SubsystemAcceptance>) -> Self {
        let accepted = subsystems.iter().all(|s| s.accepted);

        let rejection_reason = if accepted {
            None
        } else {
            let rejected: Vec<String> = subsystems
                .iter()
                .filter(|s| !s.accepted)
                .map(|s| format!("{}: {}", s.subsystem, s.error.as_deref().unwrap_or("unknown")))
                .collect();
            Some(format!("Subsystem(s) rejected: {}", rejected.join("; ")))
        };

        Self {
            accepted,
            operation_id: request.operation_id.clone(),
            simulation_id: request.simulation_id.clone(),
            subsystems,
            rejection_reason,
            accepted_at: accepted.then(Utc::now),
        }
    }

    /// Subsystems that rejected, in call order
    pub fn rejected(&self) -> impl Iterator<Item = &SubsystemAcceptance> {
        self.subsystems.iter().filter(|s| !s.accepted)
    }
}

/// Final persistence result returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceResult {
    pub success: bool,
    pub operation_id: String,
    pub simulation_id: String,
    pub acceptance: AcceptanceResult,
    /// Snapshots of the scheduled post-validation tasks, taken when they
    /// were scheduled. Poll the task supervisor for their current state.
    pub post_validation_tasks: Vec<PostValidationTask>,
    pub persisted_at: DateTime<Utc>,
}
