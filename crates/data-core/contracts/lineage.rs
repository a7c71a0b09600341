//! Lineage record fan-out contracts

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Names of the downstream services a lineage record is routed to, in
/// dispatch order.
pub const LINEAGE_TARGETS: [&str; 3] = ["llm-memory-graph", "llm-registry", "llm-data-vault"];

/// Lineage record reported by an execution engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageRecordPayload {
    #[serde(default)]
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers_executed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// Immediate answer to a lineage record; delivery happens in the background
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageRecordResult {
    pub accepted: bool,
    pub routed_to: Vec<String>,
    /// Supervised task carrying the deliveries
    pub task_id: Uuid,
}
