//! Execution context passed in by the engine that invokes a session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution context provided by the caller when it starts a session.
///
/// Contains the identifiers needed to link this session's graph back into
/// the caller's global execution graph. They are recorded in the graph
/// metadata; the session span itself stays parentless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Unique identifier for the overall execution.
    pub execution_id: Uuid,
    /// Span ID of the caller-side span that started this session.
    pub parent_span_id: Uuid,
}

impl ExecutionContext {
    pub fn new(execution_id: Uuid, parent_span_id: Uuid) -> Self {
        Self {
            execution_id,
            parent_span_id,
        }
    }
}
