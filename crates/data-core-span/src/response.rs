//! Finalized execution results and the response envelope that carries them.

use serde::{Deserialize, Serialize};

use crate::graph::ExecutionGraph;

/// A finalized, validated execution graph.
///
/// The graph is always present, valid or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub execution_graph: ExecutionGraph,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reasons: Option<Vec<String>>,
}

impl ExecutionResult {
    pub fn valid(execution_graph: ExecutionGraph) -> Self {
        Self {
            success: true,
            execution_graph,
            failure_reasons: None,
        }
    }

    pub fn invalid(execution_graph: ExecutionGraph, reasons: Vec<String>) -> Self {
        Self {
            success: false,
            execution_graph,
            failure_reasons: Some(reasons),
        }
    }

    pub fn reasons(&self) -> &[String] {
        self.failure_reasons.as_deref().unwrap_or(&[])
    }
}

/// Response envelope for instrumented endpoints.
///
/// Always includes the execution result, even on failure. `success` is
/// `false` if the operation failed or if the execution graph is invalid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>, F: Deserialize<'de>"))]
pub struct ExecutionEnvelope<T, F = serde_json::Value> {
    pub success: bool,
    /// Operation output (present on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured failure detail (present on failure, when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<F>,
    pub execution: ExecutionResult,
}

impl<T, F> ExecutionEnvelope<T, F> {
    /// Create a successful response. `success` still follows the execution
    /// result, so an invalid graph turns a successful operation into a
    /// failed response.
    pub fn success(data: T, execution: ExecutionResult) -> Self {
        Self {
            success: execution.success,
            data: Some(data),
            error: None,
            failure: None,
            execution,
        }
    }

    /// Create a failure response.
    pub fn failure(error: impl Into<String>, failure: Option<F>, execution: ExecutionResult) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            failure,
            execution,
        }
    }
}
