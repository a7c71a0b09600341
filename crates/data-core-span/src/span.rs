//! Core execution span types.
//!
//! Defines `ExecutionSpan`, `SpanType` and `SpanStatus` used to build the
//! three-level execution graph: Session -> Subsystem -> Operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an execution span.
///
/// `Running` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    Running,
    Completed,
    Failed,
}

impl SpanStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SpanStatus::Running)
    }
}

/// Type of execution span in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    Session,
    Subsystem,
    Operation,
}

impl SpanType {
    pub fn as_str(self) -> &'static str {
        match self {
            SpanType::Session => "session",
            SpanType::Subsystem => "subsystem",
            SpanType::Operation => "operation",
        }
    }
}

impl std::fmt::Display for SpanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something an operation produced, by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub reference: String,
}

impl ExecutionArtifact {
    pub fn new(
        id: impl Into<String>,
        artifact_type: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            artifact_type: artifact_type.into(),
            reference: reference.into(),
        }
    }
}

/// Verifiable evidence backing an operation's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEvidence {
    pub id: String,
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// A single span in the execution graph.
///
/// Spans are stored flat; the hierarchy is expressed only through
/// `parent_span_id`, which is a reference and never implies ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSpan {
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub span_type: SpanType,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: SpanStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ExecutionArtifact>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<ExecutionEvidence>,
}

impl ExecutionSpan {
    /// Create a new running span.
    pub fn new(parent_span_id: Option<Uuid>, span_type: SpanType, name: impl Into<String>) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            parent_span_id,
            span_type,
            name: name.into(),
            start_time: Utc::now(),
            end_time: None,
            status: SpanStatus::Running,
            error: None,
            artifacts: Vec::new(),
            evidence: Vec::new(),
        }
    }

    /// Create the root span of a session. It never has a parent.
    pub fn new_session(name: impl Into<String>) -> Self {
        Self::new(None, SpanType::Session, name)
    }

    pub fn is_running(&self) -> bool {
        self.status == SpanStatus::Running
    }

    /// Mark the span as completed, appending any artifacts and evidence.
    ///
    /// Returns `false` without touching the span if it already reached a
    /// terminal state.
    pub fn complete(
        &mut self,
        artifacts: Vec<ExecutionArtifact>,
        evidence: Vec<ExecutionEvidence>,
    ) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = SpanStatus::Completed;
        self.end_time = Some(Utc::now());
        self.artifacts.extend(artifacts);
        self.evidence.extend(evidence);
        true
    }

    /// Mark the span as failed with an error message.
    ///
    /// Returns `false` without touching the span if it already reached a
    /// terminal state.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.status = SpanStatus::Failed;
        self.end_time = Some(Utc::now());
        self.error = Some(error.into());
        true
    }

    /// Elapsed time in milliseconds, once the span has ended.
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0) as u64)
    }
}
