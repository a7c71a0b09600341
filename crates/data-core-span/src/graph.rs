//! Span graph for one coordination session.
//!
//! Owns the append-only span list, exposes span creation and terminal
//! transitions, and finalizes into a validated `ExecutionGraph`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::response::ExecutionResult;
use crate::span::{ExecutionArtifact, ExecutionEvidence, ExecutionSpan, SpanStatus, SpanType};
use crate::validator::validate_execution_graph;

/// Schema version stamped into every finalized graph.
pub const GRAPH_SCHEMA_VERSION: &str = "1.0.0";

/// Descriptive metadata of a finalized graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Name of the session that produced the graph.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<Uuid>,
}

/// Immutable snapshot of a session's spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionGraph {
    pub root_span_id: Uuid,
    pub spans: Vec<ExecutionSpan>,
    pub metadata: GraphMetadata,
}

impl ExecutionGraph {
    pub fn span(&self, span_id: Uuid) -> Option<&ExecutionSpan> {
        self.spans.iter().find(|s| s.span_id == span_id)
    }

    pub fn root(&self) -> Option<&ExecutionSpan> {
        self.span(self.root_span_id)
    }

    /// Direct children of `parent` with the given type.
    pub fn children_of(
        &self,
        parent: Uuid,
        span_type: SpanType,
    ) -> impl Iterator<Item = &ExecutionSpan> + '_ {
        self.spans
            .iter()
            .filter(move |s| s.span_type == span_type && s.parent_span_id == Some(parent))
    }
}

/// Options for a span being created.
#[derive(Debug, Clone)]
pub struct NewSpan {
    pub parent_span_id: Option<Uuid>,
    pub span_type: SpanType,
    pub name: String,
    pub artifacts: Vec<ExecutionArtifact>,
    pub evidence: Vec<ExecutionEvidence>,
}

impl NewSpan {
    pub fn new(parent_span_id: Option<Uuid>, span_type: SpanType, name: impl Into<String>) -> Self {
        Self {
            parent_span_id,
            span_type,
            name: name.into(),
            artifacts: Vec::new(),
            evidence: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: ExecutionArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_evidence(mut self, evidence: ExecutionEvidence) -> Self {
        self.evidence.push(evidence);
        self
    }
}

#[derive(Debug, Default)]
struct GraphState {
    spans: Vec<ExecutionSpan>,
    index: HashMap<Uuid, usize>,
}

impl GraphState {
    fn push(&mut self, span: ExecutionSpan) {
        self.index.entry(span.span_id).or_insert(self.spans.len());
        self.spans.push(span);
    }

    fn get(&self, span_id: Uuid) -> Option<&ExecutionSpan> {
        self.index.get(&span_id).and_then(|&position| self.spans.get(position))
    }

    fn get_mut(&mut self, span_id: Uuid) -> Option<&mut ExecutionSpan> {
        let position = *self.index.get(&span_id)?;
        self.spans.get_mut(position)
    }
}

/// The span graph of one coordination session.
///
/// Created with exactly one running session span; spans are only ever
/// appended. A single mutex guards both list growth and the per-span
/// terminal writes, so the graph can be shared (`Arc<SpanGraph>`) by
/// concurrently running operations.
#[derive(Debug)]
pub struct SpanGraph {
    name: String,
    session_span_id: Uuid,
    context: Option<ExecutionContext>,
    state: Mutex<GraphState>,
}

impl SpanGraph {
    /// Create a graph with its session span.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let session = ExecutionSpan::new_session(name.clone());
        let session_span_id = session.span_id;

        let mut state = GraphState::default();
        state.push(session);

        tracing::debug!(session = %name, span_id = %session_span_id, "Opened execution session");

        Self {
            name,
            session_span_id,
            context: None,
            state: Mutex::new(state),
        }
    }

    /// Create a graph linked to the caller's execution context.
    pub fn with_context(name: impl Into<String>, context: ExecutionContext) -> Self {
        let mut graph = Self::new(name);
        graph.context = Some(context);
        graph
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_span_id(&self) -> Uuid {
        self.session_span_id
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a new running span and return its id.
    pub fn create_span(&self, new_span: NewSpan) -> Uuid {
        let mut span = ExecutionSpan::new(new_span.parent_span_id, new_span.span_type, new_span.name);
        span.artifacts = new_span.artifacts;
        span.evidence = new_span.evidence;
        let span_id = span.span_id;

        tracing::trace!(
            span_id = %span_id,
            span_type = %span.span_type,
            name = %span.name,
            "Created span"
        );

        self.lock().push(span);
        span_id
    }

    /// Mark a span completed.
    ///
    /// Returns `false` if the id is unknown or the span was already terminal.
    pub fn complete_span(&self, span_id: Uuid) -> bool {
        self.complete_span_with(span_id, Vec::new(), Vec::new())
    }

    /// Mark a span completed and append artifacts and evidence to it.
    pub fn complete_span_with(
        &self,
        span_id: Uuid,
        artifacts: Vec<ExecutionArtifact>,
        evidence: Vec<ExecutionEvidence>,
    ) -> bool {
        match self.lock().get_mut(span_id) {
            Some(span) => span.complete(artifacts, evidence),
            None => {
                tracing::debug!(span_id = %span_id, "Ignoring completion of unknown span");
                false
            }
        }
    }

    /// Mark a span failed with an error message.
    ///
    /// Returns `false` if the id is unknown or the span was already terminal.
    pub fn fail_span(&self, span_id: Uuid, error: impl Into<String>) -> bool {
        match self.lock().get_mut(span_id) {
            Some(span) => span.fail(error),
            None => {
                tracing::debug!(span_id = %span_id, "Ignoring failure of unknown span");
                false
            }
        }
    }

    /// Complete every still-running span of the given type. Returns how many
    /// spans were closed.
    pub fn complete_running(&self, span_type: SpanType) -> usize {
        let mut state = self.lock();
        state
            .spans
            .iter_mut()
            .filter(|s| s.span_type == span_type)
            .map(|s| s.complete(Vec::new(), Vec::new()))
            .filter(|closed| *closed)
            .count()
    }

    /// Append spans reported by an external system verbatim.
    pub fn merge_spans(&self, external: impl IntoIterator<Item = ExecutionSpan>) {
        let mut state = self.lock();
        for span in external {
            state.push(span);
        }
    }

    /// Snapshot of one span.
    pub fn span(&self, span_id: Uuid) -> Option<ExecutionSpan> {
        self.lock().get(span_id).cloned()
    }

    /// Snapshot of all spans in creation order.
    pub fn spans(&self) -> Vec<ExecutionSpan> {
        self.lock().spans.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the session span, snapshot the graph and validate it.
    ///
    /// The graph is always returned. When validation fails the session span
    /// is marked failed with the joined reasons, in the live graph and in
    /// the snapshot alike.
    pub fn finalize(&self) -> ExecutionResult {
        let mut state = self.lock();

        if let Some(session) = state.get_mut(self.session_span_id) {
            session.complete(Vec::new(), Vec::new());
        }

        let mut graph = ExecutionGraph {
            root_span_id: self.session_span_id,
            spans: state.spans.clone(),
            metadata: GraphMetadata {
                name: self.name.clone(),
                created_at: Utc::now(),
                version: GRAPH_SCHEMA_VERSION.to_string(),
                execution_id: self.context.map(|c| c.execution_id),
                parent_span_id: self.context.map(|c| c.parent_span_id),
            },
        };

        let validation = validate_execution_graph(&graph);
        if validation.valid {
            tracing::debug!(session = %self.name, spans = graph.spans.len(), "Execution graph is valid");
            return ExecutionResult::valid(graph);
        }

        let verdict = validation.reasons.join("; ");
        tracing::warn!(session = %self.name, reasons = %verdict, "Execution graph is invalid");

        if let Some(session) = state.get_mut(self.session_span_id) {
            mark_invalid(session, &verdict);
        }
        if let Some(session) = graph
            .spans
            .iter_mut()
            .find(|s| s.span_id == self.session_span_id)
        {
            mark_invalid(session, &verdict);
        }

        ExecutionResult::invalid(graph, validation.reasons)
    }
}

fn mark_invalid(session: &mut ExecutionSpan, verdict: &str) {
    session.status = SpanStatus::Failed;
    session.error = Some(verdict.to_string());
    if session.end_time.is_none() {
        session.end_time = Some(Utc::now());
    }
}
