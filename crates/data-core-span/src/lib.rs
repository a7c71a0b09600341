//! Execution span graph for LLM Data Core coordination sessions.
//!
//! Every remote call made during a session is recorded as a span in a
//! three-level, causally ordered graph that is validated before a session
//! reports success.
//!
//! # Span Hierarchy
//!
//! ```text
//! Session (one per coordination session)
//!   └─ Subsystem (one per external subsystem used: graph, store, registry)
//!       └─ Operation (one per call made against that subsystem)
//! ```
//!
//! # Usage
//!
//! 1. Create a `SpanGraph` per session (optionally linked to an `ExecutionContext`).
//! 2. Record subsystem and operation spans as calls are made.
//! 3. Call `SpanGraph::finalize` to get a validated `ExecutionResult`.
//! 4. Wrap endpoint output with `ExecutionEnvelope` so the graph always travels with it.

pub mod context;
pub mod extract;
pub mod graph;
pub mod response;
pub mod span;
pub mod validator;

pub use context::ExecutionContext;
pub use extract::ExecutionContextExtractor;
pub use graph::{ExecutionGraph, GraphMetadata, NewSpan, SpanGraph, GRAPH_SCHEMA_VERSION};
pub use response::{ExecutionEnvelope, ExecutionResult};
pub use span::{ExecutionArtifact, ExecutionEvidence, ExecutionSpan, SpanStatus, SpanType};
pub use validator::{validate_execution_graph, ValidationResult};
