//! Execution graph validator.
//!
//! Enforces the hierarchy invariant Session -> Subsystem -> Operation.
//! A graph is invalid if:
//! - the root span is missing or is not a session span
//! - any span references a parent that is not in the graph
//! - no subsystem span hangs directly off the session span
//! - any subsystem span has no operation span directly under it

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::graph::ExecutionGraph;
use crate::span::SpanType;

/// Outcome of validating an execution graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reasons: Vec<String>,
}

impl ValidationResult {
    fn from_reasons(reasons: Vec<String>) -> Self {
        Self {
            valid: reasons.is_empty(),
            reasons,
        }
    }
}

/// Validate the structural invariants of an execution graph.
///
/// A root problem stops validation immediately; every other rule is
/// evaluated and all violations are reported.
pub fn validate_execution_graph(graph: &ExecutionGraph) -> ValidationResult {
    let mut reasons = Vec::new();

    let root = match graph.root() {
        Some(root) => root,
        None => {
            reasons.push(format!("Root span {} not found in spans", graph.root_span_id));
            return ValidationResult::from_reasons(reasons);
        }
    };

    if root.span_type != SpanType::Session {
        reasons.push(format!(
            "Root span type is \"{}\", expected \"{}\"",
            root.span_type,
            SpanType::Session
        ));
        return ValidationResult::from_reasons(reasons);
    }

    let known: HashSet<Uuid> = graph.spans.iter().map(|s| s.span_id).collect();
    for span in &graph.spans {
        if let Some(parent) = span.parent_span_id {
            if !known.contains(&parent) {
                reasons.push(format!(
                    "Span \"{}\" ({}) references non-existent parent {}",
                    span.name, span.span_id, parent
                ));
            }
        }
    }

    let subsystems: Vec<_> = graph
        .children_of(root.span_id, SpanType::Subsystem)
        .collect();
    if subsystems.is_empty() {
        reasons.push("No subsystem-level child spans exist under the session span".to_string());
    }

    for subsystem in graph.spans.iter().filter(|s| s.span_type == SpanType::Subsystem) {
        if graph
            .children_of(subsystem.span_id, SpanType::Operation)
            .next()
            .is_none()
        {
            reasons.push(format!(
                "Subsystem span \"{}\" ({}) has zero operation-level child spans",
                subsystem.name, subsystem.span_id
            ));
        }
    }

    ValidationResult::from_reasons(reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphMetadata, GRAPH_SCHEMA_VERSION};
    use crate::span::ExecutionSpan;
    use chrono::Utc;
    use proptest::prelude::*;

    fn graph_of(root_span_id: Uuid, spans: Vec<ExecutionSpan>) -> ExecutionGraph {
        ExecutionGraph {
            root_span_id,
            spans,
            metadata: GraphMetadata {
                name: "data-core".to_string(),
                created_at: Utc::now(),
                version: GRAPH_SCHEMA_VERSION.to_string(),
                execution_id: None,
                parent_span_id: None,
            },
        }
    }

    fn minimal() -> (ExecutionSpan, ExecutionSpan, ExecutionSpan) {
        let session = ExecutionSpan::new_session("data-core");
        let subsystem = ExecutionSpan::new(Some(session.span_id), SpanType::Subsystem, "graph");
        let operation = ExecutionSpan::new(
            Some(subsystem.span_id),
            SpanType::Operation,
            "graph.track_context",
        );
        (session, subsystem, operation)
    }

    #[test]
    fn test_minimal_graph_is_valid() {
        let (session, subsystem, operation) = minimal();
        let graph = graph_of(session.span_id, vec![session, subsystem, operation]);

        let result = validate_execution_graph(&graph);

        assert!(result.valid);
        assert!(result.reasons.is_empty());
    }

    #[test]
    fn test_session_only_graph_is_invalid() {
        let session = ExecutionSpan::new_session("data-core");
        let graph = graph_of(session.span_id, vec![session]);

        let result = validate_execution_graph(&graph);

        assert!(!result.valid);
        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].contains("No subsystem-level child spans"));
    }

    #[test]
    fn test_subsystem_without_operations_is_invalid() {
        let (session, subsystem, _) = minimal();
        let name = subsystem.name.clone();
        let graph = graph_of(session.span_id, vec![session, subsystem]);

        let result = validate_execution_graph(&graph);

        assert!(!result.valid);
        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].contains(&format!("\"{name}\"")));
        assert!(result.reasons[0].contains("zero operation-level"));
    }

    #[test]
    fn test_missing_root_short_circuits() {
        let (session, subsystem, operation) = minimal();
        let graph = graph_of(Uuid::new_v4(), vec![session, subsystem, operation]);

        let result = validate_execution_graph(&graph);

        assert!(!result.valid);
        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].contains("not found"));
    }

    #[test]
    fn test_non_session_root_short_circuits() {
        let (session, subsystem, operation) = minimal();
        let root = subsystem.span_id;
        let graph = graph_of(root, vec![session, subsystem, operation]);

        let result = validate_execution_graph(&graph);

        assert_eq!(result.reasons.len(), 1);
        assert!(result.reasons[0].contains("expected \"session\""));
    }

    #[test]
    fn test_dangling_parents_are_all_reported() {
        let (session, subsystem, operation) = minimal();
        let orphan_a = ExecutionSpan::new(Some(Uuid::new_v4()), SpanType::Operation, "orphan-a");
        let orphan_b = ExecutionSpan::new(Some(Uuid::new_v4()), SpanType::Operation, "orphan-b");
        let graph = graph_of(
            session.span_id,
            vec![session, subsystem, operation, orphan_a, orphan_b],
        );

        let result = validate_execution_graph(&graph);

        assert!(!result.valid);
        assert_eq!(result.reasons.len(), 2);
        assert!(result.reasons.iter().all(|r| r.contains("non-existent parent")));
    }

    #[test]
    fn test_all_rules_reported_together() {
        let session = ExecutionSpan::new_session("data-core");
        let stray = ExecutionSpan::new(Some(Uuid::new_v4()), SpanType::Subsystem, "stray");
        let graph = graph_of(session.span_id, vec![session, stray]);

        let result = validate_execution_graph(&graph);

        // dangling parent, no subsystem under session, subsystem without operations
        assert_eq!(result.reasons.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_fully_populated_hierarchy_is_valid(ops in proptest::collection::vec(1usize..4, 1..6)) {
            let session = ExecutionSpan::new_session("data-core");
            let root = session.span_id;
            let mut spans = vec![session];
            for (i, count) in ops.iter().enumerate() {
                let subsystem = ExecutionSpan::new(Some(root), SpanType::Subsystem, format!("sub-{i}"));
                let subsystem_id = subsystem.span_id;
                spans.push(subsystem);
                for j in 0..*count {
                    spans.push(ExecutionSpan::new(Some(subsystem_id), SpanType::Operation, format!("sub-{i}.op-{j}")));
                }
            }

            let result = validate_execution_graph(&graph_of(root, spans));
            prop_assert!(result.valid);
        }

        #[test]
        fn prop_each_empty_subsystem_is_named(empty in 1usize..5, populated in 0usize..4) {
            let session = ExecutionSpan::new_session("data-core");
            let root = session.span_id;
            let mut spans = vec![session];
            for i in 0..empty {
                spans.push(ExecutionSpan::new(Some(root), SpanType::Subsystem, format!("empty-{i}")));
            }
            for i in 0..populated {
                let subsystem = ExecutionSpan::new(Some(root), SpanType::Subsystem, format!("full-{i}"));
                let id = subsystem.span_id;
                spans.push(subsystem);
                spans.push(ExecutionSpan::new(Some(id), SpanType::Operation, "op"));
            }

            let result = validate_execution_graph(&graph_of(root, spans));
            prop_assert!(!result.valid);
            prop_assert_eq!(result.reasons.len(), empty);
            for i in 0..empty {
                let needle = format!("\"empty-{}\"", i);
                prop_assert!(result.reasons.iter().any(|r| r.contains(&needle)));
            }
        }
    }
}
