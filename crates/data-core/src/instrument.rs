//! Span instrumentation for subsystem clients
//!
//! `Instrumented<C>` implements the same client trait as the `C` it wraps.
//! The first call through a wrapper opens one subsystem span under the
//! session span; every call opens an operation span under it named
//! `{subsystem}.{operation}` and resolves it from the call's outcome. The
//! wrapped call's result is returned untouched. A call that never settles
//! (its future dropped by a timeout, or a panic) fails its span.

use async_trait::async_trait;
use data_core_span::{NewSpan, SpanGraph, SpanType};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::client::{ArtifactRegistry, ClientResult, ContextGraph, SecureStore};
use crate::contracts::{ArtifactDescriptor, Attributes, Subsystem};

/// Fails an operation span on drop unless its call settled
struct PendingOperation<'a> {
    graph: &'a SpanGraph,
    span_id: Uuid,
    settled: bool,
}

impl Drop for PendingOperation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let reason = if std::thread::panicking() {
            "panicked"
        } else {
            "cancelled"
        };
        tracing::debug!(span_id = %self.span_id, reason, "Operation did not settle");
        self.graph.fail_span(self.span_id, reason);
    }
}

/// A subsystem client whose calls are recorded in a `SpanGraph`
pub struct Instrumented<C> {
    inner: C,
    graph: Arc<SpanGraph>,
    name: String,
    subsystem_span: OnceLock<Uuid>,
}

impl<C> Instrumented<C> {
    pub fn new(inner: C, graph: Arc<SpanGraph>, name: impl Into<String>) -> Self {
        Self {
            inner,
            graph,
            name: name.into(),
            subsystem_span: OnceLock::new(),
        }
    }

    /// Wrap a client for one of the three persistence subsystems
    pub fn for_subsystem(inner: C, graph: Arc<SpanGraph>, subsystem: Subsystem) -> Self {
        Self::new(inner, graph, subsystem.as_str())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Subsystem span id, if a call has been made yet
    pub fn subsystem_span_id(&self) -> Option<Uuid> {
        self.subsystem_span.get().copied()
    }

    fn ensure_subsystem_span(&self) -> Uuid {
        *self.subsystem_span.get_or_init(|| {
            let span_id = self.graph.create_span(NewSpan::new(
                Some(self.graph.session_span_id()),
                SpanType::Subsystem,
                self.name.clone(),
            ));
            tracing::debug!(subsystem = %self.name, span_id = %span_id, "Opened subsystem span");
            span_id
        })
    }

    /// Run `call` inside an operation span
    pub async fn observe<T, E, F>(&self, operation: &str, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let parent = self.ensure_subsystem_span();
        let span_id = self.graph.create_span(NewSpan::new(
            Some(parent),
            SpanType::Operation,
            format!("{}.{}", self.name, operation),
        ));

        let mut pending = PendingOperation {
            graph: &self.graph,
            span_id,
            settled: false,
        };

        let outcome = call.await;
        pending.settled = true;
        match &outcome {
            Ok(_) => {
                self.graph.complete_span(span_id);
            }
            Err(e) => {
                tracing::debug!(subsystem = %self.name, operation, error = %e, "Operation failed");
                self.graph.fail_span(span_id, e.to_string());
            }
        }
        outcome
    }
}

impl<C> std::fmt::Debug for Instrumented<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumented")
            .field("name", &self.name)
            .field("subsystem_span", &self.subsystem_span.get())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C: ContextGraph> ContextGraph for Instrumented<C> {
    async fn track_context(&self, entity_id: &str, attributes: &Attributes) -> ClientResult<()> {
        self.observe("track_context", self.inner.track_context(entity_id, attributes))
            .await
    }

    async fn record_lineage(
        &self,
        source_id: &str,
        target_id: &str,
        operation: &str,
    ) -> ClientResult<()> {
        self.observe(
            "record_lineage",
            self.inner.record_lineage(source_id, target_id, operation),
        )
        .await
    }

    async fn context_history(&self, entity_id: &str) -> ClientResult<Vec<Attributes>> {
        self.observe("context_history", self.inner.context_history(entity_id))
            .await
    }
}

#[async_trait]
impl<C: SecureStore> SecureStore for Instrumented<C> {
    async fn store(&self, key: &str, payload: &serde_json::Value) -> ClientResult<String> {
        self.observe("store", self.inner.store(key, payload)).await
    }

    async fn retrieve(&self, key: &str) -> ClientResult<Option<serde_json::Value>> {
        self.observe("retrieve", self.inner.retrieve(key)).await
    }
}

#[async_trait]
impl<C: ArtifactRegistry> ArtifactRegistry for Instrumented<C> {
    async fn register_artifact(&self, descriptor: &ArtifactDescriptor) -> ClientResult<String> {
        self.observe("register_artifact", self.inner.register_artifact(descriptor))
            .await
    }

    async fn get_artifact(&self, id: &str) -> ClientResult<Option<ArtifactDescriptor>> {
        self.observe("get_artifact", self.inner.get_artifact(id)).await
    }
}

/// Complete every subsystem span still running.
///
/// Run once all calls of a session have settled and before
/// `SpanGraph::finalize`; subsystem spans have no natural end of their own.
pub fn finalize_subsystem_spans(graph: &SpanGraph) -> usize {
    graph.complete_running(SpanType::Subsystem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, InMemorySecureStore, SecureStore};
    use data_core_span::SpanStatus;
    use serde_json::json;
    use std::time::Duration;

    fn operation_span(graph: &SpanGraph) -> data_core_span::ExecutionSpan {
        graph
            .spans()
            .into_iter()
            .find(|s| s.span_type == SpanType::Operation)
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_subsystem_span_per_wrapper() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Instrumented::for_subsystem(
            InMemorySecureStore::new(),
            graph.clone(),
            Subsystem::Store,
        );

        store.store("a", &json!(1)).await.unwrap();
        store.store("b", &json!(2)).await.unwrap();

        let subsystem = store.subsystem_span_id().unwrap();
        let spans = graph.spans();
        let subsystems: Vec<_> = spans
            .iter()
            .filter(|s| s.span_type == SpanType::Subsystem)
            .collect();
        let operations: Vec<_> = spans
            .iter()
            .filter(|s| s.span_type == SpanType::Operation)
            .collect();

        assert_eq!(subsystems.len(), 1);
        assert_eq!(subsystems[0].name, "store");
        assert_eq!(subsystems[0].parent_span_id, Some(graph.session_span_id()));
        assert_eq!(operations.len(), 2);
        assert!(operations
            .iter()
            .all(|s| s.parent_span_id == Some(subsystem) && s.name == "store.store"));
        assert!(operations.iter().all(|s| s.status == SpanStatus::Completed));
    }

    #[tokio::test]
    async fn test_failure_passes_through_and_fails_span() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Instrumented::for_subsystem(
            InMemorySecureStore::failing("vault sealed"),
            graph.clone(),
            Subsystem::Store,
        );

        let err = store.store("a", &json!(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "vault sealed");

        let operation = graph
            .spans()
            .into_iter()
            .find(|s| s.span_type == SpanType::Operation)
            .unwrap();
        assert_eq!(operation.status, SpanStatus::Failed);
        assert_eq!(operation.error.as_deref(), Some("vault sealed"));
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_subsystem_span() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Arc::new(Instrumented::for_subsystem(
            InMemorySecureStore::new(),
            graph.clone(),
            Subsystem::Store,
        ));

        let calls = (0..8).map(|i| {
            let store = store.clone();
            async move { store.store(&format!("k{}", i), &json!(i)).await }
        });
        for result in futures::future::join_all(calls).await {
            result.unwrap();
        }

        let subsystem_spans = graph
            .spans()
            .iter()
            .filter(|s| s.span_type == SpanType::Subsystem)
            .count();
        assert_eq!(subsystem_spans, 1);
        assert_eq!(graph.len(), 1 + 1 + 8);
    }

    #[tokio::test]
    async fn test_finalize_subsystem_spans_makes_graph_valid() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Instrumented::for_subsystem(
            InMemorySecureStore::new(),
            graph.clone(),
            Subsystem::Store,
        );
        store.store("a", &json!(1)).await.unwrap();

        assert_eq!(finalize_subsystem_spans(&graph), 1);
        assert_eq!(finalize_subsystem_spans(&graph), 0);

        let result = graph.finalize();
        assert!(result.success, "{:?}", result.failure_reasons);
    }

    #[tokio::test]
    async fn test_dropped_call_fails_its_span() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Instrumented::for_subsystem(
            InMemorySecureStore::new(),
            graph.clone(),
            Subsystem::Store,
        );

        let stalled = store.observe("store", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), ClientError>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), stalled)
            .await
            .is_err());

        let operation = operation_span(&graph);
        assert_eq!(operation.status, SpanStatus::Failed);
        assert_eq!(operation.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_panicking_call_fails_its_span() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Arc::new(Instrumented::for_subsystem(
            InMemorySecureStore::new(),
            graph.clone(),
            Subsystem::Store,
        ));

        let explode = true;
        let handle = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .observe("store", async move {
                        if explode {
                            panic!("store client bug");
                        }
                        Ok::<(), ClientError>(())
                    })
                    .await
            }
        });
        assert!(handle.await.unwrap_err().is_panic());

        let operation = operation_span(&graph);
        assert_eq!(operation.status, SpanStatus::Failed);
        assert_eq!(operation.error.as_deref(), Some("panicked"));
    }

    #[tokio::test]
    async fn test_reads_are_instrumented() {
        let graph = Arc::new(SpanGraph::new("session"));
        let store = Instrumented::for_subsystem(
            InMemorySecureStore::new(),
            graph.clone(),
            Subsystem::Store,
        );

        assert_eq!(store.retrieve("missing").await.unwrap(), None);

        let operation = operation_span(&graph);
        assert_eq!(operation.name, "store.retrieve");
        assert_eq!(operation.status, SpanStatus::Completed);
    }
}
