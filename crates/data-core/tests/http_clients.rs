//! Integration tests for the HTTP subsystem clients and lineage fan-out

use data_core::client::{HttpArtifactRegistry, HttpContextGraph, HttpSecureStore};
use data_core::config::{EndpointConfig, FanoutConfig};
use data_core::*;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(server: &MockServer) -> EndpointConfig {
    EndpointConfig {
        url: server.uri(),
        timeout_ms: 2000,
    }
}

fn http_clients(server: &MockServer) -> SubsystemClients {
    let config = endpoint(server);
    SubsystemClients::new(
        Arc::new(HttpContextGraph::new(&config).unwrap()),
        Arc::new(HttpSecureStore::new(&config).unwrap()),
        Arc::new(HttpArtifactRegistry::new(&config).unwrap()),
    )
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/context/entity-1"))
        .and(body_partial_json(json!({"simulationId": "sim-1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/artifacts"))
        .and(body_partial_json(json!({"id": "entity-1", "tags": ["simulation:sim-1"]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "artifact-7"})))
        .expect(1)
        .mount(server)
        .await;
}

fn request() -> PersistenceRequest {
    PersistenceRequest::new("op-1", OperationType::DataStore, "sim-1", "entity-1")
        .with_payload("rows", json!(12))
}

#[tokio::test]
async fn test_http_persist_accepted() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/data/sim:sim-1:entity-1"))
        .and(body_partial_json(json!({"operationId": "op-1", "payload": {"rows": 12}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"receipt": "blob-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let supervisor = Arc::new(TaskSupervisor::new(16));
    let gateway = PersistenceGateway::new(http_clients(&server), supervisor.clone());

    let result = gateway.persist(request()).await.unwrap();

    let receipts: Vec<_> = result
        .acceptance
        .subsystems
        .iter()
        .map(|s| s.receipt.as_deref().unwrap())
        .collect();
    assert_eq!(receipts, vec!["graph:op-1", "store:blob-42", "registry:artifact-7"]);
    supervisor.drain().await;
}

#[tokio::test]
async fn test_http_ids_with_separators_stay_in_one_segment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/context/team%2Fentity-1%3Fv=2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/data/sim:sim-1:team%2Fentity-1%3Fv=2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"receipt": "blob-9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/artifacts"))
        .and(body_partial_json(json!({"id": "team/entity-1?v=2"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "artifact-9"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = PersistenceGateway::new(http_clients(&server), Arc::new(TaskSupervisor::new(16)));
    let request = PersistenceRequest::new("op-1", OperationType::DataStore, "sim-1", "team/entity-1?v=2");

    let result = gateway.persist(request).await.unwrap();
    assert!(result.acceptance.accepted);
    gateway.supervisor().drain().await;
}

#[tokio::test]
async fn test_http_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/context/entity-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"step": 1}, {"step": 2}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/data/sim:sim-1:entity-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rows": 12})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/artifacts/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/artifacts/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("index corrupt"))
        .mount(&server)
        .await;

    let config = endpoint(&server);
    let graph = HttpContextGraph::new(&config).unwrap();
    let store = HttpSecureStore::new(&config).unwrap();
    let registry = HttpArtifactRegistry::new(&config).unwrap();

    let history = graph.context_history("entity-1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1]["step"], 2);
    assert_eq!(
        store.retrieve("sim:sim-1:entity-1").await.unwrap(),
        Some(json!({"rows": 12}))
    );
    assert_eq!(registry.get_artifact("missing").await.unwrap(), None);
    assert_eq!(
        registry.get_artifact("broken").await.unwrap_err(),
        ClientError::Server {
            status: 500,
            message: "index corrupt".to_string()
        }
    );
}

#[tokio::test]
async fn test_http_server_error_rejects_subsystem() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string("vault sealed"))
        .mount(&server)
        .await;

    let gateway = PersistenceGateway::new(http_clients(&server), Arc::new(TaskSupervisor::new(16)));

    let err = gateway.persist(request()).await.unwrap_err();

    let failure = err.terminal_failure().unwrap();
    assert_eq!(failure.failed_subsystems(), vec![Subsystem::Store]);
    assert_eq!(
        failure.subsystem_failures()[0].error,
        "Server error 503: vault sealed"
    );
}

#[tokio::test]
async fn test_http_undecodable_receipt_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = HttpSecureStore::new(&endpoint(&server)).unwrap();
    let err = store.store("k", &json!({})).await.unwrap_err();

    assert!(matches!(err, ClientError::Parse(_)));
}

#[tokio::test]
async fn test_http_unreachable_is_network_error() {
    let graph = HttpContextGraph::new(&EndpointConfig {
        url: "http://127.0.0.1:9".to_string(),
        timeout_ms: 500,
    })
    .unwrap();

    let err = graph
        .track_context("entity-1", &Attributes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Network(_)));
}

fn fanout_config(memory: &MockServer, registry: &MockServer, vault: &MockServer) -> FanoutConfig {
    FanoutConfig {
        memory_graph_url: memory.uri(),
        registry_url: registry.uri(),
        data_vault_url: vault.uri(),
        timeout_ms: 2000,
    }
}

fn lineage_payload() -> LineageRecordPayload {
    LineageRecordPayload {
        execution_id: "exec-1".to_string(),
        parent_span_id: Some("span-1".to_string()),
        source: "agent".to_string(),
        layers_executed: Some(vec!["retrieval".to_string()]),
        output_hash: Some("sha256:abc".to_string()),
        event: Some("completed".to_string()),
    }
}

#[tokio::test]
async fn test_lineage_fanout_reaches_all_targets() {
    let memory = MockServer::start().await;
    let registry = MockServer::start().await;
    let vault = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/prompt-lineage"))
        .and(body_partial_json(json!({"execution_id": "exec-1", "layers": ["retrieval"]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&memory)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/executions"))
        .and(body_partial_json(json!({"checksum": "sha256:abc"})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&registry)
        .await;
    Mock::given(method("POST"))
        .and(path("/metadata"))
        .and(body_partial_json(json!({"event": "completed"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&vault)
        .await;

    let supervisor = Arc::new(TaskSupervisor::new(16));
    let fanout = LineageFanout::new(fanout_config(&memory, &registry, &vault), supervisor.clone())
        .unwrap();

    let result = fanout.record(lineage_payload()).unwrap();

    assert!(result.accepted);
    assert_eq!(
        result.routed_to,
        vec!["llm-memory-graph", "llm-registry", "llm-data-vault"]
    );

    supervisor.drain().await;
    assert_eq!(
        supervisor.status(result.task_id).unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_lineage_fanout_failure_stays_in_task() {
    let memory = MockServer::start().await;
    let registry = MockServer::start().await;
    let vault = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&memory)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("registry down"))
        .mount(&registry)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&vault)
        .await;

    let supervisor = Arc::new(TaskSupervisor::new(16));
    let fanout = LineageFanout::new(fanout_config(&memory, &registry, &vault), supervisor.clone())
        .unwrap();

    let result = fanout.record(lineage_payload()).unwrap();
    assert!(result.accepted);

    supervisor.drain().await;
    let task = supervisor.status(result.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("Failed to route to: llm-registry"));
}
