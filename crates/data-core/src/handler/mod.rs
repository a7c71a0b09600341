//! HTTP handler for LLM Data Core
//!
//! Every instrumented call (`POST /v1/persist` and the three reads) runs as
//! its own session: one span graph, one finalized execution result in the
//! response.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use data_core_span::{
    ExecutionContext, ExecutionContextExtractor, ExecutionEnvelope, ExecutionResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::client::SubsystemClients;
use crate::config::DataCoreConfig;
use crate::contracts::{
    ArtifactDescriptor, Attributes, LineageRecordPayload, LineageRecordResult,
    PersistenceRequest, PersistenceResult, PostValidationTask,
};
use crate::error::{DataCoreError, Result, TerminalFailure};
use crate::lineage::LineageFanout;
use crate::session::DataCore;
use crate::tasks::TaskSupervisor;

/// Envelope returned by `POST /v1/persist`
pub type PersistEnvelope = ExecutionEnvelope<PersistenceResult, TerminalFailure>;

/// Envelope returned by the read endpoints
pub type ReadEnvelope<T> = ExecutionEnvelope<T>;

type Reply<T> = std::result::Result<(StatusCode, Json<T>), ApiError>;

/// Application state
pub struct AppState {
    pub config: DataCoreConfig,
    pub clients: SubsystemClients,
    pub supervisor: Arc<TaskSupervisor>,
    pub fanout: LineageFanout,
}

impl AppState {
    pub fn new(config: DataCoreConfig, clients: SubsystemClients) -> Result<Self> {
        let supervisor = Arc::new(TaskSupervisor::new(config.max_tracked_tasks));
        let fanout = LineageFanout::new(config.fanout.clone(), supervisor.clone())?;
        Ok(Self {
            config,
            clients,
            supervisor,
            fanout,
        })
    }

    /// State with clients built from the configuration
    pub fn from_config(config: DataCoreConfig) -> Result<Self> {
        let clients = SubsystemClients::from_config(&config)?;
        Self::new(config, clients)
    }

    fn session(&self, context: ExecutionContext) -> DataCore {
        DataCore::new(
            self.clients.clone(),
            &self.config,
            Some(context),
            self.supervisor.clone(),
        )
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/persist", post(persist))
        .route("/v1/context/:entity_id", get(query_context))
        .route("/v1/artifacts/:artifact_id", get(lookup_artifact))
        .route("/v1/data/:key", get(get_data))
        .route("/v1/lineage/record", post(record_lineage))
        .route("/v1/tasks/:task_id", get(task_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API error
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    BadGateway(String),
    InternalError(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadGateway(_) => "SUBSYSTEM_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadGateway(msg)
            | ApiError::InternalError(msg) => msg,
        }
    }
}

impl From<DataCoreError> for ApiError {
    fn from(err: DataCoreError) -> Self {
        if err.is_user_error() {
            ApiError::BadRequest(err.to_string())
        } else if matches!(err, DataCoreError::Subsystem { .. }) {
            ApiError::BadGateway(err.to_string())
        } else {
            ApiError::InternalError(err.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error_code().to_string(),
            message: self.message().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /v1/persist - Persist one request in its own session.
///
/// Requires `X-Parent-Span-Id`. Answers 200 when every subsystem accepted
/// and 422 when the simulation was invalidated; both carry the finalized
/// execution graph. Undecodable bodies are 400 and never reach a session.
async fn persist(
    ExecutionContextExtractor(context): ExecutionContextExtractor,
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<PersistenceRequest>, JsonRejection>,
) -> Reply<PersistEnvelope> {
    let Json(request) = body?;
    let core = state.session(context);

    let outcome = core.persist(request).await;
    let execution = core.execution_result();

    match outcome {
        Ok(result) => Ok((StatusCode::OK, Json(ExecutionEnvelope::success(result, execution)))),
        Err(DataCoreError::Terminal(failure)) => {
            let failure = *failure;
            Ok((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ExecutionEnvelope::failure(
                    failure.to_string(),
                    Some(failure),
                    execution,
                )),
            ))
        }
        Err(err) if err.is_user_error() => Ok((
            StatusCode::BAD_REQUEST,
            Json(ExecutionEnvelope::failure(err.to_string(), None, execution)),
        )),
        Err(err) => {
            tracing::error!(error = %err, "Persist failed");
            Err(err.into())
        }
    }
}

/// Shape a read outcome; `None` is a 404 that still carries the graph
fn read_reply<T>(
    outcome: Result<Option<T>>,
    execution: ExecutionResult,
    missing: impl FnOnce() -> String,
) -> Reply<ReadEnvelope<T>> {
    match outcome {
        Ok(Some(data)) => Ok((StatusCode::OK, Json(ExecutionEnvelope::success(data, execution)))),
        Ok(None) => Ok((
            StatusCode::NOT_FOUND,
            Json(ExecutionEnvelope::failure(missing(), None, execution)),
        )),
        Err(err) if err.is_user_error() => Ok((
            StatusCode::BAD_REQUEST,
            Json(ExecutionEnvelope::failure(err.to_string(), None, execution)),
        )),
        Err(err) => {
            tracing::error!(error = %err, "Read failed");
            Err(err.into())
        }
    }
}

/// GET /v1/context/:entity_id - Context history of an entity
async fn query_context(
    ExecutionContextExtractor(context): ExecutionContextExtractor,
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Reply<ReadEnvelope<Vec<Attributes>>> {
    let core = state.session(context);
    let outcome = core.query_context(&entity_id).await.map(Some);
    read_reply(outcome, core.execution_result(), String::new)
}

/// GET /v1/artifacts/:artifact_id - Registered artifact descriptor
async fn lookup_artifact(
    ExecutionContextExtractor(context): ExecutionContextExtractor,
    State(state): State<Arc<AppState>>,
    Path(artifact_id): Path<String>,
) -> Reply<ReadEnvelope<ArtifactDescriptor>> {
    let core = state.session(context);
    let outcome = core.lookup_artifact(&artifact_id).await;
    read_reply(outcome, core.execution_result(), || {
        format!("Artifact '{}' not found", artifact_id)
    })
}

/// GET /v1/data/:key - Stored payload under a storage key
async fn get_data(
    ExecutionContextExtractor(context): ExecutionContextExtractor,
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Reply<ReadEnvelope<serde_json::Value>> {
    let core = state.session(context);
    let outcome = core.get_data(&key).await;
    read_reply(outcome, core.execution_result(), || {
        format!("No data under '{}'", key)
    })
}

/// POST /v1/lineage/record - Accept a lineage record for background delivery
async fn record_lineage(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<LineageRecordPayload>, JsonRejection>,
) -> Reply<LineageRecordResult> {
    let Json(payload) = body?;
    let result = state.fanout.record(payload)?;
    Ok((StatusCode::ACCEPTED, Json(result)))
}

/// GET /v1/tasks/:task_id - Current state of a post-validation task
async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> std::result::Result<Json<PostValidationTask>, ApiError> {
    state
        .supervisor
        .status(task_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Task '{}' not found", task_id)))
}
