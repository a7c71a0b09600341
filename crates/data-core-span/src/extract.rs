//! Axum extractor for execution context from HTTP headers.
//!
//! Reads `X-Parent-Span-Id` and `X-Execution-Id` from request headers.
//! Rejects with 400 if `X-Parent-Span-Id` is missing or invalid.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::context::ExecutionContext;

pub const PARENT_SPAN_HEADER: &str = "x-parent-span-id";
pub const EXECUTION_ID_HEADER: &str = "x-execution-id";

/// Axum extractor that reads execution context from HTTP headers.
///
/// Requests without a valid `X-Parent-Span-Id` header are rejected with
/// `400 BAD_REQUEST`, so no session runs outside an execution graph.
/// A missing `X-Execution-Id` gets a fresh id.
pub struct ExecutionContextExtractor(pub ExecutionContext);

/// Rejection for a missing or malformed `X-Parent-Span-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContextRejection {
    MissingParentSpan,
    InvalidParentSpan,
}

impl ExecutionContextRejection {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingParentSpan => "MISSING_PARENT_SPAN_ID",
            Self::InvalidParentSpan => "INVALID_PARENT_SPAN_ID",
        }
    }
}

impl IntoResponse for ExecutionContextRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingParentSpan => "X-Parent-Span-Id header is required",
            Self::InvalidParentSpan => "X-Parent-Span-Id header must be a valid UUID",
        };
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": self.error_code(),
                "message": message
            })),
        )
            .into_response()
    }
}

/// `None` if absent, `Some(Err(()))` if present but not a UUID.
fn header_uuid(headers: &HeaderMap, name: &str) -> Option<Result<Uuid, ()>> {
    headers.get(name).map(|v| {
        v.to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(())
    })
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ExecutionContextExtractor {
    type Rejection = ExecutionContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let parent_span_id = match header_uuid(&parts.headers, PARENT_SPAN_HEADER) {
            Some(Ok(id)) => id,
            Some(Err(())) => return Err(ExecutionContextRejection::InvalidParentSpan),
            None => return Err(ExecutionContextRejection::MissingParentSpan),
        };

        // A malformed execution id is replaced rather than rejected.
        let execution_id = header_uuid(&parts.headers, EXECUTION_ID_HEADER)
            .and_then(Result::ok)
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(ExecutionContext {
            execution_id,
            parent_span_id,
        }))
    }
}
