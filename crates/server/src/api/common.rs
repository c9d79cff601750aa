// Common DTOs for the public API
//
// These types are shared across multiple API endpoints.

use axum::http::StatusCode;
use axum::Json;
use jobflow_engine::{ErrorKind, Pagination};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::services::ServiceError;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
    /// Error class: precondition, not_found, executor, persistence or cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "precondition")]
    pub kind: Option<ErrorKind>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP status for an error class
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Precondition | ErrorKind::Cancelled => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Executor => StatusCode::BAD_GATEWAY,
        ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ServiceError> for ErrorResponse {
    fn from(e: ServiceError) -> Self {
        Self {
            error: e.to_string(),
            kind: Some(e.kind()),
        }
    }
}

/// Map a service error to a response, logging the ones that are our fault
pub fn api_error(action: &str, e: ServiceError) -> ApiError {
    let status = if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        status_for(e.kind())
    };

    if status.is_server_error() {
        tracing::error!("Failed to {}: {}", action, e);
    } else {
        tracing::debug!(%status, "Failed to {}: {}", action, e);
    }

    ErrorResponse::from(e).into_response(status)
}

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    /// Array of items returned by the list operation.
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// Paging parameters for list endpoints
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Maximum number of items (default 20, at most 100)
    pub limit: Option<u32>,
    /// Number of items to skip (default 0)
    pub offset: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination::new(
            self.offset.unwrap_or(defaults.offset),
            self.limit.filter(|l| *l > 0).unwrap_or(defaults.limit),
        )
    }
}

/// Identifies the person or system performing an operator action
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OperatorRequest {
    /// Operator id recorded on the job task and in its log
    #[serde(default)]
    #[schema(example = 42)]
    pub operator_id: i64,
}
