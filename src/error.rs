use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::db::StoreError;

/// One violated input rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("invalid token, please log in again")]
    TokenInvalid,
    #[error("session expired, please log in again")]
    TokenExpired,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("store unavailable")]
    Store(#[source] StoreError),
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_)
            | AppError::TokenInvalid
            | AppError::TokenExpired
            | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason so clients can tell the 401s apart.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::TokenInvalid => "TOKEN_INVALID",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Store(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Store(_) | AppError::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }

    /// Full error chain; only ever rendered in development.
    fn detail(&self) -> Option<String> {
        match self {
            AppError::Store(e) => Some(format!("{e:?}")),
            AppError::Internal(e) => Some(format!("{e:?}")),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppError::Conflict("Resource already exists".into()),
            other => AppError::Store(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        AppError::validation("id", "Invalid expense id")
    }
}

/// Failure envelope: `{"status": "fail" | "error", "message", "code", ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Carries the detailed body alongside a 5xx response until
/// [`expose_error_detail`] decides whether to render it.
#[derive(Debug, Clone)]
struct ErrorDetail(ErrorBody);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        } else {
            warn!(%status, code = self.code(), message = %self, "request rejected");
        }

        let body = ErrorBody {
            status: (if status.is_server_error() { "error" } else { "fail" }).to_string(),
            message: self.public_message(),
            code: self.code().to_string(),
            errors: match &self {
                AppError::Validation(errors) => Some(errors.clone()),
                _ => None,
            },
            detail: None,
        };

        let detailed = self.detail().map(|detail| ErrorBody {
            detail: Some(detail),
            ..body.clone()
        });

        let mut res = (status, Json(body)).into_response();
        if let Some(detailed) = detailed {
            res.extensions_mut().insert(ErrorDetail(detailed));
        }
        res
    }
}

/// Response mapper layered only in development: swaps in the detailed error body.
pub async fn expose_error_detail(mut res: Response) -> Response {
    match res.extensions_mut().remove::<ErrorDetail>() {
        Some(ErrorDetail(body)) => (res.status(), Json(body)).into_response(),
        None => res,
    }
}

/// Fallback for unknown routes.
pub async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}
