use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::RecordKind;

#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: i32 },

    #[error("{kind} {id} is still referenced by {dependents} active {dependent_kind} record(s)")]
    ReferentialGuard {
        kind: RecordKind,
        id: i32,
        dependent_kind: RecordKind,
        dependents: u64,
    },

    #[error("{kind} {id} cannot be restored while its {parent_kind} is inactive")]
    InactiveParent {
        kind: RecordKind,
        id: i32,
        parent_kind: RecordKind,
    },

    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl ClinicError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClinicError::Validation(message.into())
    }

    /// Both guard variants are the same user-facing failure class.
    pub fn is_guard(&self) -> bool {
        matches!(
            self,
            ClinicError::ReferentialGuard { .. } | ClinicError::InactiveParent { .. }
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ClinicError::NotFound { .. } => StatusCode::NOT_FOUND,
            ClinicError::ReferentialGuard { .. } | ClinicError::InactiveParent { .. } => {
                StatusCode::CONFLICT
            }
            ClinicError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ClinicError::Unauthorized => StatusCode::UNAUTHORIZED,
            ClinicError::Forbidden(_) => StatusCode::FORBIDDEN,
            ClinicError::Conflict(_) => StatusCode::CONFLICT,
            ClinicError::Internal(_) | ClinicError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ClinicError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ClinicError::Database(e) => {
                tracing::error!("Database error: {}", e);
                tracing::Span::current().record("error", tracing::field::display(e));
                "Database error".to_string()
            }
            ClinicError::Internal(what) => {
                tracing::error!("Internal error: {}", what);
                tracing::Span::current().record("error", *what);
                "Internal error".to_string()
            }
            other => {
                tracing::Span::current().record("error", tracing::field::display(other));
                other.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;
