//! API error type and the failure-kind to HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use forgehand_core_types::FailureKind;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A classified automation failure.
    #[error("{message}")]
    Failure {
        kind: FailureKind,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ApiError::Failure {
            kind,
            message: message.into(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Failure { kind, .. } => match kind {
                // The request was understood but the platform UI did not
                // cooperate, or the work did not pass.
                FailureKind::ElementNotFound | FailureKind::ValidationFailure => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                FailureKind::OperationTimeout => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::NetworkError => StatusCode::BAD_GATEWAY,
                FailureKind::SessionExpired => StatusCode::UNAUTHORIZED,
                FailureKind::PageCrash | FailureKind::ScriptError => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind_name(&self) -> Option<&'static str> {
        match self {
            ApiError::Failure { kind, .. } => Some(kind.name()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": self.to_string(),
            "kind": self.kind_name(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases = [
            (FailureKind::ElementNotFound, StatusCode::UNPROCESSABLE_ENTITY),
            (FailureKind::ValidationFailure, StatusCode::UNPROCESSABLE_ENTITY),
            (FailureKind::OperationTimeout, StatusCode::GATEWAY_TIMEOUT),
            (FailureKind::NetworkError, StatusCode::BAD_GATEWAY),
            (FailureKind::SessionExpired, StatusCode::UNAUTHORIZED),
            (FailureKind::PageCrash, StatusCode::INTERNAL_SERVER_ERROR),
            (FailureKind::ScriptError, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (kind, status) in cases {
            assert_eq!(ApiError::failure(kind, "x").status(), status);
        }
    }

    #[test]
    fn plain_errors_have_no_kind() {
        assert_eq!(ApiError::NotFound("solution".into()).status(), StatusCode::NOT_FOUND);
        assert!(ApiError::BadRequest("nope".into()).kind_name().is_none());
    }
}
