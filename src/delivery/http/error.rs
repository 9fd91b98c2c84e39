use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::{QueryError, ValidationError};
use crate::repository::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] RepoError),

    #[error("invalid path: {0}")]
    Path(#[from] PathRejection),

    #[error("invalid query string: {0}")]
    QueryString(#[from] QueryRejection),

    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),

    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Query(_)
            | ApiError::Path(_)
            | ApiError::QueryString(_)
            | ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(RepoError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Storage(RepoError::Constraint { .. }) => StatusCode::CONFLICT,
            ApiError::Storage(err) if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match status {
            // details were logged where the failure was detected
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            StatusCode::SERVICE_UNAVAILABLE => "storage unavailable".to_string(),
            _ => self.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn storage_errors_map_to_statuses() {
        let not_found = ApiError::from(RepoError::NotFound {
            entity: "group",
            id: Uuid::nil(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = ApiError::from(RepoError::Constraint {
            constraint: None,
            message: "duplicate".to_string(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let timeout = ApiError::from(RepoError::Timeout(Duration::from_secs(1)));
        assert_eq!(timeout.status(), StatusCode::SERVICE_UNAVAILABLE);

        let commit = ApiError::from(RepoError::Commit(sqlx::Error::RowNotFound));
        assert_eq!(commit.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_is_a_bad_request() {
        let err = ApiError::from(ValidationError::Email);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
