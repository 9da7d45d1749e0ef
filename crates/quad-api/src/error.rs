use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use quad_db::queries::DeleteResult;

/// Error taxonomy for the REST surface. Every variant maps to a status
/// code and a `{"error": ...}` body; internal details never reach the
/// client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Fold an owner-scoped delete outcome into a handler result.
pub fn check_delete(result: DeleteResult, what: &str) -> Result<(), ApiError> {
    match result {
        DeleteResult::Deleted => Ok(()),
        DeleteResult::NotOwner => Err(ApiError::Forbidden(format!(
            "only the author can delete this {}",
            what
        ))),
        DeleteResult::NotFound => Err(ApiError::NotFound(format!("{} not found", what))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_http() {
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("missing".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn delete_results_fold() {
        assert!(check_delete(DeleteResult::Deleted, "post").is_ok());
        assert!(matches!(
            check_delete(DeleteResult::NotOwner, "post"),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            check_delete(DeleteResult::NotFound, "post"),
            Err(ApiError::NotFound(_))
        ));
    }
}
