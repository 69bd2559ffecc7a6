use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use huddle_shared::SessionError;
use huddle_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Unauthorized(#[from] SessionError),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Store(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::from(SessionError::Expired), StatusCode::UNAUTHORIZED),
            (ServerError::Conflict("twice".into()), StatusCode::CONFLICT),
            (ServerError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (ServerError::from(StoreError::NotFound), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
