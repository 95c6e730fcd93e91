use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ingest::IngestError;
use query::QueryError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Graph not found: {0}")]
    GroupNotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::GroupNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Query(e) if e.is_config() => {
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error")
            }
            ApiError::Query(_) => (StatusCode::BAD_GATEWAY, "retrieval_error"),
            ApiError::Ingest(IngestError::UnsupportedFormat(_)) => {
                (StatusCode::BAD_REQUEST, "unsupported_type")
            }
            ApiError::Ingest(e) if e.is_rejection() => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            ApiError::Ingest(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.parts();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error_type, %message, "Request failed");
        } else {
            tracing::warn!(error_type, %message, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::validation("bad top_k"), StatusCode::BAD_REQUEST),
            (ApiError::GroupNotFound("g".into()), StatusCode::NOT_FOUND),
            (
                ApiError::from(QueryError::UnsupportedProvider("cohere".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(QueryError::Retrieval(anyhow::anyhow!("timeout"))),
                StatusCode::BAD_GATEWAY,
            ),
            (ApiError::from(IngestError::EmptyUpload), StatusCode::BAD_REQUEST),
            (
                ApiError::from(IngestError::UnsupportedFormat("zip".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_config_error_type() {
        let error = ApiError::from(QueryError::UnsupportedProvider("cohere".into()));
        assert_eq!(error.parts().1, "config_error");
        assert!(error.to_string().contains("cohere"));
    }
}
