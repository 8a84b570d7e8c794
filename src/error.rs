use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy crossing the HTTP boundary.
///
/// Every variant renders a stable `{"message": ...}` body (validation errors
/// additionally carry `{"details": {"field": ...}}`). Internal detail never
/// reaches the client; the 500-class variants log it instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        field: Option<&'static str>,
        message: String,
    },

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Dependency(String),

    #[error("internal server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                message,
                field.map(|f| json!({ "field": f })),
            ),
            ApiError::Authentication(message) => (StatusCode::UNAUTHORIZED, message, None),
            ApiError::Authorization(message) => (StatusCode::FORBIDDEN, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message, None),
            ApiError::Configuration(message) => {
                error!(%message, "server configuration defect");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                    None,
                )
            }
            ApiError::Dependency(message) => {
                error!(%message, "dependency unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A required service is unavailable".to_string(),
                    None,
                )
            }
            ApiError::Internal(err) => {
                error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match details {
            Some(details) => json!({ "message": message, "details": details }),
            None => json!({ "message": message }),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn validation_error_carries_field_details() {
        let res = ApiError::validation("password", "Password too weak").into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["message"], "Password too weak");
        assert_eq!(body["details"]["field"], "password");
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_cause() {
        let res =
            ApiError::Internal(anyhow::anyhow!("connection refused (10.0.0.3)")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(res).await;
        assert_eq!(body["message"], "Internal server error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn authorization_is_distinct_from_authentication() {
        let authn = ApiError::Authentication("Invalid or expired token".into()).into_response();
        let authz = ApiError::Authorization("Not your rating".into()).into_response();
        assert_eq!(authn.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(authz.status(), StatusCode::FORBIDDEN);
    }
}
