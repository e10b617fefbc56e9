//! Handler error type with consistent JSON responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

/// Errors returned by gateway handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    /// The stored credential is revoked or missing; the user must reconnect.
    #[error("Threads authorization required: {0}")]
    ReauthRequired(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Threads API error: {0}")]
    Upstream(String),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::ReauthRequired(msg) => {
                (StatusCode::UNAUTHORIZED, "reauthorization_required", Some(msg))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg)),
            AppError::Upstream(msg) => {
                warn!(error = %msg, "Threads API error");
                (StatusCode::BAD_GATEWAY, "threads_error", Some(msg))
            }
            AppError::Store(msg) => {
                error!(error = %msg, "token store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(msg) => {
                error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        (status, Json(ErrorResponse { error, details })).into_response()
    }
}

impl From<threads_client::Error> for AppError {
    fn from(err: threads_client::Error) -> Self {
        if err.requires_reauthorization() {
            return AppError::ReauthRequired(err.to_string());
        }
        match err {
            threads_client::Error::OAuth(inner) => inner.into(),
            threads_client::Error::Store(msg) => AppError::Store(msg),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl From<threads_oauth::Error> for AppError {
    fn from(err: threads_oauth::Error) -> Self {
        use threads_oauth::Error;
        match err {
            Error::InvalidCredentials(msg) => AppError::ReauthRequired(msg),
            Error::Store(msg) | Error::CredentialParse(msg) | Error::Io(msg) => {
                AppError::Store(msg)
            }
            Error::Config(msg) => AppError::Internal(msg),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn unauthorized_has_no_details() {
        let (status, json) = body_json(AppError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "unauthorized");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn store_errors_hide_details() {
        let (status, json) = body_json(AppError::Store("disk full at /var/lib".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "store_error");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn provider_errors_map_to_bad_gateway() {
        let err: AppError = threads_client::Error::Provider {
            status: 503,
            message: "Service temporarily unavailable".into(),
        }
        .into();
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            json["details"],
            "API request failed: 503 Service temporarily unavailable"
        );
    }

    #[test]
    fn credential_errors_require_reauthorization() {
        for err in [
            threads_client::Error::NoAccessToken,
            threads_client::Error::NoRefreshToken,
            threads_client::Error::AuthenticationFailed,
            threads_client::Error::ReauthRequired,
            threads_client::Error::RefreshFailed(Box::new(threads_client::Error::OAuth(
                threads_oauth::Error::InvalidCredentials("revoked".into()),
            ))),
        ] {
            assert!(
                matches!(AppError::from(err), AppError::ReauthRequired(_)),
                "credential errors must ask the user to reconnect"
            );
        }
    }

    #[test]
    fn oauth_transport_errors_are_upstream() {
        let err = AppError::from(threads_oauth::Error::TokenExchange("invalid code".into()));
        assert!(matches!(err, AppError::Upstream(msg) if msg.contains("invalid code")));
    }
}
