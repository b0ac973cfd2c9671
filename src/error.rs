use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Spotify account is not connected")]
    NotConnected,

    #[error("Spotify session expired. Please reconnect your account.")]
    RefreshFailed,

    #[error("Spotify authentication failed. Please reconnect your account.")]
    UpstreamAuth,

    #[error("Insufficient Spotify permissions. Please reconnect with the required permissions.")]
    UpstreamPermission,

    #[error("Rate limited by Spotify. Please try again shortly.")]
    UpstreamRateLimited { retry_after: Option<u64> },

    #[error("Unexpected response from Spotify: {0}")]
    UpstreamMalformed(String),

    #[error("Spotify did not respond in time: {0}")]
    UpstreamTimeout(String),

    #[error("Credential storage unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Spotify integration is not configured")]
    SpotifyNotConfigured,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code for the UI.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::NotConnected => "spotify_not_connected",
            AppError::RefreshFailed => "spotify_reconnect_required",
            AppError::UpstreamAuth => "spotify_auth_failed",
            AppError::UpstreamPermission => "spotify_insufficient_scope",
            AppError::UpstreamRateLimited { .. } => "spotify_rate_limited",
            AppError::UpstreamMalformed(_) => "spotify_malformed_response",
            AppError::UpstreamTimeout(_) => "spotify_timeout",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::SpotifyNotConfigured => "spotify_not_configured",
            AppError::Unauthorized => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation_error",
            AppError::ExternalApi(_) => "external_api_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotConnected | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RefreshFailed | AppError::UpstreamAuth | AppError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AppError::UpstreamPermission => StatusCode::FORBIDDEN,
            AppError::UpstreamRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamMalformed(_) | AppError::ExternalApi(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::StoreUnavailable(_) | AppError::SpotifyNotConfigured => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let status = self.status();
        let mut retry_after = None;

        let error_message = match self {
            AppError::UpstreamRateLimited { retry_after: after } => {
                retry_after = after;
                self.to_string()
            }
            AppError::UpstreamMalformed(ref detail) => {
                tracing::error!("Malformed upstream response: {}", detail);
                "Spotify returned an unexpected response".to_string()
            }
            AppError::StoreUnavailable(ref e) => {
                tracing::error!("Credential store error: {}", e);
                "Storage temporarily unavailable, please retry".to_string()
            }
            AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::ExternalApi(msg) => msg,
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
