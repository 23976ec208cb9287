use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Request validation
    #[error("Invalid input data: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    // Auth
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Insufficient permissions. Required: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    // Storage
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Database pool error: {0}")]
    Pool(String),

    // External clients
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Event deserialization failed: {0}")]
    Deserialization(String),

    #[error("Empty payload")]
    EmptyPayload,

    // System
    #[error("Service not ready: {0}")]
    NotReady(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Integrity violations (SQLSTATE class 23) are client errors: the row
    /// never satisfied a constraint, so they surface as 422 like any other
    /// invalid payload.
    fn is_constraint_violation(&self) -> bool {
        match self {
            Error::Database(e) => e
                .code()
                .map(|c| c.code().starts_with("23"))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            Error::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Error::Unauthorized | Error::InvalidApiKey => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            Error::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            Error::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            Error::NotReady(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service not ready".to_string(),
            ),
            Error::Database(_) if self.is_constraint_violation() => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid input data: {}", self),
            ),
            // Everything else is an internal failure; log the detail but
            // never leak it to the client.
            _ => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "detail": detail });
        (status, axum::Json(body)).into_response()
    }
}

impl From<deadpool_postgres::PoolError> for Error {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Error::Pool(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let resp = Error::NotFound("Market data with id 7 not found".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_422() {
        let resp = Error::Validation("price must be >= 0".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn auth_errors_map_to_401_and_403() {
        assert_eq!(
            Error::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Forbidden("admin".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn rate_limit_maps_to_429() {
        let resp = Error::RateLimitExceeded.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let resp = Error::Internal("pool exhausted on node 3".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
