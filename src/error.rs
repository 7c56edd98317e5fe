/// Unified error types for the ClearMarket rewards service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum MarketError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed or missing input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Weekly review cap or a similar per-window limit was hit
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// A spend would drive the balance below zero
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    /// Unknown account, user, request or referral
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor is not permitted to perform the requested transition
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Missing or invalid credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Conflicting state (e.g. duplicate pending request)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Validation(_) => "ValidationError",
            MarketError::RateLimited(_) => "RateLimited",
            MarketError::InsufficientBalance { .. } => "InsufficientBalance",
            MarketError::NotFound(_) => "NotFound",
            MarketError::Unauthorized(_) => "Unauthorized",
            MarketError::Authentication(_) => "AuthenticationRequired",
            MarketError::Conflict(_) => "Conflict",
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => {
                "InternalServerError"
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            MarketError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Unauthorized(_) => StatusCode::FORBIDDEN,
            MarketError::Authentication(_) => StatusCode::UNAUTHORIZED,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Generic, retry-safe message shown to end users
    pub fn user_message(&self) -> &'static str {
        match self {
            MarketError::Validation(_) => "Some of the submitted details are invalid. Please review and try again.",
            MarketError::RateLimited(_) => "You have already done this recently. Please try again later.",
            MarketError::InsufficientBalance { .. } => "You do not have enough credits for this action.",
            MarketError::NotFound(_) => "The requested item could not be found.",
            MarketError::Unauthorized(_) => "You are not allowed to perform this action.",
            MarketError::Authentication(_) => "Please sign in to continue.",
            MarketError::Conflict(_) => "This action conflicts with an existing request.",
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => {
                "Something went wrong. It is safe to try again."
            }
        }
    }

    /// Full error detail for admin callers
    pub fn admin_detail(&self) -> String {
        self.to_string()
    }

    /// Whether this error came from a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            MarketError::Database(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
        )
    }

    /// Convert into a response carrying the raw error detail
    pub fn into_admin_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message: self.admin_detail(),
        });
        (self.status(), body).into_response()
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// End-user facing conversion; details stay in the logs
impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        crate::metrics::record_rejection(self.code());

        match &self {
            MarketError::Database(_) | MarketError::Internal(_) | MarketError::Io(_) => {
                tracing::error!("Request failed: {}", self);
            }
            _ => tracing::debug!("Request rejected: {}", self),
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message: self.user_message().to_string(),
        });

        (self.status(), body).into_response()
    }
}

/// Admin-facing error wrapper that surfaces raw failure detail
#[derive(Debug)]
pub struct AdminError(pub MarketError);

impl From<MarketError> for AdminError {
    fn from(err: MarketError) -> Self {
        AdminError(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        crate::metrics::record_rejection(self.0.code());
        tracing::warn!("Admin request failed: {}", self.0);
        self.0.into_admin_response()
    }
}

/// Result type alias for service operations
pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            MarketError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MarketError::RateLimited("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            MarketError::InsufficientBalance { requested: 5, available: 1 }.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            MarketError::Unauthorized("x".into()).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = MarketError::Internal("disk exploded at /var/db".into());
        assert!(!err.user_message().contains("/var/db"));
        assert!(err.admin_detail().contains("/var/db"));
    }

    #[test]
    fn test_each_kind_has_distinct_message() {
        let errors = [
            MarketError::Validation(String::new()),
            MarketError::RateLimited(String::new()),
            MarketError::InsufficientBalance { requested: 1, available: 0 },
            MarketError::NotFound(String::new()),
            MarketError::Unauthorized(String::new()),
        ];
        let mut messages: Vec<_> = errors.iter().map(|e| e.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), errors.len());
    }
}
