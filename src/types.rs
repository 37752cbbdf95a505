//! Error taxonomy for Farmgate
//!
//! Every failure funnels into [`FarmgateError`]; the HTTP layer maps each
//! variant to a status code and renders the standard response envelope.
//! Dependency failures (`Database`, `Identity`) carry detail that is only
//! surfaced to clients in dev mode.

use hyper::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FarmgateError>;

#[derive(Debug, Error)]
pub enum FarmgateError {
    /// Malformed or missing input, rejected before any store access
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid bearer token
    #[error("{0}")]
    Unauthenticated(String),

    /// Role, farm, or capability mismatch
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate business key (milk record triple, batch id, farm location, email)
    #[error("{0}")]
    Conflict(String),

    /// MongoDB failure
    #[error("database error: {0}")]
    Database(String),

    /// Identity provider failure
    #[error("identity provider error: {0}")]
    Identity(String),

    /// Transport-level problem (unreadable body, oversized payload)
    #[error("{0}")]
    Http(String),
}

impl FarmgateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FarmgateError::Validation(_) | FarmgateError::Http(_) => StatusCode::BAD_REQUEST,
            FarmgateError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            FarmgateError::Forbidden(_) => StatusCode::FORBIDDEN,
            FarmgateError::NotFound(_) => StatusCode::NOT_FOUND,
            FarmgateError::Conflict(_) => StatusCode::CONFLICT,
            FarmgateError::Database(_) | FarmgateError::Identity(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Dependency detail is suppressed outside
    /// dev mode.
    pub fn client_message(&self, dev_mode: bool) -> String {
        match self {
            FarmgateError::Database(_) | FarmgateError::Identity(_) if !dev_mode => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for FarmgateError {
    fn from(e: std::io::Error) -> Self {
        FarmgateError::Http(format!("io error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FarmgateError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FarmgateError::Unauthenticated("no token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            FarmgateError::Forbidden("farmer".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            FarmgateError::NotFound("cow".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            FarmgateError::Conflict("duplicate".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            FarmgateError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_dependency_detail_suppressed_in_production() {
        let err = FarmgateError::Database("connection refused".into());
        assert_eq!(err.client_message(false), "Internal server error");
        assert!(err.client_message(true).contains("connection refused"));

        // Boundary errors keep their message either way
        let err = FarmgateError::Conflict("email exists".into());
        assert_eq!(err.client_message(false), "email exists");
    }
}
