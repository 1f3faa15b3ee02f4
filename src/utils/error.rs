use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::event::EventStatus;
use crate::models::ticket::TicketStatus;
use crate::utils::response::error as error_response;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Event {0} is not active")]
    EventNotActive(Uuid),

    #[error("Event is already {0}")]
    EventAlreadyFinished(EventStatus),

    #[error("Ticket is {0} and can no longer change status")]
    InvalidTicketStatus(TicketStatus),

    #[error("Insufficient tickets: requested {requested}, remaining {remaining}")]
    InsufficientTickets { requested: u32, remaining: i64 },

    #[error("Cannot reserve {requested} tickets at once (maximum {max})")]
    QuantityExceeded { requested: u32, max: u32 },

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn event_not_found(id: Uuid) -> Self {
        AppError::NotFound(format!("Event with id '{}' was not found", id))
    }

    pub fn ticket_not_found(id: Uuid) -> Self {
        AppError::NotFound(format!("Ticket with id '{}' was not found", id))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::EventNotActive(_)
            | AppError::EventAlreadyFinished(_)
            | AppError::InvalidTicketStatus(_)
            | AppError::InsufficientTickets { .. }
            | AppError::QuantityExceeded { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotAuthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_)
            | AppError::Timeout(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotAuthorized(_) => "NOT_AUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::EventNotActive(_) => "EVENT_NOT_ACTIVE",
            AppError::EventAlreadyFinished(_) => "EVENT_ALREADY_FINISHED",
            AppError::InvalidTicketStatus(_) => "INVALID_TICKET_STATUS",
            AppError::InsufficientTickets { .. } => "INSUFFICIENT_TICKETS",
            AppError::QuantityExceeded { .. } => "QUANTITY_EXCEEDED",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::Timeout(limit) => {
                error!(limit = ?limit, "Storage operation timed out");
            }
            AppError::InternalServerError(msg) => {
                error!(message = %msg, "Internal server error");
            }
            _ => {
                warn!(code = self.code(), error = %self, "Request rejected");
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InsufficientTickets {
                requested,
                remaining,
            } => Some(json!({ "requested": requested, "remaining": remaining })),
            AppError::QuantityExceeded { requested, max } => {
                Some(json!({ "requested": requested, "max": max }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Storage failures only expose a generic message
        let public_message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::Timeout(_) => "The operation timed out".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotAuthorized(msg)
            | AppError::NotFound(msg) => msg.clone(),
            other => other.to_string(),
        };

        error_response(code, public_message, self.details(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors_map_to_bad_request() {
        let errors = [
            AppError::EventNotActive(Uuid::new_v4()),
            AppError::EventAlreadyFinished(EventStatus::Finished),
            AppError::InvalidTicketStatus(TicketStatus::Expired),
            AppError::InsufficientTickets {
                requested: 2,
                remaining: 1,
            },
            AppError::QuantityExceeded {
                requested: 6,
                max: 5,
            },
            AppError::ValidationError("bad".to_string()),
        ];

        for err in errors {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST, "{}", err);
        }
    }

    #[test]
    fn test_access_errors_status_codes() {
        assert_eq!(
            AppError::NotAuthorized("nope".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::event_not_found(Uuid::new_v4()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::AuthError("missing".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_storage_errors_are_generic_failures() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "DATABASE_ERROR");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
