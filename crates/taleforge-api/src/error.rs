//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use taleforge_combat::error::CombatError;
use taleforge_core::error::DomainError;
use taleforge_llm::error::LlmError;
use taleforge_narrative::error::NarrativeError;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The provider registry could not be built.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// The tracing pipeline could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// An error already mapped to its HTTP status and code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        Self {
            status,
            code,
            message: message.to_string(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let (status, code) = match &err {
            DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error")
            }
        };
        Self::new(status, code, err)
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        let (status, code) = match &err {
            LlmError::RateLimitExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            LlmError::Provider { .. }
            | LlmError::InvalidResponse { .. }
            | LlmError::Timeout { .. }
            | LlmError::RetriesExhausted { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            LlmError::UnknownProvider(_)
            | LlmError::NotRegistered(_)
            | LlmError::QueueClosed
            | LlmError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "llm_configuration_error"),
        };
        Self::new(status, code, err)
    }
}

impl From<CombatError> for ApiError {
    fn from(err: CombatError) -> Self {
        let status = match err {
            CombatError::Store(inner) => return inner.into(),
            CombatError::TurnOrderViolation { .. } | CombatError::AlreadyActive => {
                StatusCode::CONFLICT
            }
            CombatError::NotActive => StatusCode::NOT_FOUND,
            CombatError::UnknownCombatant(_)
            | CombatError::NoCombatants
            | CombatError::InvalidDice(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.code(), err)
    }
}

impl From<NarrativeError> for ApiError {
    fn from(err: NarrativeError) -> Self {
        match err {
            NarrativeError::Dispatch(inner) => inner.into(),
            NarrativeError::State(inner) => inner.into(),
            NarrativeError::Combat(inner) => inner.into(),
            NarrativeError::TurnInProgress(_) => {
                Self::new(StatusCode::CONFLICT, "turn_in_progress", err)
            }
            NarrativeError::Extraction(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "extraction_error", err)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taleforge_llm::provider::ProviderKind;
    use uuid::Uuid;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::not_found("campaign", Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_of(DomainError::Validation("bad input".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        assert_eq!(
            status_of(DomainError::Infrastructure("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_turn_in_progress_maps_to_409() {
        assert_eq!(
            status_of(NarrativeError::TurnInProgress(Uuid::new_v4())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_turn_order_violation_maps_to_409() {
        assert_eq!(
            status_of(CombatError::TurnOrderViolation {
                expected: "aria".into(),
                actual: "goblin-1".into(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_rate_limit_maps_to_429() {
        assert_eq!(
            status_of(NarrativeError::Dispatch(LlmError::RateLimitExceeded {
                provider: ProviderKind::OpenAi,
            })),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_provider_failure_maps_to_502() {
        assert_eq!(
            status_of(LlmError::Provider {
                provider: ProviderKind::Gemini,
                message: "upstream 503".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_combat_store_failure_uses_domain_mapping() {
        assert_eq!(
            status_of(CombatError::Store(DomainError::Infrastructure("db down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
