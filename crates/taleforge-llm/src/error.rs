//! Errors raised while dispatching generation requests.

use std::time::Duration;

use thiserror::Error;

use crate::provider::ProviderKind;

/// Generation dispatch errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider's per-minute ceiling was reached.
    #[error("rate limit exceeded for provider {provider}")]
    RateLimitExceeded {
        /// Rejected provider.
        provider: ProviderKind,
    },

    /// The backend returned an error or the transport failed.
    #[error("provider {provider} failed: {message}")]
    Provider {
        /// Failing provider.
        provider: ProviderKind,
        /// Backend message.
        message: String,
    },

    /// The backend answered with a shape the adapter cannot normalize.
    #[error("invalid response from provider {provider}: {message}")]
    InvalidResponse {
        /// Failing provider.
        provider: ProviderKind,
        /// What was wrong.
        message: String,
    },

    /// A queued job did not finish within its timeout.
    #[error("provider {provider} timed out after {after:?}")]
    Timeout {
        /// Provider the job targeted.
        provider: ProviderKind,
        /// Configured timeout.
        after: Duration,
    },

    /// Every attempt of a queued job failed.
    #[error("provider {provider} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Provider the job targeted.
        provider: ProviderKind,
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: Box<LlmError>,
    },

    /// A provider name that does not map to any known backend.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// A known provider that was not configured at startup.
    #[error("provider {0} is not registered")]
    NotRegistered(ProviderKind),

    /// The queue's slot semaphore was closed.
    #[error("request queue closed")]
    QueueClosed,

    /// Invalid startup configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether the request queue should try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::InvalidResponse { .. } | Self::Timeout { .. }
        )
    }

    /// Whether the error originates from admission control.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }
}
