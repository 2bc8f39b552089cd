//! Narrative errors. A turn that returns one has committed nothing.

use taleforge_combat::error::CombatError;
use taleforge_core::error::DomainError;
use taleforge_llm::error::LlmError;
use taleforge_tools::error::ToolError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the turn loop and background extraction.
#[derive(Debug, Error)]
pub enum NarrativeError {
    /// Every provider tier failed.
    #[error(transparent)]
    Dispatch(#[from] LlmError),

    /// Reading or committing game state failed.
    #[error(transparent)]
    State(#[from] DomainError),

    /// Reading the encounter failed.
    #[error(transparent)]
    Combat(#[from] CombatError),

    /// The extraction reply could not be read. Only ever logged.
    #[error("entity extraction failed: {0}")]
    Extraction(String),

    /// Another turn for the same campaign is still running.
    #[error("a turn is already in progress for campaign {0}")]
    TurnInProgress(Uuid),
}

impl From<ToolError> for NarrativeError {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::Store(inner) => Self::State(inner),
            other => Self::State(DomainError::Infrastructure(other.to_string())),
        }
    }
}
