//! Tool errors. None of them abort a batch; each becomes the `error` of a
//! single tool result.

use taleforge_core::error::DomainError;
use thiserror::Error;

/// Errors raised while executing a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model named a function that is not in the catalog.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The argument payload is not valid JSON or does not match the schema.
    #[error("invalid arguments for {tool}: {message}")]
    Argument {
        /// Tool name.
        tool: &'static str,
        /// What was wrong.
        message: String,
    },

    /// The arguments were well formed but the game rules refused them.
    #[error("{tool} failed: {message}")]
    Execution {
        /// Tool name.
        tool: &'static str,
        /// Why.
        message: String,
    },

    /// Loading the working set failed.
    #[error(transparent)]
    Store(#[from] DomainError),
}
