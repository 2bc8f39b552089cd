//! Model tools: the only path by which the model changes game state.
//!
//! The [`domain::catalog::ToolCatalog`] declares the JSON-schema functions the
//! model may call. The [`application::executor::ToolExecutor`] parses each
//! untrusted call, applies it to a staged [`domain::working_set::WorkingSet`]
//! and always answers with a [`application::executor::ToolResult`].

pub mod application;
pub mod domain;
pub mod error;
