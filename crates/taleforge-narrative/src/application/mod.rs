//! Application layer for the narrative context.

pub mod context;
pub mod extractor;
pub mod orchestrator;
