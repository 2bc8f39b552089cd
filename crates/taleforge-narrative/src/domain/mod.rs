//! Domain layer for the narrative context.

pub mod extraction;
pub mod prompt;
