//! Domain layer for the tools context.

pub mod arguments;
pub mod catalog;
pub mod working_set;
