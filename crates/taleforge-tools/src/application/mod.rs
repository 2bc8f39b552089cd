//! Application layer for the tools context.

pub mod executor;
pub mod handlers;
