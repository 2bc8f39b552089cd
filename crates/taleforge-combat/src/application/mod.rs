//! Application layer for the combat context.

pub mod coordinator;
