//! HTTP and WebSocket routes.

pub mod actions;
pub mod combat;
pub mod health;
