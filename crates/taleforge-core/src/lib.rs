//! Shared domain abstractions for the Taleforge engine.
//!
//! This crate defines the value types, the persistence contract and the
//! determinism seams (clock, RNG) that every other crate depends on. The only
//! store implementation here is the in-process one; durable backends live in
//! their own crates.

pub mod canonical;
pub mod clock;
pub mod combat;
pub mod context;
pub mod dice;
pub mod error;
pub mod memory_store;
pub mod model;
pub mod rng;
pub mod store;
