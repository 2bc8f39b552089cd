//! The Taleforge narrative turn loop.
//!
//! A player action becomes a [`application::orchestrator::TurnOutcome`] in
//! five steps: assemble the context, dispatch with the tool catalog attached,
//! execute tool calls against a staged working set, reconcile the narrative
//! with the tool results, and commit everything in one write. World-entity
//! extraction runs afterwards in the background.

pub mod application;
pub mod domain;
pub mod error;
