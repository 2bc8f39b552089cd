//! Turn-structured encounters for Taleforge.
//!
//! The [`application::coordinator::CombatCoordinator`] is the sole owner of
//! encounter state. Every inbound protocol message goes through its single
//! transition function and comes back as a list of broadcasts.

pub mod application;
pub mod domain;
pub mod error;
