//! Domain layer for the combat context.

pub mod attack;
pub mod initiative;
pub mod messages;
