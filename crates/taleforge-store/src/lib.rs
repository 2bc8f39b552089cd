//! PostgreSQL implementation of the `GameStore` contract.

pub mod pg_game_store;
pub mod schema;
