//! Combat errors.

use taleforge_core::error::DomainError;
use thiserror::Error;

/// Errors raised by combat transitions.
#[derive(Debug, Error)]
pub enum CombatError {
    /// An actor tried to act outside their turn.
    #[error("it is {expected}'s turn, not {actual}'s")]
    TurnOrderViolation {
        /// Current turn holder.
        expected: String,
        /// Actor that attempted the action.
        actual: String,
    },

    /// No encounter is running for the campaign.
    #[error("no combat is active")]
    NotActive,

    /// An encounter is already running for the campaign.
    #[error("combat is already active")]
    AlreadyActive,

    /// A combatant id that is not in the turn order.
    #[error("unknown combatant: {0}")]
    UnknownCombatant(String),

    /// An encounter needs at least one combatant.
    #[error("combat requires at least one combatant")]
    NoCombatants,

    /// Damage notation that does not parse.
    #[error("invalid damage dice: {0}")]
    InvalidDice(String),

    /// The store or RNG failed.
    #[error(transparent)]
    Store(#[from] DomainError),
}

impl CombatError {
    /// Machine-readable code sent in `combat:error`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::TurnOrderViolation { .. } => "turn_order_violation",
            Self::NotActive => "combat_not_active",
            Self::AlreadyActive => "combat_already_active",
            Self::UnknownCombatant(_) => "unknown_combatant",
            Self::NoCombatants => "no_combatants",
            Self::InvalidDice(_) => "invalid_dice",
            Self::Store(_) => "internal_error",
        }
    }
}
