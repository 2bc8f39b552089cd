//! Shared test doubles and fixtures for the Taleforge engine.

mod clock;
mod fixtures;
mod provider;
mod rng;
mod store;

pub use clock::{FixedClock, ManualClock};
pub use fixtures::{sample_campaign, sample_character, seeded_store};
pub use provider::{
    FailingProvider, RecordedCall, ScriptedProvider, single_provider_dispatcher, text_completion,
    tool_call,
};
pub use rng::{MockRng, SequenceRng};
pub use store::FailingGameStore;
