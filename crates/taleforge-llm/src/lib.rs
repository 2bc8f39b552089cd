//! Text-generation dispatch for the Taleforge engine.
//!
//! Every generation call goes through the [`dispatcher::Dispatcher`]: it picks
//! a provider, asks the [`rate_limiter::RateLimiter`] for admission, runs the
//! call on the [`queue::RequestQueue`] (timeout + bounded retry) and applies the
//! primary → fallback → offline chain when a provider is unavailable.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod rate_limiter;
