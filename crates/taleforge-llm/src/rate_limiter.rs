//! Per-provider sliding-window admission control.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use taleforge_core::clock::Clock;

use crate::provider::ProviderKind;

/// Length of the trailing window.
pub const WINDOW_SECS: i64 = 60;

/// Default admissions per provider per window.
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 60;

/// Tracks admitted requests per provider over the trailing 60 seconds.
///
/// Entries at or older than the window edge are pruned on every check, so a
/// window never holds more than its ceiling.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    default_ceiling: usize,
    ceilings: HashMap<ProviderKind, usize>,
    windows: Mutex<HashMap<ProviderKind, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    /// Creates a limiter applying `default_ceiling` to every provider.
    pub fn new(clock: Arc<dyn Clock>, default_ceiling: usize) -> Self {
        Self {
            clock,
            default_ceiling,
            ceilings: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the ceiling for one provider.
    #[must_use]
    pub fn with_ceiling(mut self, provider: ProviderKind, ceiling: usize) -> Self {
        self.ceilings.insert(provider, ceiling);
        self
    }

    /// Ceiling that applies to `provider`.
    #[must_use]
    pub fn ceiling(&self, provider: ProviderKind) -> usize {
        self.ceilings
            .get(&provider)
            .copied()
            .unwrap_or(self.default_ceiling)
    }

    /// Records an admission for `provider` if the window has room.
    pub fn admit(&self, provider: ProviderKind) -> bool {
        let now = self.clock.now();
        let ceiling = self.ceiling(provider);
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(provider).or_default();
        prune(window, now);
        if window.len() < ceiling {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    /// Admissions currently counted in the window.
    #[must_use]
    pub fn in_window(&self, provider: ProviderKind) -> usize {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows.get_mut(&provider).map_or(0, |window| {
            prune(window, now);
            window.len()
        })
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let edge = now - Duration::seconds(WINDOW_SECS);
    while window.front().is_some_and(|t| *t <= edge) {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StepClock(Mutex<DateTime<Utc>>);

    impl StepClock {
        fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(secs);
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn clock() -> Arc<StepClock> {
        Arc::new(StepClock(Mutex::new(Utc::now())))
    }

    #[test]
    fn test_admit_rejects_past_ceiling() {
        let limiter = RateLimiter::new(clock(), 3);

        let admitted = (0..5).filter(|_| limiter.admit(ProviderKind::OpenAi)).count();

        assert_eq!(admitted, 3);
        assert_eq!(limiter.in_window(ProviderKind::OpenAi), 3);
    }

    #[test]
    fn test_window_slides_after_sixty_seconds() {
        let clock = clock();
        let limiter = RateLimiter::new(clock.clone(), 2);
        assert!(limiter.admit(ProviderKind::Gemini));
        clock.advance(30);
        assert!(limiter.admit(ProviderKind::Gemini));
        assert!(!limiter.admit(ProviderKind::Gemini));

        clock.advance(30);

        assert!(limiter.admit(ProviderKind::Gemini));
        assert!(!limiter.admit(ProviderKind::Gemini));
    }

    #[test]
    fn test_never_exceeds_ceiling_in_any_trailing_window() {
        let clock = clock();
        let limiter = RateLimiter::new(clock.clone(), 5);
        let mut admitted_at: Vec<i64> = Vec::new();

        for second in 0..240 {
            if limiter.admit(ProviderKind::Local) {
                admitted_at.push(second);
            }
            clock.advance(1);
        }

        for &start in &admitted_at {
            let in_window = admitted_at
                .iter()
                .filter(|&&t| t >= start && t < start + WINDOW_SECS)
                .count();
            assert!(in_window <= 5, "window at {start} admitted {in_window}");
        }
    }

    #[test]
    fn test_ceilings_are_per_provider() {
        let limiter = RateLimiter::new(clock(), 1).with_ceiling(ProviderKind::Local, 2);

        assert!(limiter.admit(ProviderKind::OpenAi));
        assert!(!limiter.admit(ProviderKind::OpenAi));
        assert!(limiter.admit(ProviderKind::Local));
        assert!(limiter.admit(ProviderKind::Local));
        assert!(!limiter.admit(ProviderKind::Local));
    }
}
