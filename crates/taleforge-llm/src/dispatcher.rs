//! Provider selection, admission and the primary → fallback → offline chain.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::error::LlmError;
use crate::provider::{Completion, CompletionOptions, ProviderAdapter, ProviderKind};
use crate::queue::{GenerationRequest, RequestQueue};
use crate::rate_limiter::RateLimiter;

/// Static registry of configured adapters, built once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its descriptor's kind, replacing any
    /// previous adapter of that kind.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.descriptor().kind, adapter);
    }

    /// Builder-style [`Self::register`].
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Adapter for `kind`.
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind)
    }

    /// Whether `kind` is registered.
    #[must_use]
    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Registered kinds, in no particular order.
    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.adapters.keys().copied()
    }
}

/// Which providers to try, in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Provider used when the caller gives no hint.
    pub default_provider: ProviderKind,
    /// Single hop tried when the primary is rate limited or failing.
    pub fallback_provider: Option<ProviderKind>,
    /// Whether the offline narrator is the last resort.
    pub offline_fallback: bool,
}

/// Entry point for every generation call.
pub struct Dispatcher {
    registry: ProviderRegistry,
    policy: DispatchPolicy,
    limiter: RateLimiter,
    queue: RequestQueue,
}

impl Dispatcher {
    /// Creates a dispatcher after checking the policy against the registry.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the default or fallback provider is not
    /// registered.
    pub fn new(
        registry: ProviderRegistry,
        policy: DispatchPolicy,
        limiter: RateLimiter,
        queue: RequestQueue,
    ) -> Result<Self, LlmError> {
        if !registry.contains(policy.default_provider) {
            return Err(LlmError::Config(format!(
                "default provider {} is not configured",
                policy.default_provider
            )));
        }
        if let Some(fallback) = policy.fallback_provider {
            if !registry.contains(fallback) {
                return Err(LlmError::Config(format!(
                    "fallback provider {fallback} is not configured"
                )));
            }
        }
        Ok(Self {
            registry,
            policy,
            limiter,
            queue,
        })
    }

    /// Dispatch policy in effect.
    #[must_use]
    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Configured adapters.
    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Generates a completion on `hint` (or the default provider).
    ///
    /// If the primary is rate limited or fails, the configured fallback is
    /// tried once, provided it differs from the primary; no further chaining.
    /// When offline fallback is enabled and the mock provider is registered
    /// and untried, it serves as the last resort.
    ///
    /// # Errors
    ///
    /// Returns the error of the last provider tried once every tier failed.
    #[instrument(skip(self, prompt, options), fields(hint = ?hint))]
    pub async fn execute(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        hint: Option<ProviderKind>,
    ) -> Result<Completion, LlmError> {
        let primary = hint.unwrap_or(self.policy.default_provider);
        let mut tried = Vec::with_capacity(3);

        let mut last = match self.attempt(primary, prompt, options).await {
            Ok(completion) => return Ok(completion),
            Err(e) => e,
        };
        tried.push(primary);

        if let Some(fallback) = self.policy.fallback_provider.filter(|f| *f != primary) {
            warn!(from = %primary, to = %fallback, error = %last, "Primary provider unavailable, falling back");
            match self.attempt(fallback, prompt, options).await {
                Ok(completion) => return Ok(completion),
                Err(e) => last = e,
            }
            tried.push(fallback);
        }

        if self.policy.offline_fallback
            && !tried.contains(&ProviderKind::Mock)
            && self.registry.contains(ProviderKind::Mock)
        {
            warn!(error = %last, "All configured providers unavailable, using offline narrator");
            match self.attempt(ProviderKind::Mock, prompt, options).await {
                Ok(completion) => return Ok(completion),
                Err(e) => last = e,
            }
        }

        Err(last)
    }

    async fn attempt(
        &self,
        kind: ProviderKind,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let adapter = self
            .registry
            .get(kind)
            .ok_or(LlmError::NotRegistered(kind))?;

        if kind.is_metered() && !self.limiter.admit(kind) {
            warn!(provider = %kind, ceiling = self.limiter.ceiling(kind), "Provider admission rejected");
            return Err(LlmError::RateLimitExceeded { provider: kind });
        }

        let ceiling = adapter.descriptor().max_tokens;
        let mut options = options.clone();
        options.max_tokens = Some(options.max_tokens.map_or(ceiling, |m| m.min(ceiling)));

        self.queue
            .submit(
                adapter.as_ref(),
                GenerationRequest {
                    prompt: prompt.to_owned(),
                    options,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use taleforge_core::clock::Clock;

    use super::*;
    use crate::provider::{FinishReason, ProviderDescriptor};
    use crate::queue::QueueConfig;

    struct StillClock(DateTime<Utc>);

    impl Clock for StillClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct CountingAdapter {
        descriptor: ProviderDescriptor,
        calls: AtomicU32,
        fail: bool,
        seen_max_tokens: Mutex<Option<u32>>,
    }

    impl CountingAdapter {
        fn new(kind: ProviderKind, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ProviderDescriptor {
                    kind,
                    default_model: kind.as_str().to_owned(),
                    max_tokens: 500,
                    chars_per_token: 4,
                },
                calls: AtomicU32::new(0),
                fail,
                seen_max_tokens: Mutex::new(None),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for CountingAdapter {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn generate_completion(
            &self,
            _prompt: &str,
            options: &CompletionOptions,
        ) -> Result<Completion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_max_tokens.lock().unwrap() = options.max_tokens;
            if self.fail {
                return Err(LlmError::InvalidResponse {
                    provider: self.descriptor.kind,
                    message: "garbled".to_owned(),
                });
            }
            Ok(Completion {
                content: format!("from {}", self.descriptor.kind),
                tokens_used: 3,
                model: self.descriptor.default_model.clone(),
                finish_reason: FinishReason::Stop,
                tool_calls: Vec::new(),
                provider: self.descriptor.kind,
            })
        }
    }

    fn limiter(ceiling: usize) -> RateLimiter {
        RateLimiter::new(Arc::new(StillClock(Utc::now())), ceiling)
    }

    fn queue() -> RequestQueue {
        RequestQueue::new(QueueConfig {
            timeout: Duration::from_secs(1),
            max_attempts: 1,
            backoff_base: Duration::from_millis(1),
            max_concurrency: 1,
        })
    }

    fn policy(fallback: Option<ProviderKind>, offline: bool) -> DispatchPolicy {
        DispatchPolicy {
            default_provider: ProviderKind::OpenAi,
            fallback_provider: fallback,
            offline_fallback: offline,
        }
    }

    #[tokio::test]
    async fn test_rate_limited_primary_uses_fallback_exactly_once() {
        let primary = CountingAdapter::new(ProviderKind::OpenAi, false);
        let fallback = CountingAdapter::new(ProviderKind::Gemini, false);
        let registry = ProviderRegistry::new()
            .with(primary.clone())
            .with(fallback.clone());
        let limiter = limiter(5).with_ceiling(ProviderKind::OpenAi, 0);
        let dispatcher = Dispatcher::new(
            registry,
            policy(Some(ProviderKind::Gemini), false),
            limiter,
            queue(),
        )
        .unwrap();

        let completion = dispatcher
            .execute("look around", &CompletionOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(completion.provider, ProviderKind::Gemini);
        assert_eq!(primary.calls(), 0);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_without_fallback() {
        let primary = CountingAdapter::new(ProviderKind::OpenAi, false);
        let registry = ProviderRegistry::new().with(primary);
        let dispatcher =
            Dispatcher::new(registry, policy(None, false), limiter(0), queue()).unwrap();

        let err = dispatcher
            .execute("look around", &CompletionOptions::default(), None)
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_failing_primary_and_fallback_reach_offline_narrator() {
        let primary = CountingAdapter::new(ProviderKind::OpenAi, true);
        let fallback = CountingAdapter::new(ProviderKind::Gemini, true);
        let offline = CountingAdapter::new(ProviderKind::Mock, false);
        let registry = ProviderRegistry::new()
            .with(primary.clone())
            .with(fallback.clone())
            .with(offline.clone());
        let dispatcher = Dispatcher::new(
            registry,
            policy(Some(ProviderKind::Gemini), true),
            limiter(10),
            queue(),
        )
        .unwrap();

        let completion = dispatcher
            .execute("look around", &CompletionOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(completion.provider, ProviderKind::Mock);
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(offline.calls(), 1);
    }

    #[tokio::test]
    async fn test_fallback_equal_to_hint_is_not_retried() {
        let gemini = CountingAdapter::new(ProviderKind::Gemini, true);
        let registry = ProviderRegistry::new()
            .with(CountingAdapter::new(ProviderKind::OpenAi, false))
            .with(gemini.clone());
        let dispatcher = Dispatcher::new(
            registry,
            policy(Some(ProviderKind::Gemini), false),
            limiter(10),
            queue(),
        )
        .unwrap();

        let result = dispatcher
            .execute(
                "look around",
                &CompletionOptions::default(),
                Some(ProviderKind::Gemini),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(gemini.calls(), 1);
    }

    #[tokio::test]
    async fn test_max_tokens_clamped_to_provider_ceiling() {
        let primary = CountingAdapter::new(ProviderKind::OpenAi, false);
        let registry = ProviderRegistry::new().with(primary.clone());
        let dispatcher =
            Dispatcher::new(registry, policy(None, false), limiter(10), queue()).unwrap();
        let options = CompletionOptions {
            max_tokens: Some(10_000),
            ..CompletionOptions::default()
        };

        dispatcher.execute("go", &options, None).await.unwrap();

        assert_eq!(*primary.seen_max_tokens.lock().unwrap(), Some(500));
    }

    #[test]
    fn test_new_rejects_unregistered_fallback() {
        let registry =
            ProviderRegistry::new().with(CountingAdapter::new(ProviderKind::OpenAi, false));

        let result = Dispatcher::new(
            registry,
            policy(Some(ProviderKind::Gemini), false),
            limiter(10),
            queue(),
        );

        assert!(matches!(result, Err(LlmError::Config(_))));
    }
}
