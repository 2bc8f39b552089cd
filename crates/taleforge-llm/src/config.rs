//! Environment-driven LLM configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use taleforge_core::clock::Clock;

use crate::dispatcher::{DispatchPolicy, Dispatcher, ProviderRegistry};
use crate::error::LlmError;
use crate::provider::ProviderKind;
use crate::providers::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::providers::openai::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::providers::{GeminiProvider, MockProvider, OpenAiCompatibleProvider};
use crate::queue::{QueueConfig, RequestQueue};
use crate::rate_limiter::{DEFAULT_REQUESTS_PER_MINUTE, RateLimiter};

const DEFAULT_LOCAL_MODEL: &str = "llama3";
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Settings for a hosted provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSettings {
    /// API key; the provider is registered only when present.
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Default model.
    pub model: String,
    /// Completion token ceiling.
    pub max_tokens: u32,
}

/// Settings for a local OpenAI-compatible server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSettings {
    /// Server base URL; the provider is registered only when present.
    pub base_url: Option<String>,
    /// Default model.
    pub model: String,
    /// Completion token ceiling.
    pub max_tokens: u32,
}

/// Everything needed to build the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    /// Provider used when a call gives no hint.
    pub default_provider: ProviderKind,
    /// One-hop fallback.
    pub fallback_provider: Option<ProviderKind>,
    /// Whether the offline narrator is the last resort.
    pub offline_fallback: bool,
    /// Admissions per provider per minute.
    pub rate_limit_per_minute: usize,
    /// Queue tuning.
    pub queue: QueueConfig,
    /// OpenAI.
    pub openai: HostedSettings,
    /// Gemini.
    pub gemini: HostedSettings,
    /// Local server.
    pub local: LocalSettings,
}

impl LlmConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// Without `LLM_DEFAULT_PROVIDER` the first configured provider among
    /// OpenAI, Gemini and local wins, and the offline narrator otherwise.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::UnknownProvider` for an unknown provider name and
    /// `LlmError::Config` for an unparsable number or boolean.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let openai = HostedSettings {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_owned()),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_owned()),
            max_tokens: parse(&get, "OPENAI_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
        };
        let gemini = HostedSettings {
            api_key: get("GEMINI_API_KEY"),
            base_url: get("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_owned()),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_owned()),
            max_tokens: parse(&get, "GEMINI_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
        };
        let local = LocalSettings {
            base_url: get("LOCAL_LLM_BASE_URL"),
            model: get("LOCAL_LLM_MODEL").unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_owned()),
            max_tokens: parse(&get, "LOCAL_LLM_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
        };

        let default_provider = match get("LLM_DEFAULT_PROVIDER") {
            Some(name) => name.parse()?,
            None if openai.api_key.is_some() => ProviderKind::OpenAi,
            None if gemini.api_key.is_some() => ProviderKind::Gemini,
            None if local.base_url.is_some() => ProviderKind::Local,
            None => ProviderKind::Mock,
        };
        let fallback_provider = get("LLM_FALLBACK_PROVIDER")
            .map(|name| name.parse::<ProviderKind>())
            .transpose()?;

        let queue = QueueConfig {
            timeout: Duration::from_secs(parse(&get, "LLM_TIMEOUT_SECS", 30)?),
            max_attempts: parse(&get, "LLM_MAX_ATTEMPTS", 3)?,
            backoff_base: Duration::from_millis(parse(&get, "LLM_BACKOFF_BASE_MS", 2000)?),
            max_concurrency: parse(&get, "LLM_MAX_CONCURRENCY", 1)?,
        };

        Ok(Self {
            default_provider,
            fallback_provider,
            offline_fallback: parse(&get, "LLM_OFFLINE_FALLBACK", true)?,
            rate_limit_per_minute: parse(
                &get,
                "LLM_RATE_LIMIT_PER_MINUTE",
                DEFAULT_REQUESTS_PER_MINUTE,
            )?,
            queue,
            openai,
            gemini,
            local,
        })
    }

    /// Adapters for every configured backend. The offline narrator is always
    /// registered.
    #[must_use]
    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new().with(Arc::new(MockProvider::new()));
        if let Some(key) = &self.openai.api_key {
            registry.register(Arc::new(OpenAiCompatibleProvider::new(
                ProviderKind::OpenAi,
                &self.openai.base_url,
                Some(key.clone()),
                &self.openai.model,
                self.openai.max_tokens,
            )));
        }
        if let Some(key) = &self.gemini.api_key {
            registry.register(Arc::new(GeminiProvider::new(
                &self.gemini.base_url,
                key.clone(),
                &self.gemini.model,
                self.gemini.max_tokens,
            )));
        }
        if let Some(base_url) = &self.local.base_url {
            registry.register(Arc::new(OpenAiCompatibleProvider::new(
                ProviderKind::Local,
                base_url,
                None,
                &self.local.model,
                self.local.max_tokens,
            )));
        }
        registry
    }

    /// Builds the dispatcher with its limiter and queue.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` if the default or fallback provider is not
    /// configured.
    pub fn build_dispatcher(&self, clock: Arc<dyn Clock>) -> Result<Dispatcher, LlmError> {
        Dispatcher::new(
            self.registry(),
            DispatchPolicy {
                default_provider: self.default_provider,
                fallback_provider: self.fallback_provider,
                offline_fallback: self.offline_fallback,
            },
            RateLimiter::new(clock, self.rate_limit_per_minute),
            RequestQueue::new(self.queue),
        )
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, LlmError> {
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| LlmError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
