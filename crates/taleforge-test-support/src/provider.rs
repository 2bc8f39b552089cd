//! Test providers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use taleforge_llm::dispatcher::{DispatchPolicy, Dispatcher, ProviderRegistry};
use taleforge_llm::error::LlmError;
use taleforge_llm::provider::{
    Completion, CompletionOptions, FinishReason, ProviderAdapter, ProviderDescriptor, ProviderKind,
    ToolCall,
};
use taleforge_llm::queue::{QueueConfig, RequestQueue};
use taleforge_llm::rate_limiter::RateLimiter;

use crate::clock::FixedClock;

/// A prompt the scripted provider received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// User segment.
    pub prompt: String,
    /// Options as received (after dispatcher clamping).
    pub options: CompletionOptions,
}

/// Plays back queued completions in order and records every call. Returns a
/// provider error once the script runs out.
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedProvider {
    /// Create an empty script for `kind`.
    #[must_use]
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                kind,
                default_model: format!("scripted-{kind}"),
                max_tokens: 4096,
                chars_per_token: 4,
            },
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text completion.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn then_text(self, content: &str) -> Self {
        let kind = self.descriptor.kind;
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(text_completion(kind, content)));
        self
    }

    /// Queue a completion that requests tool calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn then_tool_calls(self, content: &str, calls: Vec<ToolCall>) -> Self {
        let mut completion = text_completion(self.descriptor.kind, content);
        completion.finish_reason = FinishReason::ToolCalls;
        completion.tool_calls = calls;
        self.script.lock().unwrap().push_back(Ok(completion));
        self
    }

    /// Queue an error.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn then_error(self, error: LlmError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Every call received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_owned(),
            options: options.clone(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Provider {
                    provider: self.descriptor.kind,
                    message: "script exhausted".to_owned(),
                })
            })
    }
}

/// Always fails with a provider error.
pub struct FailingProvider {
    descriptor: ProviderDescriptor,
    calls: AtomicU32,
}

impl FailingProvider {
    /// Create a failing provider for `kind`.
    #[must_use]
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            descriptor: ProviderDescriptor {
                kind,
                default_model: format!("failing-{kind}"),
                max_tokens: 4096,
                chars_per_token: 4,
            },
            calls: AtomicU32::new(0),
        }
    }

    /// Number of calls received.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FailingProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate_completion(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::Provider {
            provider: self.descriptor.kind,
            message: "backend unavailable".to_owned(),
        })
    }
}

/// A stop completion carrying `content`.
#[must_use]
pub fn text_completion(provider: ProviderKind, content: &str) -> Completion {
    Completion {
        content: content.to_owned(),
        tokens_used: 10,
        model: format!("scripted-{provider}"),
        finish_reason: FinishReason::Stop,
        tool_calls: Vec::new(),
        provider,
    }
}

/// A tool call with JSON `arguments`.
#[must_use]
pub fn tool_call(id: &str, name: &str, arguments: &serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments: arguments.to_string(),
    }
}

/// A dispatcher whose only provider is `adapter`: no fallback, no offline
/// narrator, one attempt per call and a generous rate ceiling.
///
/// # Panics
///
/// Never in practice; the adapter's own kind is always registered.
#[must_use]
pub fn single_provider_dispatcher(adapter: Arc<dyn ProviderAdapter>) -> Dispatcher {
    let kind = adapter.descriptor().kind;
    Dispatcher::new(
        ProviderRegistry::new().with(adapter),
        DispatchPolicy {
            default_provider: kind,
            fallback_provider: None,
            offline_fallback: false,
        },
        RateLimiter::new(Arc::new(FixedClock(Utc::now())), 1000),
        RequestQueue::new(QueueConfig {
            timeout: Duration::from_secs(5),
            max_attempts: 1,
            backoff_base: Duration::from_millis(1),
            max_concurrency: 4,
        }),
    )
    .expect("adapter kind is registered")
}
