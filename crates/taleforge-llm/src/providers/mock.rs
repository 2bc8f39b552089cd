//! Offline narrator used when every real provider is unavailable.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::provider::{
    Completion, CompletionOptions, FinishReason, ProviderAdapter, ProviderDescriptor, ProviderKind,
};

const LINES: [&str; 4] = [
    "The world holds its breath for a moment. Whatever you attempt, the outcome is not yet clear; the threads of fate are tangled.",
    "A hush settles over the scene. Your action lingers in the air, its consequences waiting to unfold.",
    "Shadows shift at the edge of your vision. Something has changed, though it is too soon to say what.",
    "Time seems to slow. The moment stretches, and the story waits for the narrator's voice to return.",
];

/// Deterministic canned narration. Never calls tools, never fails.
#[derive(Debug, Clone)]
pub struct MockProvider {
    descriptor: ProviderDescriptor,
}

impl MockProvider {
    /// Creates the offline narrator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: ProviderDescriptor {
                kind: ProviderKind::Mock,
                default_model: "offline-narrator".to_string(),
                max_tokens: 1024,
                chars_per_token: 4,
            },
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let index = prompt.bytes().map(usize::from).sum::<usize>() % LINES.len();
        let content = LINES[index].to_string();
        Ok(Completion {
            tokens_used: self.descriptor.count_tokens(prompt)
                + self.descriptor.count_tokens(&content),
            content,
            model: self.descriptor.default_model.clone(),
            finish_reason: FinishReason::Stop,
            tool_calls: Vec::new(),
            provider: ProviderKind::Mock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_prompt_gets_same_line() {
        let provider = MockProvider::new();
        let options = CompletionOptions::default();

        let a = provider.generate_completion("I knock", &options).await.unwrap();
        let b = provider.generate_completion("I knock", &options).await.unwrap();

        assert_eq!(a.content, b.content);
        assert!(a.tool_calls.is_empty());
        assert_eq!(a.provider, ProviderKind::Mock);
    }
}
