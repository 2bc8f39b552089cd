//! The uniform provider contract every backend adapter implements.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Statically known provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions.
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
    /// A local OpenAI-compatible server (llama.cpp, Ollama, vLLM).
    Local,
    /// Offline narrator, the last resort when everything else is down.
    Mock,
}

impl ProviderKind {
    /// Lowercase identifier used in configuration and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Local => "local",
            Self::Mock => "mock",
        }
    }

    /// Whether admissions count against a rate window.
    #[must_use]
    pub fn is_metered(self) -> bool {
        !matches!(self, Self::Mock)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "local" | "ollama" | "llamacpp" => Ok(Self::Local),
            "mock" | "offline" => Ok(Self::Mock),
            other => Err(LlmError::UnknownProvider(other.to_owned())),
        }
    }
}

/// Static facts about a registered provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    /// Backend kind.
    pub kind: ProviderKind,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Hard ceiling on completion tokens.
    pub max_tokens: u32,
    /// Characters per token used by [`Self::count_tokens`].
    pub chars_per_token: u32,
}

impl ProviderDescriptor {
    /// Rough token estimate for backends that do not report usage.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> u32 {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        chars.div_ceil(self.chars_per_token.max(1))
    }
}

/// A function declaration shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Function name.
    pub name: String,
    /// What the function does, for the model.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// How the model may use the attached tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    #[default]
    Auto,
    /// Tools are attached but must not be called.
    None,
    /// The model must call at least one tool.
    Required,
}

/// A function call requested by the model. `arguments` is the raw,
/// untrusted JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed in the result.
    pub id: String,
    /// Requested function.
    pub name: String,
    /// Raw argument payload.
    pub arguments: String,
}

/// Generation options accepted by every adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion token ceiling (clamped to the provider's limit).
    pub max_tokens: Option<u32>,
    /// Nucleus sampling.
    pub top_p: Option<f32>,
    /// Model override.
    pub model: Option<String>,
    /// System segment of the prompt.
    pub system_prompt: Option<String>,
    /// Tools exposed to the model.
    pub tools: Vec<ToolDefinition>,
    /// Tool usage policy.
    pub tool_choice: ToolChoice,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end.
    Stop,
    /// Hit the token ceiling.
    Length,
    /// Stopped to call tools.
    ToolCalls,
    /// Filtered by the backend.
    ContentFilter,
    /// Anything else.
    Unknown,
}

/// Normalized completion envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Visible text, with reasoning segments removed.
    pub content: String,
    /// Tokens consumed (reported or estimated).
    pub tokens_used: u32,
    /// Model that produced the completion.
    pub model: String,
    /// Stop reason.
    pub finish_reason: FinishReason,
    /// Tool calls, in the order the model emitted them.
    pub tool_calls: Vec<ToolCall>,
    /// Provider that served the request.
    pub provider: ProviderKind,
}

/// A text-generation backend.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Static facts about this provider.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Generates a completion for `prompt` (the user segment).
    async fn generate_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;
}

/// Removes `<think>…</think>` reasoning blocks some models inline in their
/// visible output. An unterminated block swallows the rest of the text.
#[must_use]
pub fn strip_reasoning(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        match rest[start..].find(CLOSE) {
            Some(end) => rest = &rest[start + end + CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning_removes_blocks() {
        let raw = "<think>the goblin has 7 hp</think>The goblin snarls.";
        assert_eq!(strip_reasoning(raw), "The goblin snarls.");
    }

    #[test]
    fn test_strip_reasoning_drops_unterminated_block() {
        assert_eq!(strip_reasoning("Dawn breaks. <think>hmm"), "Dawn breaks.");
    }

    #[test]
    fn test_provider_kind_parses_aliases() {
        assert_eq!("Ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert!(matches!(
            "claude".parse::<ProviderKind>(),
            Err(LlmError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_count_tokens_rounds_up() {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::Mock,
            default_model: "offline".to_owned(),
            max_tokens: 100,
            chars_per_token: 4,
        };
        assert_eq!(descriptor.count_tokens("abcde"), 2);
        assert_eq!(descriptor.count_tokens(""), 0);
    }
}
