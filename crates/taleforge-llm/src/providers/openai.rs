//! OpenAI-compatible chat completions client.
//!
//! Serves both the hosted OpenAI API and local OpenAI-compatible servers
//! (llama.cpp, Ollama, vLLM); only the base URL, key and kind differ.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{
    Completion, CompletionOptions, FinishReason, ProviderAdapter, ProviderDescriptor, ProviderKind,
    ToolCall, ToolChoice, strip_reasoning,
};

/// Default OpenAI base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default hosted model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Client for the chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    descriptor: ProviderDescriptor,
}

impl OpenAiCompatibleProvider {
    /// Creates a client. The HTTP timeout is a transport backstop; the
    /// request queue enforces the real per-job timeout.
    pub fn new(
        kind: ProviderKind,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        max_tokens: u32,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            descriptor: ProviderDescriptor {
                kind,
                default_model: model.to_string(),
                max_tokens,
                chars_per_token: 4,
            },
        }
    }

    fn kind(&self) -> ProviderKind {
        self.descriptor.kind
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let api_request = build_request(&self.descriptor, prompt, options);

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&api_request);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| LlmError::Provider {
            provider: self.kind(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                provider: self.kind(),
                message: format!("{status}: {error_text}"),
            });
        }

        let api_response: ChatResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: self.kind(),
                message: e.to_string(),
            })?;

        convert_response(&self.descriptor, prompt, api_response)
    }
}

fn build_request(
    descriptor: &ProviderDescriptor,
    prompt: &str,
    options: &CompletionOptions,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &options.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(system.clone()),
            ..ChatMessage::default()
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: Some(prompt.to_string()),
        ..ChatMessage::default()
    });

    let (tools, tool_choice) = if options.tools.is_empty() {
        (None, None)
    } else {
        let tools = options
            .tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function".to_string(),
                function: ApiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect();
        let choice = match options.tool_choice {
            ToolChoice::Auto => "auto",
            ToolChoice::None => "none",
            ToolChoice::Required => "required",
        };
        (Some(tools), Some(choice.to_string()))
    };

    ChatRequest {
        model: options
            .model
            .clone()
            .unwrap_or_else(|| descriptor.default_model.clone()),
        messages,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        tools,
        tool_choice,
    }
}

fn convert_response(
    descriptor: &ProviderDescriptor,
    prompt: &str,
    response: ChatResponse,
) -> Result<Completion, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: descriptor.kind,
            message: "no choices in response".to_string(),
        })?;

    // `reasoning_content` (DeepSeek, some local servers) is never surfaced.
    let content = strip_reasoning(&choice.message.content.unwrap_or_default());

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments: tc.function.arguments,
        })
        .collect();

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("tool_calls" | "function_call") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        None if !tool_calls.is_empty() => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    };

    let tokens_used = response.usage.map_or_else(
        || descriptor.count_tokens(prompt) + descriptor.count_tokens(&content),
        |u| u.total_tokens,
    );

    Ok(Completion {
        content,
        tokens_used,
        model: response
            .model
            .unwrap_or_else(|| descriptor.default_model.clone()),
        finish_reason,
        tool_calls,
        provider: descriptor.kind,
    })
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing)]
    reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolDefinition;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::OpenAi,
            default_model: "gpt-test".to_owned(),
            max_tokens: 1024,
            chars_per_token: 4,
        }
    }

    #[test]
    fn test_build_request_attaches_tools_with_choice() {
        let options = CompletionOptions {
            system_prompt: Some("You are the narrator.".to_owned()),
            tools: vec![ToolDefinition {
                name: "roll_dice".to_owned(),
                description: "Roll dice".to_owned(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ..CompletionOptions::default()
        };

        let request = build_request(&descriptor(), "I open the door", &options);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-test");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "I open the door");
        assert_eq!(json["tools"][0]["function"]["name"], "roll_dice");
        assert_eq!(json["tool_choice"], "auto");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_convert_response_keeps_raw_arguments_and_hides_reasoning() {
        let raw = serde_json::json!({
            "model": "gpt-test-2",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "<think>plan</think>You find a torch.",
                    "reasoning_content": "secret chain of thought",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "add_item", "arguments": "{\"item_name\": \"Torch\""}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let response: ChatResponse = serde_json::from_value(raw).unwrap();

        let completion = convert_response(&descriptor(), "prompt", response).unwrap();

        assert_eq!(completion.content, "You find a torch.");
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].arguments, "{\"item_name\": \"Torch\"");
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert_eq!(completion.tokens_used, 15);
        assert_eq!(completion.model, "gpt-test-2");
    }

    #[test]
    fn test_convert_response_without_choices_is_invalid() {
        let response: ChatResponse =
            serde_json::from_value(serde_json::json!({"choices": [], "usage": null})).unwrap();

        let result = convert_response(&descriptor(), "prompt", response);

        assert!(matches!(result, Err(LlmError::InvalidResponse { .. })));
    }
}
