//! Google Gemini `generateContent` client.
//!
//! Gemini answers with a list of parts per candidate. Parts flagged
//! `thought: true` are internal reasoning and never reach the caller; text
//! parts are concatenated and `functionCall` parts become tool calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{
    Completion, CompletionOptions, FinishReason, ProviderAdapter, ProviderDescriptor, ProviderKind,
    ToolCall, ToolChoice, strip_reasoning,
};

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Client for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    descriptor: ProviderDescriptor,
}

impl GeminiProvider {
    /// Creates a client.
    pub fn new(base_url: &str, api_key: String, model: &str, max_tokens: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            descriptor: ProviderDescriptor {
                kind: ProviderKind::Gemini,
                default_model: model.to_string(),
                max_tokens,
                chars_per_token: 4,
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.descriptor.default_model.clone());
        let body = build_request(prompt, options);

        let response = self
            .client
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                provider: ProviderKind::Gemini,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider {
                provider: ProviderKind::Gemini,
                message: format!("{status}: {error_text}"),
            });
        }

        let api_response: GenerateResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: ProviderKind::Gemini,
                message: e.to_string(),
            })?;

        convert_response(&self.descriptor, &model, prompt, api_response)
    }
}

fn build_request(prompt: &str, options: &CompletionOptions) -> GenerateRequest {
    let (tools, tool_config) = if options.tools.is_empty() {
        (None, None)
    } else {
        let declarations = options
            .tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();
        let mode = match options.tool_choice {
            ToolChoice::Auto => "AUTO",
            ToolChoice::None => "NONE",
            ToolChoice::Required => "ANY",
        };
        (
            Some(vec![ApiTools {
                function_declarations: declarations,
            }]),
            Some(ToolConfig {
                function_calling_config: FunctionCallingConfig {
                    mode: mode.to_string(),
                },
            }),
        )
    };

    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(prompt)],
        }],
        system_instruction: options.system_prompt.as_ref().map(|s| Content {
            role: None,
            parts: vec![Part::text(s)],
        }),
        generation_config: GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
            top_p: options.top_p,
        },
        tools,
        tool_config,
    }
}

fn convert_response(
    descriptor: &ProviderDescriptor,
    model: &str,
    prompt: &str,
    response: GenerateResponse,
) -> Result<Completion, LlmError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: ProviderKind::Gemini,
            message: "no candidates in response".to_string(),
        })?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for (index, part) in candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        if part.thought.unwrap_or(false) {
            continue;
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCall {
                id: format!("gemini-call-{index}"),
                name: call.name,
                arguments: call.args.map_or_else(|| "{}".to_string(), |a| a.to_string()),
            });
        }
        if let Some(segment) = part.text {
            text.push_str(&segment);
        }
    }
    let content = strip_reasoning(&text);

    let finish_reason = match candidate.finish_reason.as_deref() {
        _ if !tool_calls.is_empty() => FinishReason::ToolCalls,
        Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    };

    let tokens_used = response
        .usage_metadata
        .and_then(|u| u.total_token_count)
        .unwrap_or_else(|| descriptor.count_tokens(prompt) + descriptor.count_tokens(&content));

    Ok(Completion {
        content,
        tokens_used,
        model: model.to_string(),
        finish_reason,
        tool_calls,
        provider: ProviderKind::Gemini,
    })
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTools>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct FunctionCallingConfig {
    mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor {
            kind: ProviderKind::Gemini,
            default_model: "gemini-test".to_owned(),
            max_tokens: 2048,
            chars_per_token: 4,
        }
    }

    #[test]
    fn test_thought_parts_are_excluded_from_content() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Let me work out the damage...", "thought": true},
                    {"text": "The arrow strikes true. "},
                    {"text": "The wolf yelps."}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 42}
        });
        let response: GenerateResponse = serde_json::from_value(raw).unwrap();

        let completion = convert_response(&descriptor(), "gemini-test", "p", response).unwrap();

        assert_eq!(completion.content, "The arrow strikes true. The wolf yelps.");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.tokens_used, 42);
    }

    #[test]
    fn test_function_call_parts_become_tool_calls() {
        let raw = serde_json::json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "update_hp", "args": {"amount": -4}}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let response: GenerateResponse = serde_json::from_value(raw).unwrap();

        let completion = convert_response(&descriptor(), "gemini-test", "p", response).unwrap();

        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "update_hp");
        let args: serde_json::Value =
            serde_json::from_str(&completion.tool_calls[0].arguments).unwrap();
        assert_eq!(args["amount"], -4);
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn test_build_request_maps_required_choice_to_any() {
        let options = CompletionOptions {
            tools: vec![crate::provider::ToolDefinition {
                name: "roll_dice".to_owned(),
                description: "Roll".to_owned(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            tool_choice: ToolChoice::Required,
            max_tokens: Some(300),
            ..CompletionOptions::default()
        };

        let json = serde_json::to_value(build_request("go", &options)).unwrap();

        assert_eq!(json["toolConfig"]["functionCallingConfig"]["mode"], "ANY");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 300);
        assert!(json.get("systemInstruction").is_none());
    }
}
