//! Thin HTTP clients over the two instruction-model backends the pool can
//! route to, picked by `select_backend`'s `(backend, model)` pair.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::InstructionsError;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(180);
const MAX_OUTPUT_TOKENS: u32 = 1200;

/// A backend capable of turning a prompt into instruction text.
#[async_trait]
pub trait InstructionModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, InstructionsError>;
}

const CLAUDE_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

/// Anthropic `/v1/messages` backend ("claude").
pub struct ClaudeInstructionModel {
    client: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl ClaudeInstructionModel {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new_with_endpoint(model, api_key, CLAUDE_MESSAGES_URL)
    }

    /// Same as [`Self::new`] but against a caller-supplied endpoint, for
    /// organizations fronting the provider API with their own gateway (and
    /// for tests, which point this at a local mock server).
    pub fn new_with_endpoint(
        model: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            model: model.into(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl InstructionModel for ClaudeInstructionModel {
    async fn generate(&self, prompt: &str) -> Result<String, InstructionsError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        Ok(data["content"][0]["text"].as_str().unwrap_or("").to_string())
    }
}

/// OpenAI `/v1/responses` backend ("codex").
pub struct OpenAiInstructionModel {
    client: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl OpenAiInstructionModel {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new_with_endpoint(model, api_key, OPENAI_RESPONSES_URL)
    }

    pub fn new_with_endpoint(
        model: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            model: model.into(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl InstructionModel for OpenAiInstructionModel {
    async fn generate(&self, prompt: &str) -> Result<String, InstructionsError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": prompt,
            "max_output_tokens": MAX_OUTPUT_TOKENS,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        Ok(extract_openai_text(&data))
    }
}

/// OpenAI's responses payload has a few documented shapes; fall back to the
/// chat-completions `choices` shape before giving up.
fn extract_openai_text(data: &Value) -> String {
    if let Some(output) = data.get("output").and_then(Value::as_array) {
        if let Some(item) = output.first() {
            if let Some(content) = item.get("content").and_then(Value::as_array) {
                if let Some(text) = content.first().and_then(|c| c.get("text")).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
            if let Some(text) = item.get("text").and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }

    if let Some(text) = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return text.to_string();
    }

    tracing::warn!("unrecognized instruction-model response shape");
    String::new()
}

/// Pick a backend by the name `select_backend` returns ("claude" or
/// "codex"); unknown names are rejected rather than silently defaulted.
pub fn build_instruction_model(
    backend: &str,
    model: &str,
    api_key: &str,
) -> Result<Box<dyn InstructionModel>, InstructionsError> {
    match backend.to_ascii_lowercase().as_str() {
        "claude" => Ok(Box::new(ClaudeInstructionModel::new(model, api_key))),
        "codex" => Ok(Box::new(OpenAiInstructionModel::new(model, api_key))),
        other => Err(InstructionsError::UnknownBackend {
            backend: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_openai_text_handles_output_array_shape() {
        let data = serde_json::json!({
            "output": [{"content": [{"text": "do the thing"}]}],
        });
        assert_eq!(extract_openai_text(&data), "do the thing");
    }

    #[test]
    fn extract_openai_text_handles_choices_shape() {
        let data = serde_json::json!({
            "choices": [{"message": {"content": "do the thing"}}],
        });
        assert_eq!(extract_openai_text(&data), "do the thing");
    }

    #[test]
    fn extract_openai_text_falls_back_to_empty_on_unknown_shape() {
        let data = serde_json::json!({"unexpected": true});
        assert_eq!(extract_openai_text(&data), "");
    }

    #[test]
    fn build_instruction_model_rejects_unknown_backend() {
        let err = build_instruction_model("gpt-whatever", "m", "k").unwrap_err();
        assert!(matches!(err, InstructionsError::UnknownBackend { .. }));
    }
}
