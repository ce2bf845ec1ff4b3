//! Generates the directive document (`ACE_TASK.md`) an item's agent session
//! reads, by prompting an instruction model and validating its output
//! before wrapping it in the fixed protocol sections the spawned CLI relies on.

mod builder;
mod error;
mod model;

pub use builder::{validate_instructions, InstructionBuilder, TaskContext};
pub use error::InstructionsError;
pub use model::{
    build_instruction_model, ClaudeInstructionModel, InstructionModel, OpenAiInstructionModel,
};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn claude_model_extracts_text_from_messages_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "step one, step two"}]
            })))
            .mount(&server)
            .await;

        let client = ClaudeInstructionModel::new_with_endpoint(
            "claude-test",
            "test-key",
            format!("{}/v1/messages", server.uri()),
        );
        let text = client.generate("do the thing").await.unwrap();
        assert_eq!(text, "step one, step two");
    }

    #[tokio::test]
    async fn openai_model_extracts_text_from_responses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": [{"content": [{"text": "step one, step two"}]}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiInstructionModel::new_with_endpoint(
            "gpt-test",
            "test-key",
            format!("{}/v1/responses", server.uri()),
        );
        let text = client.generate("do the thing").await.unwrap();
        assert_eq!(text, "step one, step two");
    }
}
