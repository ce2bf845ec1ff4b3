//! Assembles `ACE_TASK.md`: a model-generated body wrapped in the fixed
//! header and trailing protocol sections the spawned CLI is instructed to
//! follow, matching the exact document shape the external harness consumes.

use std::path::Path;

use ace_core::model::TASK_FILE_NAME;
use ace_core::refusal::{contains_refusal_phrase, looks_like_reasoning_dump};

use crate::error::InstructionsError;
use crate::model::InstructionModel;

/// Everything needed to both prompt the instruction model and to fill in
/// the document's fixed protocol sections.
pub struct TaskContext<'a> {
    pub task_id: &'a str,
    pub task_title: &'a str,
    pub task_description: &'a str,
    pub item_title: &'a str,
    pub item_body: &'a str,
    pub branch_name: &'a str,
    pub blocked_assignee: &'a str,
    pub agent_label: &'a str,
    pub repo_conventions: Option<&'a str>,
    pub pr_comment_context: Option<&'a str>,
}

pub struct InstructionBuilder {
    model: Box<dyn InstructionModel>,
}

impl InstructionBuilder {
    pub fn new(model: Box<dyn InstructionModel>) -> Self {
        Self { model }
    }

    /// Build the full `ACE_TASK.md` document for `ctx`, validating the
    /// model's output before wrapping it.
    pub async fn build(&self, ctx: &TaskContext<'_>) -> Result<String, InstructionsError> {
        let prompt = build_prompt(ctx);
        let body = self.model.generate(&prompt).await?;
        validate_instructions(&body)?;
        Ok(render_document(ctx, body.trim()))
    }

    /// Write a previously built document to `<workdir>/ACE_TASK.md`.
    pub fn write(workdir: &Path, document: &str) -> Result<(), InstructionsError> {
        let path = workdir.join(TASK_FILE_NAME);
        std::fs::write(&path, document).map_err(|source| InstructionsError::Io { path, source })
    }
}

fn build_prompt(ctx: &TaskContext<'_>) -> String {
    let mut prompt = format!(
        "You are an instruction agent. Write detailed, step-by-step coding \
         instructions for the task below. Output Markdown only.\n\n\
         Issue Title: {}\nIssue Body:\n{}\n\n\
         Task Title: {}\nTask Description: {}\n\n\
         Include:\n\
         - Key files/areas to inspect\n\
         - Concrete steps\n\
         - Validation/tests to run\n",
        ctx.item_title, ctx.item_body, ctx.task_title, ctx.task_description
    );

    if let Some(conventions) = ctx.repo_conventions {
        prompt.push_str(&format!("\nRepository Conventions:\n{conventions}\n"));
    }
    if let Some(pr_context) = ctx.pr_comment_context {
        prompt.push_str(&format!("\nOpen Review Comments:\n{pr_context}\n"));
    }

    prompt
}

/// §4.6's fail-fast validation: empty, a reasoning-dump shape, or a known
/// refusal phrase each trip a refusal error rather than writing a document.
pub fn validate_instructions(text: &str) -> Result<(), InstructionsError> {
    if text.trim().is_empty() {
        return Err(InstructionsError::Refusal {
            reason: "empty or whitespace-only response".to_string(),
        });
    }
    if looks_like_reasoning_dump(text) {
        return Err(InstructionsError::Refusal {
            reason: "response looks like a raw model event record".to_string(),
        });
    }
    if contains_refusal_phrase(text) {
        return Err(InstructionsError::Refusal {
            reason: "response contains a known refusal phrase".to_string(),
        });
    }
    Ok(())
}

fn render_document(ctx: &TaskContext<'_>, body: &str) -> String {
    let header = format!("# Task {}: {}\n\n", ctx.task_id, ctx.task_title);

    let mcp_block = "\n\n## GitHub MCP Access\n\
        GitHub MCP is configured for this session. Use it for issue \
        comments/metadata as needed.\n";

    let blocked_block = format!(
        "\n\n## Blocked Protocol (No Questions in Session)\n\
         If clarification is needed:\n\
         1. Post a comment with your questions (prefix with BLOCKED).\n\
         2. Assign the issue to {} and remove the '{}' label.\n\
         3. Exit the session.\n",
        ctx.blocked_assignee, ctx.agent_label
    );

    let completion_block = format!(
        "\n\n## Completion Protocol\n\
         When finished:\n\
         1. Commit changes on `{branch}` with a message that includes `{title}`.\n\
         2. Push the branch: `git push origin {branch}`.\n\
         3. Write a JSON file named `ACE_TASK_DONE.json` in the repo root:\n\n\
         ```json\n\
         {{\n\
         \u{20}\u{20}\"task_id\": \"{task_id}\",\n\
         \u{20}\u{20}\"summary\": \"<summary>\",\n\
         \u{20}\u{20}\"files_changed\": [\"...\"],\n\
         \u{20}\u{20}\"commands_run\": [\"...\"]\n\
         }}\n\
         ```\n\
         Do NOT open a pull request; the manager opens it once all tasks are complete.\n",
        branch = ctx.branch_name,
        title = ctx.task_title,
        task_id = ctx.task_id,
    );

    format!("{header}{body}{mcp_block}{blocked_block}{completion_block}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstructionModel;
    use async_trait::async_trait;

    struct StubModel(&'static str);

    #[async_trait]
    impl InstructionModel for StubModel {
        async fn generate(&self, _prompt: &str) -> Result<String, InstructionsError> {
            Ok(self.0.to_string())
        }
    }

    fn ctx() -> TaskContext<'static> {
        TaskContext {
            task_id: "t1",
            task_title: "Add dark mode",
            task_description: "Add a dark mode toggle",
            item_title: "Dark mode",
            item_body: "Users want a dark mode toggle",
            branch_name: "agent/42-dark-mode",
            blocked_assignee: "maintainer",
            agent_label: "agent",
            repo_conventions: None,
            pr_comment_context: None,
        }
    }

    #[tokio::test]
    async fn build_wraps_model_output_with_fixed_sections() {
        let builder = InstructionBuilder::new(Box::new(StubModel("1. Do the thing.")));
        let doc = builder.build(&ctx()).await.unwrap();
        assert!(doc.starts_with("# Task t1: Add dark mode\n\n"));
        assert!(doc.contains("1. Do the thing."));
        assert!(doc.contains("## GitHub MCP Access"));
        assert!(doc.contains("## Blocked Protocol"));
        assert!(doc.contains("## Completion Protocol"));
        assert!(doc.contains("agent/42-dark-mode"));
        assert!(doc.contains("\"task_id\": \"t1\""));
    }

    #[tokio::test]
    async fn build_fails_on_refusal() {
        let builder = InstructionBuilder::new(Box::new(StubModel("I'm sorry, I cannot help with that.")));
        let err = builder.build(&ctx()).await.unwrap_err();
        assert!(matches!(err, InstructionsError::Refusal { .. }));
    }

    #[tokio::test]
    async fn build_fails_on_empty_output() {
        let builder = InstructionBuilder::new(Box::new(StubModel("   ")));
        let err = builder.build(&ctx()).await.unwrap_err();
        assert!(matches!(err, InstructionsError::Refusal { .. }));
    }

    #[tokio::test]
    async fn build_fails_on_reasoning_dump_shape() {
        let builder = InstructionBuilder::new(Box::new(StubModel(
            r#"{"type":"message_start","message":{}}"#,
        )));
        let err = builder.build(&ctx()).await.unwrap_err();
        assert!(matches!(err, InstructionsError::Refusal { .. }));
    }

    #[test]
    fn write_creates_task_file_at_workdir_root() {
        let dir = tempfile::tempdir().unwrap();
        InstructionBuilder::write(dir.path(), "# Task t1: X\n\nbody").unwrap();
        let written = std::fs::read_to_string(dir.path().join(TASK_FILE_NAME)).unwrap();
        assert_eq!(written, "# Task t1: X\n\nbody");
    }
}
