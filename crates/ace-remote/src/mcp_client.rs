//! Thin client for the auxiliary protocol server's `list_ready_remote_items`
//! tool (§4.7 point 3: "preferred data source is the auxiliary protocol
//! server if enabled; fallback is direct board query").
//!
//! Grounded line-for-line on `original_source/src/ace/runners/agent_pool.py`'s
//! `_fetch_ready_issues_via_mcp`/`_extract_mcp_items`: a single `tools/call`
//! JSON-RPC request over the MCP Streamable HTTP transport, normalizing
//! either a `structuredContent.result` array or a `content[].text` JSON
//! array of item dicts. No MCP SDK sits in the dependency stack, so this is
//! one request/response shape rather than a full client, matching
//! `ace-instructions::model`'s thin-`reqwest`-client-per-backend idiom over
//! pulling in a protocol crate for a single tool call.

use std::time::Duration;

use serde_json::Value;

use crate::client::RemoteError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppforgeMcpClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AppforgeMcpClient {
    /// `url` is normalized to end in `/mcp`, mirroring
    /// `ace_session::mcp::normalize_mcp_url`'s asymmetric trailing-slash
    /// handling (duplicated locally rather than taking a dependency on
    /// `ace-session` for one helper, per `ace-workspace::redact`'s
    /// single-call-site precedent).
    pub fn new(url: &str) -> Self {
        let trimmed = url.trim_end_matches('/');
        let endpoint = if trimmed.ends_with("/mcp") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/mcp")
        };
        AppforgeMcpClient {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            endpoint,
        }
    }

    /// Call `list_ready_remote_items` and return the raw item dicts it
    /// reports (already filtered server-side by status/label/blockers per
    /// §4.7). An empty `Vec` signals "no items" or "call failed"; callers
    /// fall back to the direct board query in either case, matching the
    /// Python source's `if mcp_issues: issues = mcp_issues else: issues = []`
    /// followed by a fallback query when `issues` is still empty.
    pub async fn list_ready_remote_items(
        &self,
        project_name: &str,
        status: &str,
        remote_label: &str,
    ) -> Result<Vec<Value>, RemoteError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {
                "name": "list_ready_remote_items",
                "arguments": {
                    "project_name": project_name,
                    "status": status,
                    "remote_label": remote_label,
                }
            }
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json, text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(extract_mcp_items(body.pointer("/result").unwrap_or(&Value::Null)))
    }
}

/// Normalize an MCP tool response into a list of item dicts. Mirrors
/// `_extract_mcp_items`: prefer `structuredContent.result`, else parse
/// `content[].text` (or a bare `content` string) as a JSON array.
fn extract_mcp_items(result: &Value) -> Vec<Value> {
    if let Some(items) = result
        .get("structuredContent")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
    {
        return items.clone();
    }

    match result.get("content") {
        Some(Value::Array(parts)) => {
            for part in parts {
                if part.get("type").and_then(|v| v.as_str()) == Some("text") {
                    if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
                            return items;
                        }
                    }
                }
            }
            Vec::new()
        }
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_structured_content() {
        let result = serde_json::json!({
            "structuredContent": { "result": [{"number": 1}, {"number": 2}] }
        });
        assert_eq!(extract_mcp_items(&result).len(), 2);
    }

    #[test]
    fn extracts_from_content_text_json() {
        let result = serde_json::json!({
            "content": [{"type": "text", "text": "[{\"number\": 7}]"}]
        });
        let items = extract_mcp_items(&result);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["number"], 7);
    }

    #[test]
    fn missing_result_yields_empty() {
        assert!(extract_mcp_items(&Value::Null).is_empty());
    }

    #[test]
    fn new_normalizes_trailing_mcp_path() {
        let client = AppforgeMcpClient::new("https://example.invalid/appforge");
        assert_eq!(client.endpoint, "https://example.invalid/appforge/mcp");
        let client = AppforgeMcpClient::new("https://example.invalid/appforge/mcp/");
        assert_eq!(client.endpoint, "https://example.invalid/appforge/mcp");
    }
}
