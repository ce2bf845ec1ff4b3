//! Issue-comment and label operations against the source-control REST API
//! (§4.9's `claim_issue` step, §7's user-visible status comments).
//!
//! These sit beside the Projects v2 GraphQL surface in [`crate::board`]
//! rather than inside it: posting/updating a comment and adding/removing a
//! label are plain REST calls, not part of the Projects v2 schema, mirroring
//! `original_source/src/ace/github/issue_queue.py`'s `IssueQueue` (a
//! REST-only class that is handed a separate `ProjectsV2Client` rather than
//! absorbing its GraphQL calls).

use ace_core::model::PrCommentExtras;
use serde_json::{json, Value};

use crate::board::BoardError;
use crate::client::RemoteClient;

/// One open inline review comment on a pull request, as classified by the
/// Work-Queue Builder's PR-comment-follow-up source (§4.7).
#[derive(Debug, Clone)]
pub struct PrReviewComment {
    pub comment_id: u64,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_labels: Vec<String>,
    pub pr_html_url: String,
    pub extras: PrCommentExtras,
}

pub struct IssueTracker<'a> {
    client: &'a RemoteClient,
}

impl<'a> IssueTracker<'a> {
    pub fn new(client: &'a RemoteClient) -> Self {
        IssueTracker { client }
    }

    /// Post a new comment on an issue or pull request. Returns the comment
    /// id so a caller (e.g. the Item Workflow's failure/completion path) can
    /// later edit it in place via [`Self::update_comment`].
    pub async fn post_comment(
        &self,
        repo_owner: &str,
        repo_name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64, BoardError> {
        let path = format!("/repos/{repo_owner}/{repo_name}/issues/{number}/comments");
        let response = self.client.post(&path, json!({ "body": body })).await?;
        if !response.is_success() {
            return Err(BoardError::UnexpectedShape(format!(
                "comment post failed with status {}",
                response.status
            )));
        }
        comment_id(&response.json()?)
    }

    /// Edit a previously posted comment in place, used to update a claim
    /// comment with a final result rather than posting a second comment.
    pub async fn update_comment(
        &self,
        repo_owner: &str,
        repo_name: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<(), BoardError> {
        let path = format!("/repos/{repo_owner}/{repo_name}/issues/comments/{comment_id}");
        let response = self.client.patch(&path, json!({ "body": body })).await?;
        if !response.is_success() {
            return Err(BoardError::UnexpectedShape(format!(
                "comment update failed with status {}",
                response.status
            )));
        }
        Ok(())
    }

    /// Add labels to an issue, used by `claim_issue` to apply an
    /// in-progress label alongside the claim comment.
    pub async fn add_labels(
        &self,
        repo_owner: &str,
        repo_name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), BoardError> {
        let path = format!("/repos/{repo_owner}/{repo_name}/issues/{number}/labels");
        let response = self.client.post(&path, json!({ "labels": labels })).await?;
        if !response.is_success() {
            return Err(BoardError::UnexpectedShape(format!(
                "add labels failed with status {}",
                response.status
            )));
        }
        Ok(())
    }

    /// List open, unresolved inline review comments across a repository's
    /// open pull requests — the Work-Queue Builder's PR-comment-follow-up
    /// source (§4.7 point 1). Unlike the other methods on this type this has
    /// no `issue_queue.py` counterpart; it is built as a direct extension of
    /// the same REST idiom rather than translated from a specific function.
    pub async fn list_pr_review_comments(
        &self,
        repo_owner: &str,
        repo_name: &str,
    ) -> Result<Vec<PrReviewComment>, BoardError> {
        let prs_path = format!("/repos/{repo_owner}/{repo_name}/pulls?state=open&per_page=100");
        let prs_response = self.client.get(&prs_path).await?;
        if !prs_response.is_success() {
            return Err(BoardError::UnexpectedShape(format!(
                "list pulls failed with status {}",
                prs_response.status
            )));
        }
        let prs = prs_response.json()?;
        let prs = prs
            .as_array()
            .ok_or_else(|| BoardError::UnexpectedShape("pulls response not an array".to_string()))?;

        let mut comments = Vec::new();
        for pr in prs {
            let pr_number = pr
                .get("number")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| BoardError::UnexpectedShape("pull missing number".to_string()))?;
            let pr_title = pr
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let pr_html_url = pr
                .get("html_url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let pr_labels = pr
                .get("labels")
                .and_then(|v| v.as_array())
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|l| l.get("name").and_then(|n| n.as_str()))
                        .map(|s| s.to_string())
                        .collect()
                })
                .unwrap_or_default();

            let comments_path = format!(
                "/repos/{repo_owner}/{repo_name}/pulls/{pr_number}/comments?per_page=100"
            );
            let comments_response = self.client.get(&comments_path).await?;
            if !comments_response.is_success() {
                return Err(BoardError::UnexpectedShape(format!(
                    "list review comments failed with status {}",
                    comments_response.status
                )));
            }
            let raw_comments = comments_response.json()?;
            let raw_comments = raw_comments.as_array().ok_or_else(|| {
                BoardError::UnexpectedShape("review comments response not an array".to_string())
            })?;

            for raw in raw_comments {
                if raw.get("in_reply_to_id").and_then(|v| v.as_u64()).is_some() {
                    continue;
                }
                let extras = review_comment_extras(raw)?;
                comments.push(PrReviewComment {
                    comment_id: extras.comment_id,
                    pr_number,
                    pr_title: pr_title.clone(),
                    pr_labels: pr_labels.clone(),
                    pr_html_url: pr_html_url.clone(),
                    extras,
                });
            }
        }
        Ok(comments)
    }

    /// Fetch a pull request's head commit SHA, needed to read the file a
    /// review comment points at as it stood when the comment was made
    /// (§4.9 `run_agent` step 3).
    pub async fn pr_head_sha(
        &self,
        repo_owner: &str,
        repo_name: &str,
        pr_number: u64,
    ) -> Result<String, BoardError> {
        let path = format!("/repos/{repo_owner}/{repo_name}/pulls/{pr_number}");
        let response = self.client.get(&path).await?;
        if !response.is_success() {
            return Err(BoardError::UnexpectedShape(format!(
                "get pull failed with status {}",
                response.status
            )));
        }
        let body = response.json()?;
        body.get("head")
            .and_then(|h| h.get("sha"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| BoardError::UnexpectedShape("pull response missing head.sha".to_string()))
    }

    /// Fetch a file's raw text content at a given ref, used to build the
    /// ±`contextLines`-line numbered snippet around a review comment's line
    /// (§4.9 `run_agent` step 3).
    pub async fn file_at_ref(
        &self,
        repo_owner: &str,
        repo_name: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<String, BoardError> {
        let encoded_path = path
            .split('/')
            .map(urlencode_path_segment)
            .collect::<Vec<_>>()
            .join("/");
        let request_path = format!(
            "/repos/{repo_owner}/{repo_name}/contents/{encoded_path}?ref={git_ref}"
        );
        let response = self.client.get(&request_path).await?;
        if !response.is_success() {
            return Err(BoardError::UnexpectedShape(format!(
                "get file contents failed with status {}",
                response.status
            )));
        }
        let body = response.json()?;
        let encoded = body
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BoardError::UnexpectedShape("file response missing content".to_string()))?;
        decode_base64_content(encoded)
    }
}

/// GitHub's contents API percent-encodes path segments but leaves `/` alone
/// between them; no URL-encoding crate is in this crate's dependency stack,
/// so the handful of characters that matter for file paths are escaped
/// manually rather than pulling one in for a single call site.
fn urlencode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn decode_base64_content(encoded: &str) -> Result<String, BoardError> {
    let stripped: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64_decode(&stripped)
        .map_err(|e| BoardError::UnexpectedShape(format!("invalid base64 file content: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| BoardError::UnexpectedShape(format!("file content not valid utf-8: {e}")))
}

/// Minimal standard-alphabet base64 decoder. The contents API is the only
/// caller of this; reaching for a dedicated crate for one decode site would
/// add a dependency the rest of the stack has no other use for.
fn base64_decode(input: &str) -> Result<Vec<u8>, String> {
    fn value(byte: u8) -> Result<u8, String> {
        match byte {
            b'A'..=b'Z' => Ok(byte - b'A'),
            b'a'..=b'z' => Ok(byte - b'a' + 26),
            b'0'..=b'9' => Ok(byte - b'0' + 52),
            b'+' => Ok(62),
            b'/' => Ok(63),
            other => Err(format!("invalid base64 byte: {other}")),
        }
    }

    if input.len() % 4 != 0 {
        return Err("base64 input length not a multiple of 4".to_string());
    }
    let trimmed = input.trim_end_matches('=');
    let chars: Vec<u8> = trimmed.bytes().collect();
    let mut out = Vec::with_capacity(chars.len() * 3 / 4 + 3);

    for chunk in chars.chunks(4) {
        let mut buf = [0u8; 4];
        for (i, &c) in chunk.iter().enumerate() {
            buf[i] = value(c)?;
        }
        let n = chunk.len();
        let combined = (buf[0] as u32) << 18
            | (buf[1] as u32) << 12
            | (buf[2] as u32) << 6
            | (buf[3] as u32);
        out.push((combined >> 16) as u8);
        if n > 2 {
            out.push((combined >> 8) as u8);
        }
        if n > 3 {
            out.push(combined as u8);
        }
    }

    Ok(out)
}

fn review_comment_extras(raw: &Value) -> Result<PrCommentExtras, BoardError> {
    let comment_id = raw
        .get("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| BoardError::UnexpectedShape("review comment missing id".to_string()))?;
    let path = raw
        .get("path")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let line = raw
        .get("line")
        .and_then(|v| v.as_u64())
        .or_else(|| raw.get("original_line").and_then(|v| v.as_u64()))
        .unwrap_or(0) as u32;
    let side = raw
        .get("side")
        .and_then(|v| v.as_str())
        .unwrap_or("RIGHT")
        .to_string();
    let body = raw
        .get("body")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(PrCommentExtras {
        comment_id,
        path,
        line,
        side,
        body,
    })
}

fn comment_id(body: &Value) -> Result<u64, BoardError> {
    body.get("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| BoardError::UnexpectedShape("comment response missing id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_id_extracts_numeric_id() {
        let body = json!({"id": 12345, "body": "hi"});
        assert_eq!(comment_id(&body).unwrap(), 12345);
    }

    #[test]
    fn comment_id_errors_on_missing_id() {
        let body = json!({"body": "hi"});
        assert!(comment_id(&body).is_err());
    }

    #[test]
    fn base64_decode_round_trips_ascii() {
        // "hello world" base64-encoded, including a GitHub-style trailing newline.
        let decoded = decode_base64_content("aGVsbG8gd29ybGQ=\n").unwrap();
        assert_eq!(decoded, "hello world");
    }

    #[test]
    fn base64_decode_rejects_invalid_characters() {
        assert!(base64_decode("a!c=").is_err());
    }

    #[test]
    fn urlencode_path_segment_escapes_spaces_and_percent() {
        assert_eq!(urlencode_path_segment("a b%c"), "a%20b%25c");
        assert_eq!(urlencode_path_segment("main.rs"), "main.rs");
    }

    #[test]
    fn review_comment_extras_prefers_line_over_original_line() {
        let raw = json!({"id": 1, "path": "a.rs", "line": 10, "original_line": 5, "side": "RIGHT", "body": "fix this"});
        let extras = review_comment_extras(&raw).unwrap();
        assert_eq!(extras.line, 10);
        assert_eq!(extras.side, "RIGHT");
    }

    #[test]
    fn review_comment_extras_falls_back_to_original_line() {
        let raw = json!({"id": 1, "path": "a.rs", "original_line": 5, "side": "LEFT", "body": "old"});
        let extras = review_comment_extras(&raw).unwrap();
        assert_eq!(extras.line, 5);
    }
}
