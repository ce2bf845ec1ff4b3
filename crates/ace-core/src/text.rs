//! Small pure-function helpers shared by the Workspace Manager and Session
//! Supervisor: title slugging, session-name sanitizing, and truncation.
//!
//! Kept here (rather than duplicated per crate) because both `ace-workspace`
//! and `ace-session` need identical sanitization rules and §8 requires they
//! agree exactly on boundary behavior (e.g. a punctuation-only title).

use regex::Regex;
use std::sync::OnceLock;

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9_-]+").unwrap())
}

/// Slugify a title for use in a branch name: lowercase, non-alphanumerics
/// collapsed to `-`, trimmed, max 40 chars. An empty result falls back to
/// `"issue"` (§4.3).
pub fn slugify(title: &str, max_len: usize) -> String {
    let lower = title.to_lowercase();
    let collapsed = non_alnum().replace_all(&lower, "-");
    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(max_len).collect();
    let truncated = truncated.trim_matches('-');
    if truncated.is_empty() {
        "issue".to_string()
    } else {
        truncated.to_string()
    }
}

/// Sanitize an arbitrary string into a tmux-safe session name: runs of
/// characters outside `[A-Za-z0-9_-]` collapse to a single `-`, leading and
/// trailing `-` are trimmed, and the result is truncated to `max_len` chars
/// (§6: session names are capped at 60 chars).
pub fn sanitize_session_name(raw: &str, max_len: usize) -> String {
    let collapsed = non_alnum().replace_all(raw, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.chars().count() > max_len {
        trimmed.chars().take(max_len).collect()
    } else {
        trimmed.to_string()
    }
}

/// Deterministic session name for an item: `ace-<repoSlug>-<number>`,
/// sanitized and capped at 60 chars (§4.4, §6).
pub fn session_name(repo_name: &str, number: u64) -> String {
    let raw = format!("ace-{repo_name}-{number}");
    sanitize_session_name(&raw, 60)
}

/// Reverse-parse a session name produced by [`session_name`] back into
/// `(repoSlug, number)`. Returns `None` if the name does not have the
/// `ace-<repo>-<N>` shape (missing prefix, fewer than two dash-separated
/// parts after it, or a non-numeric trailing part).
pub fn parse_session_name(session_name: &str) -> Option<(String, u64)> {
    let rest = session_name.strip_prefix("ace-")?;
    let (repo, number) = rest.rsplit_once('-')?;
    if repo.is_empty() {
        return None;
    }
    let number: u64 = number.parse().ok()?;
    Some((repo.to_string(), number))
}

/// UTF-8-safe truncation to at most `max_chars` characters, appending an
/// ellipsis marker when truncation occurred.
pub fn truncate_snippet(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic_title() {
        assert_eq!(slugify("Add Dark Mode", 40), "add-dark-mode");
    }

    #[test]
    fn slugify_punctuation_only_falls_back_to_issue() {
        assert_eq!(slugify("!!!???...", 40), "issue");
        assert_eq!(slugify("", 40), "issue");
    }

    #[test]
    fn slugify_truncates_to_max_len() {
        let long = "a".repeat(100);
        assert_eq!(slugify(&long, 40).len(), 40);
    }

    #[test]
    fn session_name_matches_scenario_one() {
        assert_eq!(session_name("repo", 42), "ace-repo-42");
    }

    #[test]
    fn session_name_truncates_exactly_to_60() {
        let repo = "a".repeat(100);
        let name = session_name(&repo, 7);
        assert_eq!(name.chars().count(), 60);
        assert!(name.starts_with("ace-"));
    }

    #[test]
    fn sanitize_collapses_runs_and_trims() {
        assert_eq!(sanitize_session_name("foo///bar***", 60), "foo-bar");
        assert_eq!(sanitize_session_name("--leading-trailing--", 60), "leading-trailing");
    }

    #[test]
    fn parse_session_name_roundtrips_session_name() {
        let name = session_name("widgets", 42);
        assert_eq!(parse_session_name(&name), Some(("widgets".to_string(), 42)));
    }

    #[test]
    fn parse_session_name_rejects_missing_prefix() {
        assert_eq!(parse_session_name("widgets-42"), None);
    }

    #[test]
    fn parse_session_name_rejects_non_numeric_tail() {
        assert_eq!(parse_session_name("ace-widgets-abc"), None);
    }

    #[test]
    fn truncate_snippet_preserves_short_strings() {
        assert_eq!(truncate_snippet("hello", 10), "hello");
    }

    #[test]
    fn truncate_snippet_truncates_long_strings() {
        let long = "x".repeat(50);
        let out = truncate_snippet(&long, 10);
        assert_eq!(out, format!("{}...", "x".repeat(10)));
    }
}
