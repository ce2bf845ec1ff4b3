//! Writes the config a spawned CLI reads on startup to discover the
//! project's MCP servers. Two supported backends (§4.5): a per-workspace
//! JSON file merged in place, and a per-user TOML file whose
//! `[mcp_servers.<name>]` block is surgically replaced or appended via
//! `toml_edit`, mirroring `mcp_config.py`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::SessionError;

/// One MCP server entry to write into a backend's config.
#[derive(Debug, Clone)]
pub struct McpServer {
    pub name: String,
    pub url: String,
    /// Bearer token value, written directly into the Backend A `headers`
    /// block. Backend B never receives the raw token — only the name of the
    /// environment variable the spawned process should read it from.
    pub token: Option<String>,
    pub token_env_var: Option<String>,
}

impl McpServer {
    pub fn normalized_url(&self) -> String {
        normalize_mcp_url(&self.url)
    }
}

/// Merge `server` into `<workdir>/<config_filename>`'s `mcpServers` map,
/// preserving any other entries already present, then add `config_filename`
/// to the checkout's local git exclude list so it is never committed.
pub fn configure_claude(
    workdir: &Path,
    config_filename: &str,
    server: &McpServer,
) -> Result<(), SessionError> {
    let token = server
        .token
        .as_deref()
        .ok_or(SessionError::MissingToken)?;

    let mut headers = Map::new();
    headers.insert(
        "Authorization".to_string(),
        Value::String(format!("Bearer {token}")),
    );
    let payload = Value::Object(Map::from_iter([
        ("type".to_string(), Value::String("http".to_string())),
        ("url".to_string(), Value::String(server.normalized_url())),
        ("headers".to_string(), Value::Object(headers)),
    ]));

    let config_path = workdir.join(config_filename);
    write_mcp_config(&config_path, &server.name, payload)?;
    ensure_git_exclude(workdir, config_filename)?;
    Ok(())
}

fn write_mcp_config(config_path: &Path, server_name: &str, payload: Value) -> Result<(), SessionError> {
    let mut doc = if config_path.exists() {
        let existing = std::fs::read_to_string(config_path).map_err(|source| SessionError::Io {
            path: config_path.to_path_buf(),
            source,
        })?;
        match serde_json::from_str::<Value>(&existing) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %config_path.display(), "existing mcp config is not a JSON object, overwriting");
                Map::new()
            }
        }
    } else {
        Map::new()
    };

    let servers = doc
        .entry("mcpServers".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(servers) = servers {
        servers.insert(server_name.to_string(), payload);
    } else {
        *servers = Value::Object(Map::from_iter([(server_name.to_string(), payload)]));
    }

    let rendered = serde_json::to_string_pretty(&Value::Object(doc)).unwrap_or_default();
    std::fs::write(config_path, rendered).map_err(|source| SessionError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %config_path.display(), server = server_name, "wrote plugin-protocol config");
    Ok(())
}

fn ensure_git_exclude(workdir: &Path, filename: &str) -> Result<(), SessionError> {
    let exclude_path = workdir.join(".git").join("info").join("exclude");
    if !exclude_path.exists() {
        return Ok(());
    }

    let content = std::fs::read_to_string(&exclude_path).map_err(|source| SessionError::Io {
        path: exclude_path.clone(),
        source,
    })?;
    if content.contains(filename) {
        return Ok(());
    }

    let updated = format!("{content}\n{filename}\n");
    std::fs::write(&exclude_path, updated).map_err(|source| SessionError::Io {
        path: exclude_path,
        source,
    })
}

/// Write or replace `[mcp_servers.<name>]` in a per-user TOML config,
/// preserving every other block verbatim.
pub fn configure_codex(config_path: &Path, server: &McpServer) -> Result<(), SessionError> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SessionError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = if config_path.exists() {
        std::fs::read_to_string(config_path).map_err(|source| SessionError::Io {
            path: config_path.to_path_buf(),
            source,
        })?
    } else {
        String::new()
    };

    let mut doc: toml_edit::DocumentMut = content
        .parse()
        .map_err(|e: toml_edit::TomlError| SessionError::TomlParse(e.to_string()))?;

    if doc.get("mcp_servers").is_none() {
        let mut table = toml_edit::Table::new();
        table.set_implicit(true);
        doc["mcp_servers"] = toml_edit::Item::Table(table);
    }
    let mcp_servers = doc["mcp_servers"]
        .as_table_mut()
        .ok_or_else(|| SessionError::TomlParse("mcp_servers is not a table".to_string()))?;

    let mut block = toml_edit::Table::new();
    block.insert("url", toml_edit::value(server.normalized_url()));
    if let Some(env_var) = &server.token_env_var {
        block.insert("bearer_token_env_var", toml_edit::value(env_var.clone()));
    }
    mcp_servers.insert(&server.name, toml_edit::Item::Table(block));

    std::fs::write(config_path, doc.to_string()).map_err(|source| SessionError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %config_path.display(), server = %server.name, "wrote plugin-protocol config");
    Ok(())
}

/// Ensure `url` ends in `/mcp`, collapsing any trailing slashes first.
fn normalize_mcp_url(url: &str) -> String {
    if url.is_empty() {
        return url.to_string();
    }
    let normalized = url.trim_end_matches('/');
    if normalized.ends_with("/mcp") {
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{normalized}/")
        }
    } else {
        format!("{normalized}/mcp")
    }
}

pub fn resolve_config_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_mcp_suffix() {
        assert_eq!(normalize_mcp_url("https://board.example.com"), "https://board.example.com/mcp");
        assert_eq!(normalize_mcp_url("https://board.example.com/"), "https://board.example.com/mcp");
    }

    #[test]
    fn normalize_is_idempotent_on_bare_mcp_suffix() {
        assert_eq!(normalize_mcp_url("https://board.example.com/mcp"), "https://board.example.com/mcp/");
    }

    #[test]
    fn normalize_preserves_trailing_slash_mcp_url() {
        assert_eq!(normalize_mcp_url("https://board.example.com/mcp/"), "https://board.example.com/mcp/");
    }

    #[test]
    fn normalize_empty_url_passes_through() {
        assert_eq!(normalize_mcp_url(""), "");
    }

    #[test]
    fn claude_config_merges_into_existing_file_preserving_other_servers() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".mcp.json");
        std::fs::write(
            &config_path,
            r#"{"mcpServers":{"other":{"type":"stdio","command":"foo"}}}"#,
        )
        .unwrap();

        let server = McpServer {
            name: "board".to_string(),
            url: "https://board.example.com".to_string(),
            token: Some("secret-token".to_string()),
            token_env_var: None,
        };
        configure_claude(dir.path(), ".mcp.json", &server).unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&config_path).unwrap()).unwrap();
        assert!(written["mcpServers"]["other"].is_object());
        assert_eq!(
            written["mcpServers"]["board"]["url"],
            Value::String("https://board.example.com/mcp".to_string())
        );
        assert_eq!(
            written["mcpServers"]["board"]["headers"]["Authorization"],
            Value::String("Bearer secret-token".to_string())
        );
    }

    #[test]
    fn claude_config_requires_a_token() {
        let dir = tempfile::tempdir().unwrap();
        let server = McpServer {
            name: "board".to_string(),
            url: "https://board.example.com".to_string(),
            token: None,
            token_env_var: None,
        };
        let err = configure_claude(dir.path(), ".mcp.json", &server).unwrap_err();
        assert!(matches!(err, SessionError::MissingToken));
    }

    #[test]
    fn claude_config_appends_filename_to_git_exclude_once() {
        let dir = tempfile::tempdir().unwrap();
        let git_info = dir.path().join(".git").join("info");
        std::fs::create_dir_all(&git_info).unwrap();
        std::fs::write(git_info.join("exclude"), "*.log\n").unwrap();

        let server = McpServer {
            name: "board".to_string(),
            url: "https://board.example.com".to_string(),
            token: Some("t".to_string()),
            token_env_var: None,
        };
        configure_claude(dir.path(), ".mcp.json", &server).unwrap();
        configure_claude(dir.path(), ".mcp.json", &server).unwrap();

        let content = std::fs::read_to_string(git_info.join("exclude")).unwrap();
        assert_eq!(content.matches(".mcp.json").count(), 1);
    }

    #[test]
    fn codex_config_writes_new_block_with_token_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let server = McpServer {
            name: "board".to_string(),
            url: "https://board.example.com".to_string(),
            token: None,
            token_env_var: Some("BOARD_TOKEN".to_string()),
        };
        configure_codex(&config_path, &server).unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[mcp_servers.board]"));
        assert!(content.contains("url = \"https://board.example.com/mcp\""));
        assert!(content.contains("bearer_token_env_var = \"BOARD_TOKEN\""));
    }

    #[test]
    fn codex_config_replaces_existing_block_preserving_others() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            "[mcp_servers.other]\nurl = \"https://other.example.com/mcp\"\n\n[mcp_servers.board]\nurl = \"https://old.example.com/mcp\"\n",
        )
        .unwrap();

        let server = McpServer {
            name: "board".to_string(),
            url: "https://new.example.com".to_string(),
            token: None,
            token_env_var: None,
        };
        configure_codex(&config_path, &server).unwrap();

        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[mcp_servers.other]"));
        assert!(content.contains("https://other.example.com/mcp"));
        assert!(content.contains("https://new.example.com/mcp"));
        assert!(!content.contains("old.example.com"));
    }
}
