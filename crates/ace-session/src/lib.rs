//! Detached-session lifecycle, prompt delivery, and plugin-protocol
//! configuration for the coding CLI an item's agent run spawns into.

mod error;
mod mcp;
mod supervisor;

pub use error::SessionError;
pub use mcp::{configure_claude, configure_codex, resolve_config_path, McpServer};
pub use supervisor::SessionSupervisor;
