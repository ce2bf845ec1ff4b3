//! Rate-limit-aware REST+GraphQL client and the Project Board Adapter built
//! on top of it.

pub mod board;
pub mod client;
pub mod issues;
pub mod mcp_client;
pub mod secrets;

pub use board::{BoardError, ProjectBoardAdapter, StatusField};
pub use client::{RemoteClient, RemoteError, RemoteResponse, RetryConfig};
pub use issues::IssueTracker;
pub use mcp_client::AppforgeMcpClient;
pub use secrets::HttpSecretFetcher;
