//! OpenViking server - HTTP API and MCP bridge for an agent-native context database

pub mod config;
pub mod error;
pub mod types;

pub mod store;
pub mod mcp;
pub mod api;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use types::*;
