//! MCP integration: auth gate, route classification and the protocol server

pub mod auth;
pub mod catalog;
pub mod route_map;
pub mod server;

pub use auth::McpAuthGate;
pub use catalog::McpCatalog;
pub use route_map::{build_route_maps, McpType, RouteMap};
pub use server::OpenVikingMcp;
