//! HTTP API layer

mod handlers;
pub mod middleware;
mod routes;

pub use routes::{
    api_router, build_catalog, create_app, create_app_with_mcp_service, serve, ApiDoc, AppState,
};
