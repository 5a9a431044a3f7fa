//! API route definitions and application construction

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::Request,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    self, AddMessageRequest, AddResourceRequest, ComponentStatus, ContentResponse, FindRequest,
    GrepRequest, HealthResponse, ImportPackRequest, LinkRequest, MkdirRequest, MvRequest,
    ObserverSnapshot, RemovedResponse, SystemStatus,
};
use super::middleware::{build_cors_layer, panic_response, process_time};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::mcp::{self, McpAuthGate, McpCatalog, OpenVikingMcp};
use crate::store::ContextStore;
use crate::types::{
    Entry, EntryKind, ErrorInfo, FindHit, GrepMatch, Message, Pack, PackFile, Relation, Session,
    SessionMeta,
};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "OpenViking API",
        version = "0.1.0",
        description = "OpenViking HTTP Server - Agent-native context database"
    ),
    tags(
        (name = "system", description = "Health and status"),
        (name = "resources", description = "Resource ingestion"),
        (name = "filesystem", description = "Context tree operations"),
        (name = "content", description = "Reading content"),
        (name = "search", description = "Search operations"),
        (name = "relations", description = "Links between entries"),
        (name = "sessions", description = "Conversation sessions"),
        (name = "pack", description = "Subtree export and import"),
        (name = "debug", description = "Diagnostics"),
        (name = "observer", description = "Store counters")
    ),
    paths(
        handlers::health,
        handlers::system_status,
        handlers::debug_health,
        handlers::add_resource,
        handlers::list_resources,
        handlers::fs_ls,
        handlers::fs_stat,
        handlers::fs_mkdir,
        handlers::fs_mv,
        handlers::fs_rm,
        handlers::read_content,
        handlers::get_abstract,
        handlers::find,
        handlers::grep,
        handlers::glob,
        handlers::list_relations,
        handlers::link,
        handlers::unlink,
        handlers::create_session,
        handlers::list_sessions,
        handlers::get_session,
        handlers::delete_session,
        handlers::add_message,
        handlers::export_pack,
        handlers::import_pack,
        handlers::observer_system,
    ),
    components(schemas(
        Entry,
        EntryKind,
        ErrorInfo,
        FindHit,
        GrepMatch,
        Message,
        Relation,
        Session,
        SessionMeta,
        HealthResponse,
        SystemStatus,
        ComponentStatus,
        ContentResponse,
        RemovedResponse,
        AddResourceRequest,
        MkdirRequest,
        MvRequest,
        FindRequest,
        GrepRequest,
        LinkRequest,
        AddMessageRequest,
        Pack,
        PackFile,
        ImportPackRequest,
        ObserverSnapshot,
    ))
)]
pub struct ApiDoc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ContextStore>,
    pub config: Arc<ServerConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<ContextStore>) -> Self {
        Self {
            store,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}

/// REST routes only, with panics rendered as JSON errors
pub fn api_router(state: AppState) -> Router {
    Router::new()
        // System
        .route("/health", get(handlers::health))
        .route("/api/v1/system/status", get(handlers::system_status))
        .route("/api/v1/debug/health", get(handlers::debug_health))

        // Resources
        .route("/api/v1/resources", post(handlers::add_resource).get(handlers::list_resources))

        // Filesystem
        .route("/api/v1/fs/ls", get(handlers::fs_ls))
        .route("/api/v1/fs/stat", get(handlers::fs_stat))
        .route("/api/v1/fs/mkdir", post(handlers::fs_mkdir))
        .route("/api/v1/fs/mv", post(handlers::fs_mv))
        .route("/api/v1/fs", delete(handlers::fs_rm))

        // Content
        .route("/api/v1/content/read", get(handlers::read_content))
        .route("/api/v1/content/abstract", get(handlers::get_abstract))

        // Search
        .route("/api/v1/search/find", post(handlers::find))
        .route("/api/v1/search/grep", post(handlers::grep))
        .route("/api/v1/search/glob", get(handlers::glob))

        // Relations
        .route("/api/v1/relations", get(handlers::list_relations))
        .route("/api/v1/relations/link", post(handlers::link).delete(handlers::unlink))

        // Sessions
        .route("/api/v1/sessions", post(handlers::create_session).get(handlers::list_sessions))
        .route(
            "/api/v1/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/api/v1/sessions/{session_id}/messages", post(handlers::add_message))

        // Packs
        .route("/api/v1/pack/export", get(handlers::export_pack))
        .route("/api/v1/pack/import", post(handlers::import_pack))

        // Observer
        .route("/api/v1/observer/system", get(handlers::observer_system))

        .fallback(|| async { Error::NotFound("no such endpoint".into()) })
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// MCP catalog for the REST API
pub fn build_catalog() -> Result<McpCatalog> {
    let doc = serde_json::to_value(ApiDoc::openapi())?;
    Ok(McpCatalog::build(&doc, &mcp::build_route_maps()))
}

/// Create the application: REST API, docs and, when enabled, the MCP
/// endpoint behind the auth gate.
pub fn create_app(state: AppState, shutdown: CancellationToken) -> Result<Router> {
    let mcp_service = if state.config.enable_mcp {
        let catalog = Arc::new(build_catalog()?);
        tracing::info!(
            "MCP exposes {} tools and {} resources",
            catalog.tools.len(),
            catalog.resources.len()
        );
        let server = OpenVikingMcp::new(api_router(state.clone()), catalog);
        Some(mcp::server::http_service(server, shutdown))
    } else {
        None
    };
    create_app_with_mcp_service(state, mcp_service)
}

/// Like [`create_app`], with a caller-supplied service mounted at the MCP path
pub fn create_app_with_mcp_service<S>(state: AppState, mcp_service: Option<S>) -> Result<Router>
where
    S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
{
    let config = state.config.clone();
    config.validate()?;
    let gate = McpAuthGate::from_config(&config);
    if gate.is_active() {
        tracing::info!("MCP endpoint {} requires an API key", gate.mount_path());
    }

    let mut router = api_router(state)
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()));

    if let (true, Some(service)) = (config.enable_mcp, mcp_service) {
        // Wildcards never match an empty tail, so `mount/` is routed on its own
        let mount = config.mount_path();
        router = router
            .route_service(&mount, service.clone())
            .route_service(&format!("{}/", mount), service.clone())
            .route_service(&format!("{}/{{*rest}}", mount), service);
    }

    Ok(router
        .layer(middleware::from_fn_with_state(gate, mcp::auth::mcp_auth))
        .layer(middleware::from_fn(process_time))
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http()))
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: ServerConfig, store: Arc<ContextStore>) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let mount_path = config.mount_path();
    let enable_mcp = config.enable_mcp;

    let shutdown = CancellationToken::new();
    let app = create_app(AppState::new(config, store), shutdown.clone())?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("OpenViking server running at http://{}", addr);
    tracing::info!("API docs available at http://{}/api/docs", addr);
    if enable_mcp {
        tracing::info!("MCP endpoint at http://{}{}", addr, mount_path);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down...");
            shutdown.cancel();
        })
        .await?;

    tracing::info!("OpenViking server stopped");
    Ok(())
}
