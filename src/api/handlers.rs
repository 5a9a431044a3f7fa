//! API request handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::routes::AppState;
use crate::error::Result;
use crate::types::{
    ApiResponse, Entry, ErrorInfo, FindHit, GrepMatch, Pack, PackFile, Relation, Session, SessionMeta,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

fn ok<T>(result: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(result)))
}

// Query parameters

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UriParams {
    /// Target `viking://` URI
    pub uri: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListResourcesParams {
    /// Only list resources below this URI
    pub under: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RmParams {
    /// URI to remove
    pub uri: String,
    /// Remove non-empty directories
    pub recursive: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GlobParams {
    /// Wildcard pattern; `*` stays in one segment, `**` crosses segments
    pub pattern: String,
    /// Directory to match under (default: root)
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UnlinkParams {
    /// Source URI
    pub from_uri: String,
    /// Target URI to unlink
    pub to_uri: String,
}

// Request bodies

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddResourceRequest {
    /// Destination URI
    pub uri: String,
    /// Text content
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MkdirRequest {
    /// Directory URI
    pub uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MvRequest {
    /// Source URI
    pub from_uri: String,
    /// Destination URI
    pub to_uri: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FindRequest {
    /// Free-text query
    pub query: String,
    /// Restrict to this subtree
    pub target_uri: Option<String>,
    /// Maximum number of hits (default: 10)
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrepRequest {
    /// File or directory to search
    pub uri: String,
    /// Literal text to look for
    pub pattern: String,
    /// Ignore case
    pub case_insensitive: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkRequest {
    /// Source URI
    pub from_uri: String,
    /// Target URIs
    pub to_uris: Vec<String>,
    /// Why the entries are related
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMessageRequest {
    /// `user`, `assistant` or `system`
    pub role: String,
    /// Message text
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportPackRequest {
    /// Directory to unpack into
    pub target_uri: String,
    /// Files with paths relative to the target
    pub files: Vec<PackFile>,
}

// Response types

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Server version
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatus {
    pub version: String,
    pub mcp_enabled: bool,
    pub mcp_path: Option<String>,
    pub mcp_auth: bool,
    pub uptime_secs: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentStatus {
    pub name: String,
    pub healthy: bool,
    pub detail: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContentResponse {
    pub uri: String,
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovedResponse {
    pub removed: Vec<String>,
}

/// Store-wide counters
#[derive(Debug, Serialize, ToSchema)]
pub struct ObserverSnapshot {
    pub entries: usize,
    pub relations: usize,
    pub sessions: usize,
    pub uptime_secs: i64,
}

const DEFAULT_FIND_LIMIT: usize = 10;

// Handlers

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Server status
#[utoipa::path(
    get,
    path = "/api/v1/system/status",
    responses((status = 200, description = "Server status", body = SystemStatus)),
    tag = "system"
)]
pub async fn system_status(State(state): State<AppState>) -> ApiResult<SystemStatus> {
    let config = &state.config;
    ok(SystemStatus {
        version: env!("CARGO_PKG_VERSION").into(),
        mcp_enabled: config.enable_mcp,
        mcp_path: config.enable_mcp.then(|| config.mount_path()),
        mcp_auth: config.enable_mcp && config.api_key().is_some(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

/// Component health for debugging
#[utoipa::path(
    get,
    path = "/api/v1/debug/health",
    responses((status = 200, description = "Component health", body = [ComponentStatus])),
    tag = "debug"
)]
pub async fn debug_health(State(state): State<AppState>) -> ApiResult<Vec<ComponentStatus>> {
    let (entries, relations, sessions) = state.store.counts().await;
    ok(vec![
        ComponentStatus {
            name: "context_store".into(),
            healthy: true,
            detail: format!("{} entries, {} relations", entries, relations),
        },
        ComponentStatus {
            name: "sessions".into(),
            healthy: true,
            detail: format!("{} sessions", sessions),
        },
    ])
}

/// Add a text resource
#[utoipa::path(
    post,
    path = "/api/v1/resources",
    request_body = AddResourceRequest,
    responses(
        (status = 200, description = "Resource stored", body = Entry),
        (status = 400, description = "Invalid URI", body = ErrorInfo),
        (status = 409, description = "A directory exists at the URI", body = ErrorInfo)
    ),
    tag = "resources"
)]
pub async fn add_resource(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddResourceRequest>, JsonRejection>,
) -> ApiResult<Entry> {
    let Json(req) = payload?;
    ok(state.store.add_resource(&req.uri, req.content).await?)
}

/// List stored resources
#[utoipa::path(
    get,
    path = "/api/v1/resources",
    params(ListResourcesParams),
    responses((status = 200, description = "Resources", body = [Entry])),
    tag = "resources"
)]
pub async fn list_resources(
    State(state): State<AppState>,
    params: std::result::Result<Query<ListResourcesParams>, QueryRejection>,
) -> ApiResult<Vec<Entry>> {
    let Query(params) = params?;
    ok(state.store.list_resources(params.under.as_deref()).await?)
}

/// List a directory
#[utoipa::path(
    get,
    path = "/api/v1/fs/ls",
    params(UriParams),
    responses(
        (status = 200, description = "Directory entries", body = [Entry]),
        (status = 404, description = "Not found", body = ErrorInfo)
    ),
    tag = "filesystem"
)]
pub async fn fs_ls(
    State(state): State<AppState>,
    params: std::result::Result<Query<UriParams>, QueryRejection>,
) -> ApiResult<Vec<Entry>> {
    let Query(params) = params?;
    ok(state.store.ls(&params.uri).await?)
}

/// Describe one entry
#[utoipa::path(
    get,
    path = "/api/v1/fs/stat",
    params(UriParams),
    responses(
        (status = 200, description = "Entry", body = Entry),
        (status = 404, description = "Not found", body = ErrorInfo)
    ),
    tag = "filesystem"
)]
pub async fn fs_stat(
    State(state): State<AppState>,
    params: std::result::Result<Query<UriParams>, QueryRejection>,
) -> ApiResult<Entry> {
    let Query(params) = params?;
    ok(state.store.stat(&params.uri).await?)
}

/// Create a directory and its parents
#[utoipa::path(
    post,
    path = "/api/v1/fs/mkdir",
    request_body = MkdirRequest,
    responses((status = 200, description = "Directory", body = Entry)),
    tag = "filesystem"
)]
pub async fn fs_mkdir(
    State(state): State<AppState>,
    payload: std::result::Result<Json<MkdirRequest>, JsonRejection>,
) -> ApiResult<Entry> {
    let Json(req) = payload?;
    ok(state.store.mkdir(&req.uri).await?)
}

/// Move an entry with its subtree
#[utoipa::path(
    post,
    path = "/api/v1/fs/mv",
    request_body = MvRequest,
    responses(
        (status = 200, description = "Moved entry", body = Entry),
        (status = 409, description = "Destination exists", body = ErrorInfo)
    ),
    tag = "filesystem"
)]
pub async fn fs_mv(
    State(state): State<AppState>,
    payload: std::result::Result<Json<MvRequest>, JsonRejection>,
) -> ApiResult<Entry> {
    let Json(req) = payload?;
    ok(state.store.mv(&req.from_uri, &req.to_uri).await?)
}

/// Remove an entry
#[utoipa::path(
    delete,
    path = "/api/v1/fs",
    params(RmParams),
    responses(
        (status = 200, description = "Removed URIs", body = RemovedResponse),
        (status = 412, description = "Directory not empty", body = ErrorInfo)
    ),
    tag = "filesystem"
)]
pub async fn fs_rm(
    State(state): State<AppState>,
    params: std::result::Result<Query<RmParams>, QueryRejection>,
) -> ApiResult<RemovedResponse> {
    let Query(params) = params?;
    let removed = state.store.rm(&params.uri, params.recursive.unwrap_or(false)).await?;
    ok(RemovedResponse { removed })
}

/// Read file content
#[utoipa::path(
    get,
    path = "/api/v1/content/read",
    params(UriParams),
    responses(
        (status = 200, description = "File content", body = ContentResponse),
        (status = 404, description = "Not found", body = ErrorInfo)
    ),
    tag = "content"
)]
pub async fn read_content(
    State(state): State<AppState>,
    params: std::result::Result<Query<UriParams>, QueryRejection>,
) -> ApiResult<ContentResponse> {
    let Query(params) = params?;
    let content = state.store.read(&params.uri).await?;
    ok(ContentResponse {
        uri: params.uri,
        content,
    })
}

/// One-line abstract of a file or directory
#[utoipa::path(
    get,
    path = "/api/v1/content/abstract",
    params(UriParams),
    responses((status = 200, description = "Abstract", body = ContentResponse)),
    tag = "content"
)]
pub async fn get_abstract(
    State(state): State<AppState>,
    params: std::result::Result<Query<UriParams>, QueryRejection>,
) -> ApiResult<ContentResponse> {
    let Query(params) = params?;
    let content = state.store.abstract_of(&params.uri).await?;
    ok(ContentResponse {
        uri: params.uri,
        content,
    })
}

/// Rank files by query terms
#[utoipa::path(
    post,
    path = "/api/v1/search/find",
    request_body = FindRequest,
    responses((status = 200, description = "Ranked hits", body = [FindHit])),
    tag = "search"
)]
pub async fn find(
    State(state): State<AppState>,
    payload: std::result::Result<Json<FindRequest>, JsonRejection>,
) -> ApiResult<Vec<FindHit>> {
    let Json(req) = payload?;
    ok(state
        .store
        .find(
            &req.query,
            req.target_uri.as_deref(),
            req.limit.unwrap_or(DEFAULT_FIND_LIMIT),
        )
        .await?)
}

/// Find lines containing a pattern
#[utoipa::path(
    post,
    path = "/api/v1/search/grep",
    request_body = GrepRequest,
    responses((status = 200, description = "Matching lines", body = [GrepMatch])),
    tag = "search"
)]
pub async fn grep(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GrepRequest>, JsonRejection>,
) -> ApiResult<Vec<GrepMatch>> {
    let Json(req) = payload?;
    ok(state
        .store
        .grep(&req.uri, &req.pattern, req.case_insensitive.unwrap_or(false))
        .await?)
}

/// Match file URIs against a wildcard pattern
#[utoipa::path(
    get,
    path = "/api/v1/search/glob",
    params(GlobParams),
    responses((status = 200, description = "Matching URIs", body = [String])),
    tag = "search"
)]
pub async fn glob(
    State(state): State<AppState>,
    params: std::result::Result<Query<GlobParams>, QueryRejection>,
) -> ApiResult<Vec<String>> {
    let Query(params) = params?;
    ok(state.store.glob(&params.pattern, params.uri.as_deref()).await?)
}

/// Relations from an entry
#[utoipa::path(
    get,
    path = "/api/v1/relations",
    params(UriParams),
    responses((status = 200, description = "Relations", body = [Relation])),
    tag = "relations"
)]
pub async fn list_relations(
    State(state): State<AppState>,
    params: std::result::Result<Query<UriParams>, QueryRejection>,
) -> ApiResult<Vec<Relation>> {
    let Query(params) = params?;
    ok(state.store.relations(&params.uri).await?)
}

/// Link an entry to others
#[utoipa::path(
    post,
    path = "/api/v1/relations/link",
    request_body = LinkRequest,
    responses(
        (status = 200, description = "Relations after linking", body = [Relation]),
        (status = 404, description = "Endpoint missing", body = ErrorInfo)
    ),
    tag = "relations"
)]
pub async fn link(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LinkRequest>, JsonRejection>,
) -> ApiResult<Vec<Relation>> {
    let Json(req) = payload?;
    ok(state
        .store
        .link(&req.from_uri, &req.to_uris, req.reason.as_deref().unwrap_or(""))
        .await?)
}

/// Remove a relation
#[utoipa::path(
    delete,
    path = "/api/v1/relations/link",
    params(UnlinkParams),
    responses(
        (status = 200, description = "Relation removed"),
        (status = 404, description = "No such relation", body = ErrorInfo)
    ),
    tag = "relations"
)]
pub async fn unlink(
    State(state): State<AppState>,
    params: std::result::Result<Query<UnlinkParams>, QueryRejection>,
) -> ApiResult<()> {
    let Query(params) = params?;
    state.store.unlink(&params.from_uri, &params.to_uri).await?;
    ok(())
}

/// Start a session
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    responses((status = 201, description = "Session created", body = Session)),
    tag = "sessions"
)]
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<Session>>) {
    let session = state.store.create_session().await;
    (StatusCode::CREATED, Json(ApiResponse::ok(session)))
}

/// List sessions
#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    responses((status = 200, description = "Sessions", body = [SessionMeta])),
    tag = "sessions"
)]
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Vec<SessionMeta>> {
    let sessions = state.store.list_sessions().await;
    ok(sessions.iter().map(SessionMeta::from).collect())
}

/// Get a session with its messages
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Session", body = Session),
        (status = 404, description = "Not found", body = ErrorInfo)
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Session> {
    let Path(id) = id?;
    ok(state.store.get_session(id).await?)
}

/// Delete a session
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{session_id}",
    params(("session_id" = String, Path, description = "Session UUID")),
    responses(
        (status = 200, description = "Session deleted"),
        (status = 404, description = "Not found", body = ErrorInfo)
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    state.store.delete_session(id).await?;
    ok(())
}

/// Append a message to a session
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/messages",
    params(("session_id" = String, Path, description = "Session UUID")),
    request_body = AddMessageRequest,
    responses(
        (status = 200, description = "Updated session", body = Session),
        (status = 400, description = "Invalid role", body = ErrorInfo)
    ),
    tag = "sessions"
)]
pub async fn add_message(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<AddMessageRequest>, JsonRejection>,
) -> ApiResult<Session> {
    let Path(id) = id?;
    let Json(req) = payload?;
    ok(state.store.add_message(id, &req.role, req.content).await?)
}

/// Export a subtree as a pack
#[utoipa::path(
    get,
    path = "/api/v1/pack/export",
    params(UriParams),
    responses(
        (status = 200, description = "Pack", body = Pack),
        (status = 404, description = "Not found", body = ErrorInfo)
    ),
    tag = "pack"
)]
pub async fn export_pack(
    State(state): State<AppState>,
    params: std::result::Result<Query<UriParams>, QueryRejection>,
) -> ApiResult<Pack> {
    let Query(params) = params?;
    ok(state.store.export_pack(&params.uri).await?)
}

/// Unpack files below a directory
#[utoipa::path(
    post,
    path = "/api/v1/pack/import",
    request_body = ImportPackRequest,
    responses(
        (status = 200, description = "Written URIs", body = [String]),
        (status = 400, description = "Invalid path in pack", body = ErrorInfo)
    ),
    tag = "pack"
)]
pub async fn import_pack(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ImportPackRequest>, JsonRejection>,
) -> ApiResult<Vec<String>> {
    let Json(req) = payload?;
    ok(state.store.import_pack(&req.target_uri, req.files).await?)
}

/// Live store counters
#[utoipa::path(
    get,
    path = "/api/v1/observer/system",
    responses((status = 200, description = "Counters", body = ObserverSnapshot)),
    tag = "observer"
)]
pub async fn observer_system(State(state): State<AppState>) -> ApiResult<ObserverSnapshot> {
    let (entries, relations, sessions) = state.store.counts().await;
    ok(ObserverSnapshot {
        entries,
        relations,
        sessions,
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
