//! MCP server implementation

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, ListResourcesResult,
    ListToolsResult, PaginatedRequestParam, RawResource, ReadResourceRequestParam,
    ReadResourceResult, ResourceContents, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt as _;

use super::catalog::{McpCatalog, Operation, ParamLocation};

pub const SERVER_NAME: &str = "OpenViking MCP";
pub const RESOURCE_URI_PREFIX: &str = "resource://openviking/";

const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
const DISPATCH_BASE: &str = "http://openviking.local";

/// MCP server exposing the REST API as tools and resources.
///
/// Calls are replayed in-process against the REST router.
#[derive(Clone)]
pub struct OpenVikingMcp {
    router: Router,
    catalog: Arc<McpCatalog>,
}

impl OpenVikingMcp {
    pub fn new(router: Router, catalog: Arc<McpCatalog>) -> Self {
        Self { router, catalog }
    }

    pub fn catalog(&self) -> &McpCatalog {
        &self.catalog
    }

    /// Send one operation through the REST router
    async fn dispatch(
        &self,
        op: &Operation,
        mut args: Map<String, Value>,
    ) -> Result<(StatusCode, String), ErrorData> {
        let request = build_request(op, &mut args)?;
        tracing::debug!("MCP dispatch {} {}", request.method(), request.uri());

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| ErrorData::internal_error(format!("failed to read response: {}", e), None))?;

        Ok((status, String::from_utf8_lossy(&bytes).into_owned()))
    }
}

impl OpenVikingMcp {
    /// Invoke a tool; a non-2xx reply becomes an error result carrying the envelope
    pub async fn run_tool(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<CallToolResult, ErrorData> {
        let op = self
            .catalog
            .tool(name)
            .ok_or_else(|| ErrorData::invalid_params(format!("unknown tool '{}'", name), None))?;

        let (status, body) = self.dispatch(op, args).await?;
        if status.is_success() {
            Ok(CallToolResult::success(vec![Content::text(body)]))
        } else {
            tracing::debug!("Tool {} failed with {}", op.operation_id, status);
            Ok(CallToolResult::error(vec![Content::text(body)]))
        }
    }

    /// Read a `resource://openviking/...` URI; a non-2xx reply becomes an MCP error
    pub async fn read_uri(&self, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        let not_found =
            || ErrorData::resource_not_found(format!("unknown resource '{}'", uri), None);
        let (name, args) = parse_resource_uri(uri).ok_or_else(not_found)?;
        let op = self.catalog.resource(&name).ok_or_else(not_found)?;

        let (status, body) = self.dispatch(op, args).await?;
        if status.is_success() {
            return Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(body, uri)],
            });
        }

        Err(match status {
            StatusCode::NOT_FOUND => ErrorData::resource_not_found(body, None),
            s if s.is_client_error() => ErrorData::invalid_params(body, None),
            _ => ErrorData::internal_error(body, None),
        })
    }
}

/// Build the HTTP request for `op`, consuming path and query arguments;
/// what remains becomes the JSON body.
fn build_request(op: &Operation, args: &mut Map<String, Value>) -> Result<Request<Body>, ErrorData> {
    let mut url = url::Url::parse(DISPATCH_BASE)
        .map_err(|e| ErrorData::internal_error(e.to_string(), None))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ErrorData::internal_error("dispatch base cannot hold a path", None))?;
        segments.clear();
        for segment in op.path.split('/').filter(|s| !s.is_empty()) {
            match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => {
                    let value = args.remove(name).ok_or_else(|| {
                        ErrorData::invalid_params(format!("missing path parameter '{}'", name), None)
                    })?;
                    segments.push(&scalar_to_string(&value));
                }
                None => {
                    segments.push(segment);
                }
            }
        }
    }

    for param in op.params.iter().filter(|p| p.location == ParamLocation::Query) {
        match args.remove(&param.name) {
            Some(Value::Null) | None if param.required => {
                return Err(ErrorData::invalid_params(
                    format!("missing query parameter '{}'", param.name),
                    None,
                ));
            }
            Some(Value::Null) | None => {}
            Some(Value::Array(items)) => {
                for item in items {
                    url.query_pairs_mut()
                        .append_pair(&param.name, &scalar_to_string(&item));
                }
            }
            Some(value) => {
                url.query_pairs_mut()
                    .append_pair(&param.name, &scalar_to_string(&value));
            }
        }
    }

    let uri = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    let builder = Request::builder().method(op.method.clone()).uri(uri);
    let request = if op.body_schema.is_some() {
        let body = if op.body_is_flattened() {
            Value::Object(std::mem::take(args))
        } else {
            args.remove("body").unwrap_or(Value::Null)
        };
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
    } else {
        builder.body(Body::empty())
    };

    request.map_err(|e| ErrorData::internal_error(format!("invalid request: {}", e), None))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Split `resource://openviking/<operation_id>?k=v` into the operation id and its arguments
pub fn parse_resource_uri(uri: &str) -> Option<(String, Map<String, Value>)> {
    let parsed = url::Url::parse(uri).ok()?;
    if parsed.scheme() != "resource" || parsed.host_str() != Some("openviking") {
        return None;
    }
    let name = parsed.path().trim_start_matches('/').to_string();
    if name.is_empty() {
        return None;
    }
    let args = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect();
    Some((name, args))
}

pub fn resource_uri(op: &Operation) -> String {
    format!("{}{}", RESOURCE_URI_PREFIX, op.operation_id)
}

impl ServerHandler for OpenVikingMcp {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::default(),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: rmcp::model::Implementation {
                name: SERVER_NAME.into(),
                title: Some("OpenViking Context Database".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some("OpenViking stores agent context under viking:// URIs. Read state through resources (append query parameters to the resource URI) and change it with tools such as add_resource, fs_mkdir, link or add_message.".into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .catalog
            .tools
            .iter()
            .map(|op| Tool::new(op.operation_id.clone(), op.describe(), Arc::new(op.input_schema())))
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        self.run_tool(&request.name, request.arguments.unwrap_or_default())
            .await
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let resources = self
            .catalog
            .resources
            .iter()
            .map(|op| {
                let mut raw = RawResource::new(resource_uri(op), op.operation_id.clone());
                raw.description = Some(op.describe());
                raw.mime_type = Some("application/json".into());
                raw.no_annotation()
            })
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        self.read_uri(&request.uri).await
    }
}

/// Streamable-HTTP MCP service to nest at the mount path
pub fn http_service(
    server: OpenVikingMcp,
    shutdown: CancellationToken,
) -> rmcp::transport::streamable_http_server::StreamableHttpService<
    OpenVikingMcp,
    rmcp::transport::streamable_http_server::session::local::LocalSessionManager,
> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    };

    let config = StreamableHttpServerConfig {
        cancellation_token: shutdown,
        ..Default::default()
    };

    StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        config,
    )
}

/// Run the MCP server on stdio
pub async fn serve_stdio(server: OpenVikingMcp) -> anyhow::Result<()> {
    tracing::info!("Starting MCP server on stdio...");
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
