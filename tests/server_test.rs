//! Integration tests for the OpenViking HTTP server
//! Drives the assembled application in-process

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use openviking_server::api::{build_catalog, create_app, create_app_with_mcp_service, AppState};
use openviking_server::config::ServerConfig;
use openviking_server::mcp::server::resource_uri;
use openviking_server::store::ContextStore;

const TEST_KEY: &str = "test-secret-key";

/// App fixture with a stub MCP service that always answers 204
struct AppFixture {
    pub app: Router,
    pub store: Arc<ContextStore>,
}

impl AppFixture {
    fn new(config: ServerConfig) -> Self {
        let store = Arc::new(ContextStore::new());
        let state = AppState::new(config, store.clone());
        let stub = tower::service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(StatusCode::NO_CONTENT.into_response())
        });
        let app = create_app_with_mcp_service(state, Some(stub)).expect("Failed to build app");
        Self { app, store }
    }

    fn with_key(key: &str) -> Self {
        Self::new(ServerConfig {
            api_key: Some(key.to_string()),
            ..ServerConfig::default()
        })
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn mcp(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::post(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

fn unauthenticated_body() -> Value {
    json!({
        "status": "error",
        "error": {"code": "UNAUTHENTICATED", "message": "Invalid API Key"}
    })
}

// ============================================================================
// MCP auth gate
// ============================================================================

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture.mcp("/mcp", &[]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, unauthenticated_body());
    }

    #[tokio::test]
    async fn test_wrong_key_is_rejected() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture.mcp("/mcp", &[("X-API-Key", "wrong")]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, unauthenticated_body());

        let response = fixture
            .mcp("/mcp", &[("Authorization", "Bearer wrong")])
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_x_api_key_passes() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture.mcp("/mcp", &[("X-API-Key", TEST_KEY)]).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_bearer_token_passes() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let bearer = format!("Bearer {}", TEST_KEY);
        let response = fixture.mcp("/mcp", &[("Authorization", bearer.as_str())]).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_bearer_prefix_is_case_sensitive() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let lower = format!("bearer {}", TEST_KEY);
        let response = fixture.mcp("/mcp", &[("Authorization", lower.as_str())]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bare = TEST_KEY.to_string();
        let response = fixture.mcp("/mcp", &[("Authorization", bare.as_str())]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_x_api_key_falls_back_to_bearer() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let bearer = format!("Bearer {}", TEST_KEY);
        let response = fixture
            .mcp("/mcp", &[("X-API-Key", ""), ("Authorization", bearer.as_str())])
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_non_ascii_api_key_does_not_fall_back_to_bearer() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture
            .send(
                Request::post("/mcp")
                    .header("x-api-key", HeaderValue::from_bytes("wrong-clé".as_bytes()).unwrap())
                    .header(header::AUTHORIZATION, format!("Bearer {}", TEST_KEY))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, unauthenticated_body());
    }

    #[tokio::test]
    async fn test_unroutable_mount_path_is_a_config_error() {
        for mcp_path in ["mcp", "/health", "/api/docs", "/mcp/{id}"] {
            let config = ServerConfig {
                mcp_path: mcp_path.into(),
                ..ServerConfig::default()
            };
            let state = AppState::new(config, Arc::new(ContextStore::new()));
            let result = create_app(state, CancellationToken::new());
            assert!(
                matches!(result, Err(openviking_server::Error::Config(_))),
                "{} should be rejected",
                mcp_path
            );
        }
    }

    #[tokio::test]
    async fn test_nested_paths_are_protected() {
        let fixture = AppFixture::with_key(TEST_KEY);

        for path in ["/mcp/", "/mcp/messages"] {
            let response = fixture.mcp(path, &[]).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);
        }

        let response = fixture.mcp("/mcp/", &[("X-API-Key", TEST_KEY)]).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = fixture.mcp("/mcp/messages", &[("X-API-Key", TEST_KEY)]).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_paths_outside_mount_are_open() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = fixture.get("/api/v1/fs/ls?uri=viking://").await;
        assert_eq!(response.status(), StatusCode::OK);

        // Shares the prefix but is not under the mount path
        let response = fixture.mcp("/mcpx", &[]).await;
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_no_key_configured_leaves_mcp_open() {
        let fixture = AppFixture::new(ServerConfig::default());

        for path in ["/mcp", "/mcp/"] {
            let response = fixture.mcp(path, &[]).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT, "{}", path);
        }
    }

    #[tokio::test]
    async fn test_empty_key_leaves_mcp_open() {
        let fixture = AppFixture::with_key("");

        let response = fixture.mcp("/mcp", &[]).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_custom_mount_path() {
        let fixture = AppFixture::new(ServerConfig {
            api_key: Some(TEST_KEY.into()),
            mcp_path: "/agents/mcp/".into(),
            ..ServerConfig::default()
        });

        let response = fixture.mcp("/agents/mcp", &[]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = fixture
            .mcp("/agents/mcp", &[("X-API-Key", TEST_KEY)])
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // The default path is not mounted and not guarded
        let response = fixture.mcp("/mcp", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mcp_disabled_is_not_mounted() {
        let fixture = AppFixture::new(ServerConfig {
            api_key: Some(TEST_KEY.into()),
            enable_mcp: false,
            ..ServerConfig::default()
        });

        let response = fixture.mcp("/mcp", &[]).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_is_not_gated() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture
            .send(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/mcp")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn test_real_mcp_service_behind_gate() {
        let config = ServerConfig {
            api_key: Some(TEST_KEY.into()),
            ..ServerConfig::default()
        };
        let state = AppState::new(config, Arc::new(ContextStore::new()));
        let app = create_app(state, CancellationToken::new()).expect("Failed to build app");

        let response = app
            .clone()
            .oneshot(Request::post("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::post("/mcp")
                    .header("X-API-Key", TEST_KEY)
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ACCEPT, "application/json, text/event-stream")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

// ============================================================================
// Cross-cutting layers
// ============================================================================

mod middleware_tests {
    use super::*;

    fn process_time(response: &Response) -> Option<f64> {
        response
            .headers()
            .get("x-process-time")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    #[tokio::test]
    async fn test_process_time_header_on_success() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture.get("/health").await;
        let elapsed = process_time(&response).expect("X-Process-Time missing");
        assert!(elapsed >= 0.0);
    }

    #[tokio::test]
    async fn test_process_time_header_on_rejection() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let response = fixture.mcp("/mcp", &[]).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(process_time(&response).is_some());
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture.get("/api/v1/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture.get("/api/openapi.json").await;
        assert_eq!(response.status(), StatusCode::OK);
        let doc = body_json(response).await;
        assert!(doc["paths"]["/api/v1/search/find"]["post"].is_object());
    }
}

// ============================================================================
// REST API
// ============================================================================

mod api_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_unenveloped() {
        let fixture = AppFixture::new(ServerConfig::default());

        let body = body_json(fixture.get("/health").await).await;
        assert_eq!(body["status"], "ok");
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_system_status_reports_mcp() {
        let fixture = AppFixture::with_key(TEST_KEY);

        let body = body_json(fixture.get("/api/v1/system/status").await).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["result"]["mcp_enabled"], true);
        assert_eq!(body["result"]["mcp_path"], "/mcp");
        assert_eq!(body["result"]["mcp_auth"], true);
    }

    #[tokio::test]
    async fn test_resource_lifecycle() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture
            .post_json(
                "/api/v1/resources",
                json!({"uri": "viking://resources/docs/intro.md", "content": "Hello viking\nsecond line"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"]["uri"], "viking://resources/docs/intro.md");
        assert_eq!(body["result"]["kind"], "file");

        let body = body_json(
            fixture
                .get("/api/v1/content/read?uri=viking://resources/docs/intro.md")
                .await,
        )
        .await;
        assert_eq!(body["result"]["content"], "Hello viking\nsecond line");

        let body = body_json(fixture.get("/api/v1/fs/ls?uri=viking://resources/docs").await).await;
        let listed = body["result"].as_array().expect("array result");
        assert_eq!(listed.len(), 1);

        let response = fixture
            .send(
                Request::delete("/api/v1/fs?uri=viking://resources/docs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let response = fixture
            .send(
                Request::delete("/api/v1/fs?uri=viking://resources/docs&recursive=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = fixture
            .get("/api/v1/fs/stat?uri=viking://resources/docs/intro.md")
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_uri_is_bad_request() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture
            .post_json(
                "/api/v1/resources",
                json!({"uri": "http://elsewhere/a.md", "content": "x"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_URI");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_argument() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture
            .post_json("/api/v1/fs/mkdir", json!({"not_uri": 1}))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_search_endpoints() {
        let fixture = AppFixture::new(ServerConfig::default());
        fixture
            .store
            .add_resource("viking://resources/rust.md", "Rust ownership rules\nBorrowing".into())
            .await
            .unwrap();
        fixture
            .store
            .add_resource("viking://resources/go.md", "Goroutines and channels".into())
            .await
            .unwrap();

        let body = body_json(
            fixture
                .post_json("/api/v1/search/find", json!({"query": "ownership"}))
                .await,
        )
        .await;
        let hits = body["result"].as_array().expect("array result");
        assert_eq!(hits[0]["uri"], "viking://resources/rust.md");

        let body = body_json(
            fixture
                .post_json(
                    "/api/v1/search/grep",
                    json!({"uri": "viking://resources", "pattern": "borrowing", "case_insensitive": true}),
                )
                .await,
        )
        .await;
        let matches = body["result"].as_array().expect("array result");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["line"], 2);

        let body = body_json(fixture.get("/api/v1/search/glob?pattern=**/*.md").await).await;
        let uris = body["result"].as_array().expect("array result");
        assert_eq!(uris.len(), 2);
    }

    #[tokio::test]
    async fn test_relations() {
        let fixture = AppFixture::new(ServerConfig::default());
        fixture.store.add_resource("viking://resources/a.md", "a".into()).await.unwrap();
        fixture.store.add_resource("viking://resources/b.md", "b".into()).await.unwrap();

        let response = fixture
            .post_json(
                "/api/v1/relations/link",
                json!({"from_uri": "viking://resources/a.md", "to_uris": ["viking://resources/b.md"], "reason": "see also"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(
            fixture
                .get("/api/v1/relations?uri=viking://resources/a.md")
                .await,
        )
        .await;
        assert_eq!(body["result"][0]["uri"], "viking://resources/b.md");
        assert_eq!(body["result"][0]["reason"], "see also");

        let response = fixture
            .send(
                Request::delete(
                    "/api/v1/relations/link?from_uri=viking://resources/a.md&to_uri=viking://resources/b.md",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_pack_round_trip_and_observer() {
        let fixture = AppFixture::new(ServerConfig::default());
        fixture
            .store
            .add_resource("viking://resources/kb/intro.md", "welcome".into())
            .await
            .unwrap();

        let body = body_json(
            fixture
                .get("/api/v1/pack/export?uri=viking://resources/kb")
                .await,
        )
        .await;
        assert_eq!(body["result"]["files"][0]["path"], "intro.md");

        let response = fixture
            .post_json(
                "/api/v1/pack/import",
                json!({"target_uri": "viking://resources/copy", "files": body["result"]["files"]}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"][0], "viking://resources/copy/intro.md");

        let body = body_json(fixture.get("/api/v1/observer/system").await).await;
        assert_eq!(body["status"], "ok");
        assert!(body["result"]["entries"].as_u64().unwrap() >= 5);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let fixture = AppFixture::new(ServerConfig::default());

        let response = fixture.post_json("/api/v1/sessions", json!({})).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        let id = body["result"]["id"].as_str().expect("session id").to_string();

        let response = fixture
            .post_json(
                &format!("/api/v1/sessions/{}/messages", id),
                json!({"role": "user", "content": "hi"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"]["messages"].as_array().map(|m| m.len()), Some(1));

        let response = fixture
            .post_json(
                &format!("/api/v1/sessions/{}/messages", id),
                json!({"role": "robot", "content": "beep"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = fixture
            .send(
                Request::delete(format!("/api/v1/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = fixture.get(&format!("/api/v1/sessions/{}", id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

// ============================================================================
// MCP catalog derived from the API description
// ============================================================================

mod catalog_tests {
    use super::*;

    #[test]
    fn test_non_mcp_tags_are_excluded() {
        let catalog = build_catalog().expect("Failed to build catalog");

        let exposed = catalog.tools.iter().chain(catalog.resources.iter());
        for op in exposed {
            assert!(
                !op.tags.iter().any(|t| ["system", "debug", "pack", "observer"].contains(&t.as_str())),
                "{} should not be exposed",
                op.operation_id
            );
        }
        let excluded: Vec<_> = catalog.excluded.iter().map(|op| op.path.as_str()).collect();
        assert!(excluded.contains(&"/health"));
        assert!(excluded.contains(&"/api/v1/system/status"));
        assert!(excluded.contains(&"/api/v1/debug/health"));
        assert!(excluded.contains(&"/api/v1/pack/export"));
        assert!(excluded.contains(&"/api/v1/pack/import"));
        assert!(excluded.contains(&"/api/v1/observer/system"));
    }

    #[test]
    fn test_gets_are_resources_and_mutations_are_tools() {
        let catalog = build_catalog().expect("Failed to build catalog");

        assert!(catalog.resources.iter().all(|op| op.method == Method::GET));
        assert!(catalog
            .tools
            .iter()
            .all(|op| op.method == Method::POST || op.method == Method::DELETE));

        assert!(catalog.tool("find").is_some());
        assert!(catalog.tool("add_resource").is_some());
        assert!(catalog.tool("fs_rm").is_some());
        assert!(catalog.resource("read_content").is_some());
        assert!(catalog.resource("get_session").is_some());
        assert!(catalog.tool("read_content").is_none());
    }

    #[test]
    fn test_every_mcp_tag_is_represented() {
        let catalog = build_catalog().expect("Failed to build catalog");

        for tag in openviking_server::mcp::route_map::MCP_TAGS {
            let covered = catalog
                .tools
                .iter()
                .chain(catalog.resources.iter())
                .any(|op| op.tags.iter().any(|t| t == tag));
            assert!(covered, "tag {} has no MCP operation", tag);
        }
    }

    #[test]
    fn test_resource_uris() {
        let catalog = build_catalog().expect("Failed to build catalog");

        let op = catalog.resource("fs_ls").expect("fs_ls resource");
        assert_eq!(resource_uri(op), "resource://openviking/fs_ls");
    }
}
