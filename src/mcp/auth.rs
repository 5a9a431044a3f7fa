//! Shared-secret gate in front of the MCP mount path

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::config::ServerConfig;
use crate::error::Error;

pub const API_KEY_HEADER: &str = "x-api-key";
const BEARER_PREFIX: &str = "Bearer ";

/// Decides whether a request to the MCP endpoint may pass.
///
/// Inert unless MCP is enabled and a non-empty key is configured.
#[derive(Debug, Clone)]
pub struct McpAuthGate {
    mount_path: String,
    api_key: Option<Arc<str>>,
}

impl McpAuthGate {
    pub fn new(enabled: bool, api_key: Option<&str>, mount_path: &str) -> Self {
        let api_key = api_key
            .filter(|key| enabled && !key.is_empty())
            .map(Arc::from);
        let trimmed = mount_path.trim_end_matches('/');
        Self {
            mount_path: if trimmed.is_empty() { "/mcp".into() } else { trimmed.into() },
            api_key,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.enable_mcp, config.api_key(), &config.mount_path())
    }

    pub fn is_active(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Exact mount path or anything nested under it
    pub fn protects(&self, path: &str) -> bool {
        path == self.mount_path
            || path
                .strip_prefix(self.mount_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// `Ok` forwards the request; `Err` is the 401 to send instead
    pub fn check(&self, path: &str, headers: &HeaderMap) -> Result<(), Error> {
        let Some(expected) = self.api_key.as_deref() else {
            return Ok(());
        };
        if !self.protects(path) {
            return Ok(());
        }

        match presented_key(headers) {
            Some(key) if constant_time_eq(key, expected.as_bytes()) => Ok(()),
            _ => Err(Error::Unauthenticated("Invalid API Key".into())),
        }
    }
}

/// Credential from `X-API-Key`, else from `Authorization: Bearer <token>`.
/// Values are taken as raw bytes, so a non-ASCII `X-API-Key` is compared
/// (and fails) rather than skipped. The bearer prefix is matched literally.
pub fn presented_key(headers: &HeaderMap) -> Option<&[u8]> {
    let direct = headers
        .get(API_KEY_HEADER)
        .map(|v| v.as_bytes())
        .filter(|v| !v.is_empty());
    if direct.is_some() {
        return direct;
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.as_bytes().strip_prefix(BEARER_PREFIX.as_bytes()))
        .filter(|v| !v.is_empty())
}

/// Compare secrets without an early exit. Both sides are hashed first so the
/// running time does not depend on where, or whether, their lengths differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let left = Sha256::digest(a);
    let right = Sha256::digest(b);

    let mut diff = 0u8;
    for (x, y) in left.iter().zip(right.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Axum middleware wrapping the gate
pub async fn mcp_auth(
    State(gate): State<McpAuthGate>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(err) = gate.check(request.uri().path(), request.headers()) {
        tracing::warn!("Rejected unauthenticated MCP request to {}", request.uri().path());
        return err.into_response();
    }
    next.run(request).await
}
