//! Route classification: which REST operations become MCP tools or resources

use std::collections::BTreeSet;
use std::fmt;

use axum::http::Method;

/// REST tags mirrored over MCP, in catalog order
pub const MCP_TAGS: [&str; 6] = [
    "content",
    "filesystem",
    "resources",
    "search",
    "sessions",
    "relations",
];

/// What an operation becomes on the MCP surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McpType {
    /// Read-only state, listed under `resources/list`
    Resource,
    /// Invokable action, listed under `tools/list`
    Tool,
    /// Not exposed
    Exclude,
}

impl fmt::Display for McpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            McpType::Resource => "RESOURCE",
            McpType::Tool => "TOOL",
            McpType::Exclude => "EXCLUDE",
        };
        f.write_str(name)
    }
}

/// One classification rule. `None` filters match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMap {
    pub methods: Option<Vec<Method>>,
    pub tags: Option<BTreeSet<String>>,
    pub mcp_type: McpType,
}

impl RouteMap {
    pub fn new(methods: &[Method], tag: &str, mcp_type: McpType) -> Self {
        Self {
            methods: Some(methods.to_vec()),
            tags: Some(BTreeSet::from([tag.to_string()])),
            mcp_type,
        }
    }

    /// Rule matching every operation
    pub fn catch_all(mcp_type: McpType) -> Self {
        Self {
            methods: None,
            tags: None,
            mcp_type,
        }
    }

    /// Method must be listed, and every rule tag must be on the operation
    pub fn matches(&self, method: &Method, tags: &[String]) -> bool {
        let method_ok = self
            .methods
            .as_ref()
            .is_none_or(|methods| methods.contains(method));
        let tags_ok = self
            .tags
            .as_ref()
            .is_none_or(|wanted| wanted.iter().all(|t| tags.contains(t)));
        method_ok && tags_ok
    }
}

/// Build the capability catalog: per tag, GET is a resource and POST/DELETE
/// are tools; everything else falls through to the trailing exclude rule.
pub fn build_route_maps() -> Vec<RouteMap> {
    let mut maps = Vec::with_capacity(MCP_TAGS.len() * 2 + 1);
    for tag in MCP_TAGS {
        maps.push(RouteMap::new(&[Method::GET], tag, McpType::Resource));
        maps.push(RouteMap::new(
            &[Method::POST, Method::DELETE],
            tag,
            McpType::Tool,
        ));
    }
    maps.push(RouteMap::catch_all(McpType::Exclude));
    maps
}

/// First matching rule wins; no match means excluded
pub fn classify(maps: &[RouteMap], method: &Method, tags: &[String]) -> McpType {
    maps.iter()
        .find(|m| m.matches(method, tags))
        .map(|m| m.mcp_type)
        .unwrap_or(McpType::Exclude)
}
