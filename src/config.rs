//! Configuration for the OpenViking server

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const DEFAULT_MCP_PATH: &str = "/mcp";

/// Path prefixes owned by the REST API and its docs
const RESERVED_PREFIXES: [&str; 2] = ["/health", "/api"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret guarding the MCP endpoint. Empty or absent disables the check.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Allowed CORS origins (`*` mirrors the request origin)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Expose the REST API over MCP
    #[serde(default = "default_enable_mcp")]
    pub enable_mcp: bool,

    /// Mount path of the MCP endpoint
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
            cors_origins: default_cors_origins(),
            enable_mcp: default_enable_mcp(),
            mcp_path: default_mcp_path(),
        }
    }
}

impl ServerConfig {
    /// Load config from `path`, `$OPENVIKING_CONFIG`, or the default location,
    /// then apply `OPENVIKING_*` environment overrides.
    ///
    /// A missing file at the default location yields defaults; a missing file
    /// that was named explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("OPENVIKING_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Self::load_file(&path)?
            }
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `~/.openviking/server.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".openviking").join("server.toml"))
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OPENVIKING_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("OPENVIKING_PORT") {
            self.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid OPENVIKING_PORT: {}", port)))?;
        }
        if let Some(key) = lookup("OPENVIKING_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(origins) = lookup("OPENVIKING_CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(flag) = lookup("OPENVIKING_ENABLE_MCP") {
            self.enable_mcp = parse_bool(&flag).ok_or_else(|| {
                Error::Config(format!("invalid OPENVIKING_ENABLE_MCP: {}", flag))
            })?;
        }
        if let Some(path) = lookup("OPENVIKING_MCP_PATH") {
            self.mcp_path = path;
        }
        Ok(())
    }

    /// Configured secret, treating an empty string as unset
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }

    /// MCP mount path without a trailing slash, falling back to `/mcp`
    pub fn mount_path(&self) -> String {
        let trimmed = self.mcp_path.trim_end_matches('/');
        if trimmed.is_empty() {
            DEFAULT_MCP_PATH.to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Reject an MCP mount path that cannot be routed or that would shadow
    /// REST routes. Nothing is mounted when MCP is off, so that case passes.
    pub fn validate(&self) -> Result<()> {
        if !self.enable_mcp {
            return Ok(());
        }

        let mount = self.mount_path();
        if !mount.starts_with('/') {
            return Err(Error::Config(format!(
                "mcp_path must start with '/': {}",
                self.mcp_path
            )));
        }
        if mount
            .chars()
            .any(|c| matches!(c, '{' | '}' | '*' | '?' | '#') || c.is_whitespace())
        {
            return Err(Error::Config(format!(
                "mcp_path contains characters not allowed in a route: {}",
                self.mcp_path
            )));
        }

        let clashes = |prefix: &str| {
            mount == prefix
                || mount.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
                || prefix.strip_prefix(mount.as_str()).is_some_and(|rest| rest.starts_with('/'))
        };
        if let Some(prefix) = RESERVED_PREFIXES.iter().find(|p| clashes(p)) {
            return Err(Error::Config(format!(
                "mcp_path {} overlaps the REST routes under {}",
                mount, prefix
            )));
        }
        Ok(())
    }

    /// `host:port` for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// Default value functions

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1933
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_enable_mcp() -> bool {
    true
}

fn default_mcp_path() -> String {
    DEFAULT_MCP_PATH.to_string()
}
