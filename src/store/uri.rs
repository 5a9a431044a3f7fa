//! `viking://` URI helpers

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

pub const SCHEME: &str = "viking://";

/// Validate and normalise a URI: require the scheme, drop trailing slashes
/// and collapse empty segments.
pub fn normalize(uri: &str) -> Result<String> {
    let rest = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| Error::InvalidUri(format!("expected {}..., got '{}'", SCHEME, uri)))?;

    let mut segments = Vec::new();
    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(Error::InvalidUri(format!("relative segment in '{}'", uri)));
        }
        segments.push(segment);
    }

    Ok(format!("{}{}", SCHEME, segments.join("/")))
}

/// Whether `uri` is the scheme root
pub fn is_root(uri: &str) -> bool {
    uri == SCHEME
}

/// Parent URI, or `None` for the root
pub fn parent(uri: &str) -> Option<String> {
    if is_root(uri) {
        return None;
    }
    let rest = &uri[SCHEME.len()..];
    match rest.rfind('/') {
        Some(idx) => Some(format!("{}{}", SCHEME, &rest[..idx])),
        None => Some(SCHEME.to_string()),
    }
}

/// Whether `uri` lies strictly below `ancestor`
pub fn is_descendant(uri: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return !is_root(uri) && uri.starts_with(SCHEME);
    }
    uri.len() > ancestor.len()
        && uri.starts_with(ancestor)
        && uri.as_bytes()[ancestor.len()] == b'/'
}

/// Path of `uri` relative to `ancestor` (empty when equal)
pub fn relative<'a>(uri: &'a str, ancestor: &str) -> &'a str {
    if is_root(ancestor) {
        return &uri[SCHEME.len()..];
    }
    uri.get(ancestor.len()..)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or("")
}

/// Every ancestor from the root down, excluding `uri` itself
pub fn ancestors(uri: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = parent(uri);
    while let Some(p) = current {
        current = parent(&p);
        chain.push(p);
    }
    chain.reverse();
    chain
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compile a wildcard pattern for relative paths.
/// `*` and `?` stay within one segment; a `**` segment spans any depth.
pub fn compile_glob(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| Error::InvalidArgument(format!("invalid glob pattern '{}': {}", pattern, e.msg)))
}

pub fn glob_matches(pattern: &Pattern, path: &str) -> bool {
    pattern.matches_with(path, GLOB_OPTIONS)
}
