//! Core types for the OpenViking server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Response envelope shared by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// `ok` or `error`
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            status: "ok".into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(error: ErrorInfo) -> Self {
        Self {
            status: "error".into(),
            result: None,
            error: Some(error),
        }
    }
}

/// Error payload of the response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorInfo {
    /// Machine-readable code such as `NOT_FOUND`
    pub code: String,
    /// Human-readable message
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

/// A node in the context tree, addressed by a `viking://` URI
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Entry {
    pub uri: String,
    pub kind: EntryKind,
    #[serde(skip)]
    pub content: String,
    /// Content length in bytes (0 for directories)
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    pub fn dir(uri: String) -> Self {
        let now = Utc::now();
        Self {
            uri,
            kind: EntryKind::Dir,
            content: String::new(),
            size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file(uri: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            uri,
            kind: EntryKind::File,
            size: content.len(),
            content,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// A directed link between two entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Relation {
    pub uri: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// Session listing row
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionMeta {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&Session> for SessionMeta {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            created_at: session.created_at,
            message_count: session.messages.len(),
        }
    }
}

/// One file of an exported context pack, addressed relative to the pack root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PackFile {
    pub path: String,
    pub content: String,
}

/// Portable snapshot of a subtree
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Pack {
    pub uri: String,
    pub files: Vec<PackFile>,
}

/// Search hit from `find`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FindHit {
    pub uri: String,
    pub score: f32,
    pub snippet: String,
}

/// Line match from `grep`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GrepMatch {
    pub uri: String,
    pub line: usize,
    pub content: String,
}
