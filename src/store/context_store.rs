//! In-memory context tree with relations and sessions

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::uri;
use crate::error::{Error, Result};
use crate::types::{Entry, FindHit, GrepMatch, Message, Pack, PackFile, Relation, Session};

const SNIPPET_LEN: usize = 160;
const SESSION_ROLES: &[&str] = &["user", "assistant", "system"];

/// Context store keyed by normalised `viking://` URI.
///
/// Lock order is always `entries` before `relations`.
pub struct ContextStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    relations: RwLock<HashMap<String, Vec<Relation>>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(uri::SCHEME.to_string(), Entry::dir(uri::SCHEME.to_string()));
        Self {
            entries: RwLock::new(entries),
            relations: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Write a file, creating missing parent directories
    pub async fn add_resource(&self, target: &str, content: String) -> Result<Entry> {
        let target = uri::normalize(target)?;
        if uri::is_root(&target) {
            return Err(Error::InvalidArgument("cannot write to the root".into()));
        }

        let mut entries = self.entries.write().await;
        ensure_dirs(&mut entries, &uri::ancestors(&target))?;

        let entry = match entries.get_mut(&target) {
            Some(existing) if existing.is_dir() => {
                return Err(Error::AlreadyExists(format!("{} is a directory", target)));
            }
            Some(existing) => {
                existing.size = content.len();
                existing.content = content;
                existing.updated_at = Utc::now();
                existing.clone()
            }
            None => {
                let entry = Entry::file(target.clone(), content);
                entries.insert(target.clone(), entry.clone());
                entry
            }
        };

        tracing::debug!("Stored resource {}", entry.uri);
        Ok(entry)
    }

    /// Files below `under` (default: root)
    pub async fn list_resources(&self, under: Option<&str>) -> Result<Vec<Entry>> {
        let base = uri::normalize(under.unwrap_or(uri::SCHEME))?;
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| !e.is_dir() && uri::is_descendant(&e.uri, &base))
            .cloned()
            .collect())
    }

    pub async fn mkdir(&self, target: &str) -> Result<Entry> {
        let target = uri::normalize(target)?;
        let mut entries = self.entries.write().await;
        let mut chain = uri::ancestors(&target);
        chain.push(target.clone());
        ensure_dirs(&mut entries, &chain)?;
        entries
            .get(&target)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("directory vanished: {}", target)))
    }

    pub async fn stat(&self, target: &str) -> Result<Entry> {
        let target = uri::normalize(target)?;
        let entries = self.entries.read().await;
        entries
            .get(&target)
            .cloned()
            .ok_or(Error::NotFound(target))
    }

    /// Direct children of a directory, sorted by URI
    pub async fn ls(&self, target: &str) -> Result<Vec<Entry>> {
        let target = uri::normalize(target)?;
        let entries = self.entries.read().await;
        let dir = entries
            .get(&target)
            .ok_or_else(|| Error::NotFound(target.clone()))?;
        if !dir.is_dir() {
            return Err(Error::InvalidArgument(format!("{} is not a directory", target)));
        }

        Ok(entries
            .values()
            .filter(|e| uri::parent(&e.uri).as_deref() == Some(target.as_str()))
            .cloned()
            .collect())
    }

    pub async fn read(&self, target: &str) -> Result<String> {
        let target = uri::normalize(target)?;
        let entries = self.entries.read().await;
        match entries.get(&target) {
            Some(entry) if entry.is_dir() => Err(Error::InvalidArgument(format!(
                "{} is a directory",
                target
            ))),
            Some(entry) => Ok(entry.content.clone()),
            None => Err(Error::NotFound(target)),
        }
    }

    /// One-line summary: first non-empty line of a file, or a child count for a directory
    pub async fn abstract_of(&self, target: &str) -> Result<String> {
        let target = uri::normalize(target)?;
        let entries = self.entries.read().await;
        let entry = entries
            .get(&target)
            .ok_or_else(|| Error::NotFound(target.clone()))?;

        if entry.is_dir() {
            let children = entries
                .keys()
                .filter(|k| uri::parent(k).as_deref() == Some(target.as_str()))
                .count();
            return Ok(format!("Directory {} with {} entries", target, children));
        }

        Ok(entry
            .content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| truncate(line, SNIPPET_LEN))
            .unwrap_or_default())
    }

    /// Remove an entry. Non-empty directories need `recursive`.
    /// Returns the removed URIs.
    pub async fn rm(&self, target: &str, recursive: bool) -> Result<Vec<String>> {
        let target = uri::normalize(target)?;
        if uri::is_root(&target) {
            return Err(Error::InvalidArgument("cannot remove the root".into()));
        }

        let mut entries = self.entries.write().await;
        if !entries.contains_key(&target) {
            return Err(Error::NotFound(target));
        }

        let descendants: Vec<String> = entries
            .keys()
            .filter(|k| uri::is_descendant(k, &target))
            .cloned()
            .collect();
        if !descendants.is_empty() && !recursive {
            return Err(Error::FailedPrecondition(format!(
                "{} is not empty; pass recursive=true",
                target
            )));
        }

        let mut removed = vec![target.clone()];
        removed.extend(descendants);
        for key in &removed {
            entries.remove(key);
        }

        let mut relations = self.relations.write().await;
        relations.retain(|from, _| !removed.contains(from));
        for links in relations.values_mut() {
            links.retain(|r| !removed.contains(&r.uri));
        }

        tracing::debug!("Removed {} entries under {}", removed.len(), target);
        Ok(removed)
    }

    /// Move an entry and its subtree
    pub async fn mv(&self, from: &str, to: &str) -> Result<Entry> {
        let from = uri::normalize(from)?;
        let to = uri::normalize(to)?;
        if uri::is_root(&from) || uri::is_root(&to) {
            return Err(Error::InvalidArgument("cannot move the root".into()));
        }
        if uri::is_descendant(&to, &from) {
            return Err(Error::InvalidArgument(format!(
                "cannot move {} into itself",
                from
            )));
        }

        let mut entries = self.entries.write().await;
        if !entries.contains_key(&from) {
            return Err(Error::NotFound(from));
        }
        if entries.contains_key(&to) {
            return Err(Error::AlreadyExists(to));
        }
        ensure_dirs(&mut entries, &uri::ancestors(&to))?;

        let moved: Vec<String> = entries
            .keys()
            .filter(|k| **k == from || uri::is_descendant(k, &from))
            .cloned()
            .collect();
        let rename = |old: &str| format!("{}{}", to, &old[from.len()..]);

        for old in &moved {
            if let Some(mut entry) = entries.remove(old) {
                entry.uri = rename(old);
                entry.updated_at = Utc::now();
                entries.insert(entry.uri.clone(), entry);
            }
        }

        let mut relations = self.relations.write().await;
        for old in &moved {
            if let Some(links) = relations.remove(old) {
                relations.insert(rename(old), links);
            }
        }
        for links in relations.values_mut() {
            for link in links.iter_mut() {
                if moved.contains(&link.uri) {
                    link.uri = rename(&link.uri);
                }
            }
        }

        entries
            .get(&to)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("moved entry vanished: {}", to)))
    }

    /// Rank files by case-insensitive term occurrences
    pub async fn find(&self, query: &str, target: Option<&str>, limit: usize) -> Result<Vec<FindHit>> {
        let base = uri::normalize(target.unwrap_or(uri::SCHEME))?;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Err(Error::InvalidArgument("query is empty".into()));
        }

        let entries = self.entries.read().await;
        let mut hits: Vec<FindHit> = entries
            .values()
            .filter(|e| !e.is_dir() && (e.uri == base || uri::is_descendant(&e.uri, &base)))
            .filter_map(|e| {
                let haystack = e.content.to_lowercase();
                let score: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
                if score == 0 {
                    return None;
                }
                Some(FindHit {
                    uri: e.uri.clone(),
                    score: score as f32,
                    snippet: snippet_around(&e.content, &haystack, &terms[0]),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.uri.cmp(&b.uri))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Lines containing `pattern` in files at or below `target`
    pub async fn grep(&self, target: &str, pattern: &str, case_insensitive: bool) -> Result<Vec<GrepMatch>> {
        let base = uri::normalize(target)?;
        if pattern.is_empty() {
            return Err(Error::InvalidArgument("pattern is empty".into()));
        }
        let needle = if case_insensitive {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };

        let entries = self.entries.read().await;
        if !entries.contains_key(&base) {
            return Err(Error::NotFound(base));
        }

        let mut matches = Vec::new();
        for entry in entries
            .values()
            .filter(|e| !e.is_dir() && (e.uri == base || uri::is_descendant(&e.uri, &base)))
        {
            for (idx, line) in entry.content.lines().enumerate() {
                let hit = if case_insensitive {
                    line.to_lowercase().contains(&needle)
                } else {
                    line.contains(&needle)
                };
                if hit {
                    matches.push(GrepMatch {
                        uri: entry.uri.clone(),
                        line: idx + 1,
                        content: line.to_string(),
                    });
                }
            }
        }
        Ok(matches)
    }

    /// File URIs below `target` whose relative path matches `pattern`
    pub async fn glob(&self, pattern: &str, target: Option<&str>) -> Result<Vec<String>> {
        let base = uri::normalize(target.unwrap_or(uri::SCHEME))?;
        let pattern = uri::compile_glob(pattern)?;

        // Matching runs on a snapshot so writers are not held up
        let candidates: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .values()
                .filter(|e| !e.is_dir() && uri::is_descendant(&e.uri, &base))
                .map(|e| e.uri.clone())
                .collect()
        };

        Ok(candidates
            .into_iter()
            .filter(|u| uri::glob_matches(&pattern, uri::relative(u, &base)))
            .collect())
    }

    /// Files at or below `target` with paths relative to it
    pub async fn export_pack(&self, target: &str) -> Result<Pack> {
        let base = uri::normalize(target)?;
        let entries = self.entries.read().await;
        let root = entries
            .get(&base)
            .ok_or_else(|| Error::NotFound(base.clone()))?;

        let files = if root.is_dir() {
            entries
                .values()
                .filter(|e| !e.is_dir() && uri::is_descendant(&e.uri, &base))
                .map(|e| PackFile {
                    path: uri::relative(&e.uri, &base).to_string(),
                    content: e.content.clone(),
                })
                .collect()
        } else {
            let name = base.rsplit('/').next().unwrap_or_default().to_string();
            vec![PackFile {
                path: name,
                content: root.content.clone(),
            }]
        };

        Ok(Pack { uri: base, files })
    }

    /// Write every pack file below `target`. Paths are validated before
    /// anything is written. Returns the written URIs.
    pub async fn import_pack(&self, target: &str, files: Vec<PackFile>) -> Result<Vec<String>> {
        let base = uri::normalize(target)?;
        if files.is_empty() {
            return Err(Error::InvalidArgument("pack has no files".into()));
        }

        let mut planned = Vec::with_capacity(files.len());
        for file in files {
            let joined = if uri::is_root(&base) {
                format!("{}{}", base, file.path)
            } else {
                format!("{}/{}", base, file.path)
            };
            let dest = uri::normalize(&joined)?;
            if dest == base {
                return Err(Error::InvalidArgument("pack file path is empty".into()));
            }
            planned.push((dest, file.content));
        }

        let mut written = Vec::with_capacity(planned.len());
        for (dest, content) in planned {
            written.push(self.add_resource(&dest, content).await?.uri);
        }
        tracing::debug!("Imported {} files into {}", written.len(), base);
        Ok(written)
    }

    /// Link `from` to every URI in `to`. Existing links are updated in place.
    pub async fn link(&self, from: &str, to: &[String], reason: &str) -> Result<Vec<Relation>> {
        let from = uri::normalize(from)?;
        let targets = to
            .iter()
            .map(|t| uri::normalize(t))
            .collect::<Result<Vec<_>>>()?;
        if targets.is_empty() {
            return Err(Error::InvalidArgument("no target URIs given".into()));
        }

        let entries = self.entries.read().await;
        for u in std::iter::once(&from).chain(targets.iter()) {
            if !entries.contains_key(u) {
                return Err(Error::NotFound(u.clone()));
            }
        }

        let mut relations = self.relations.write().await;
        let links = relations.entry(from).or_default();
        for target in targets {
            match links.iter_mut().find(|r| r.uri == target) {
                Some(existing) => existing.reason = reason.to_string(),
                None => links.push(Relation {
                    uri: target,
                    reason: reason.to_string(),
                }),
            }
        }
        Ok(links.clone())
    }

    pub async fn unlink(&self, from: &str, to: &str) -> Result<()> {
        let from = uri::normalize(from)?;
        let to = uri::normalize(to)?;
        let mut relations = self.relations.write().await;
        let links = relations
            .get_mut(&from)
            .ok_or_else(|| Error::NotFound(format!("no relations from {}", from)))?;
        let before = links.len();
        links.retain(|r| r.uri != to);
        if links.len() == before {
            return Err(Error::NotFound(format!("no relation {} -> {}", from, to)));
        }
        if links.is_empty() {
            relations.remove(&from);
        }
        Ok(())
    }

    pub async fn relations(&self, target: &str) -> Result<Vec<Relation>> {
        let target = uri::normalize(target)?;
        let relations = self.relations.read().await;
        Ok(relations.get(&target).cloned().unwrap_or_default())
    }

    pub async fn create_session(&self) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        tracing::debug!("Created session {}", session.id);
        session
    }

    /// All sessions, oldest first
    pub async fn list_sessions(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))
    }

    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))
    }

    pub async fn add_message(&self, id: Uuid, role: &str, content: String) -> Result<Session> {
        if !SESSION_ROLES.contains(&role) {
            return Err(Error::InvalidArgument(format!(
                "role must be one of {}",
                SESSION_ROLES.join(", ")
            )));
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("session {}", id)))?;
        session.messages.push(Message {
            role: role.to_string(),
            content,
            created_at: Utc::now(),
        });
        Ok(session.clone())
    }

    /// Counts for status endpoints: (entries, relations, sessions)
    pub async fn counts(&self) -> (usize, usize, usize) {
        let entries = self.entries.read().await.len();
        let relations: usize = self.relations.read().await.values().map(Vec::len).sum();
        let sessions = self.sessions.read().await.len();
        (entries, relations, sessions)
    }
}

/// Create each directory in `chain` (root first); a file in the way is an error
fn ensure_dirs(entries: &mut BTreeMap<String, Entry>, chain: &[String]) -> Result<()> {
    for dir in chain {
        match entries.get(dir) {
            Some(existing) if !existing.is_dir() => {
                return Err(Error::AlreadyExists(format!("{} is a file", dir)));
            }
            Some(_) => {}
            None => {
                entries.insert(dir.clone(), Entry::dir(dir.clone()));
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Line containing the first occurrence of `term`
fn snippet_around(content: &str, lowered: &str, term: &str) -> String {
    let line_idx = lowered
        .lines()
        .position(|line| line.contains(term))
        .unwrap_or(0);
    content
        .lines()
        .nth(line_idx)
        .map(|line| truncate(line.trim(), SNIPPET_LEN))
        .unwrap_or_default()
}
