// src/tools/documents.rs
//! 로컬 문서 저장소
//!
//! Read-only document access rooted at one directory, exposed as three
//! capabilities: `list_documents`, `read_document` and `search_documents`.
//!
//! # Security Model
//!
//! - Paths are relative to the store root; `..` and `~` are rejected
//! - Symlinks are not followed during traversal
//! - Nothing is ever written

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ToolError;
use crate::gateway::{DynToolProvider, SourceRef, ToolDefinition, ToolOutput, ToolProvider};

/// Largest file the store will read, in bytes
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;

const DEFAULT_READ_LIMIT: usize = 200;

const DEFAULT_MAX_MATCHES: usize = 20;

/// 경로 정규화
/// - 연속된 슬래시, `.` 세그먼트 제거
/// - `..`, `~` 차단
pub fn normalize_relative(path: &str) -> Result<String, ToolError> {
    if path.contains("..") || path.starts_with('~') {
        return Err(ToolError::InvalidArguments(format!(
            "path traversal not allowed: {}",
            path
        )));
    }

    let parts: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    Ok(parts.join("/"))
}

/// Shared root for the document capabilities.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ToolError::Unavailable(format!(
                "document root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All three capabilities over this store.
    pub fn providers(self) -> Vec<DynToolProvider> {
        let store = Arc::new(self);
        vec![
            Arc::new(ListDocumentsTool(store.clone())),
            Arc::new(ReadDocumentTool(store.clone())),
            Arc::new(SearchDocumentsTool(store)),
        ]
    }

    fn resolve(&self, relative: &str) -> Result<(String, PathBuf), ToolError> {
        let normalized = normalize_relative(relative)?;
        let full = if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&normalized)
        };
        Ok((normalized, full))
    }

    fn source_for(relative: &str) -> SourceRef {
        SourceRef::new(format!("doc://{}", relative), relative)
    }

    /// Relative paths of every regular file under `dir`, sorted.
    fn list_sync(&self, dir: &str) -> Result<Vec<String>, ToolError> {
        let (_, base) = self.resolve(dir)?;
        if !base.is_dir() {
            return Err(ToolError::InvalidArguments(format!("not a directory: {}", dir)));
        }

        let mut files: Vec<String> = WalkDir::new(&base)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_sync(&self, relative: &str) -> Result<(String, String), ToolError> {
        let (normalized, full) = self.resolve(relative)?;
        let metadata = std::fs::metadata(&full)
            .map_err(|_| ToolError::InvalidArguments(format!("document not found: {}", relative)))?;
        if !metadata.is_file() {
            return Err(ToolError::InvalidArguments(format!("not a file: {}", relative)));
        }
        if metadata.len() > MAX_FILE_BYTES {
            return Err(ToolError::InvalidArguments(format!(
                "document too large ({} bytes): {}",
                metadata.len(),
                relative
            )));
        }
        let content = std::fs::read_to_string(&full)
            .map_err(|e| ToolError::InvalidArguments(format!("unreadable document {}: {}", relative, e)))?;
        Ok((normalized, content))
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ToolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ToolError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ToolError::Unknown(format!("document task failed: {}", e)))?
}

pub struct ListDocumentsTool(Arc<LocalDocumentStore>);

#[derive(Debug, Deserialize)]
struct ListArgs {
    #[serde(default)]
    directory: String,
}

#[async_trait]
impl ToolProvider for ListDocumentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_documents".to_string(),
            description: "List documents in the local document store.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "Directory relative to the store root (default: root)"
                    }
                }
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: ListArgs = serde_json::from_value(arguments)?;
        let store = self.0.clone();
        let files = blocking(move || store.list_sync(&args.directory)).await?;

        Ok(ToolOutput::structured(serde_json::json!({
            "count": files.len(),
            "documents": files,
        })))
    }
}

pub struct ReadDocumentTool(Arc<LocalDocumentStore>);

#[derive(Debug, Deserialize)]
struct ReadArgs {
    path: String,
    /// 1-based first line
    #[serde(default = "default_offset")]
    offset: usize,
    #[serde(default = "default_read_limit")]
    limit: usize,
}

fn default_offset() -> usize {
    1
}

fn default_read_limit() -> usize {
    DEFAULT_READ_LIMIT
}

#[async_trait]
impl ToolProvider for ReadDocumentTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_document".to_string(),
            description: "Read a document from the local document store. Cite it by its doc:// id.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Document path relative to the store root"},
                    "offset": {"type": "integer", "minimum": 1, "default": 1},
                    "limit": {"type": "integer", "minimum": 1, "default": DEFAULT_READ_LIMIT}
                },
                "required": ["path"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: ReadArgs = serde_json::from_value(arguments)?;
        if args.offset == 0 || args.limit == 0 {
            return Err(ToolError::InvalidArguments("offset and limit start at 1".to_string()));
        }

        let store = self.0.clone();
        let path = args.path.clone();
        let (relative, content) = blocking(move || store.read_sync(&path)).await?;

        let lines: Vec<&str> = content.lines().collect();
        let first = args.offset.min(lines.len().max(1));
        let last = first.saturating_add(args.limit - 1).min(lines.len());
        let body = if lines.is_empty() {
            String::new()
        } else {
            lines[first - 1..last]
                .iter()
                .enumerate()
                .map(|(i, line)| format!("{:>5}\t{}", first + i, line))
                .collect::<Vec<_>>()
                .join("\n")
        };
        debug!(path = %relative, first, last, "Read document");

        let source = LocalDocumentStore::source_for(&relative)
            .with_locator(format!("lines {}-{}", first, last))
            .with_snippet(lines.get(first.saturating_sub(1)).copied().unwrap_or_default());

        Ok(ToolOutput::text(body).with_sources(vec![source]))
    }
}

pub struct SearchDocumentsTool(Arc<LocalDocumentStore>);

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_max_matches")]
    max_matches: usize,
}

fn default_max_matches() -> usize {
    DEFAULT_MAX_MATCHES
}

#[async_trait]
impl ToolProvider for SearchDocumentsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_documents".to_string(),
            description: "Case-insensitive text search across the local document store. Returns matching lines with their locations.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "minLength": 1},
                    "max_matches": {"type": "integer", "minimum": 1, "default": DEFAULT_MAX_MATCHES}
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: SearchArgs = serde_json::from_value(arguments)?;
        let needle = args.query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
        }

        let store = self.0.clone();
        let max_matches = args.max_matches.max(1);
        let matches = blocking(move || {
            let mut found = Vec::new();
            for relative in store.list_sync("")? {
                // Binary or oversized files are skipped rather than failing the search.
                let Ok((_, content)) = store.read_sync(&relative) else {
                    continue;
                };
                for (i, line) in content.lines().enumerate() {
                    if line.to_lowercase().contains(&needle) {
                        found.push((relative.clone(), i + 1, line.trim().to_string()));
                        if found.len() >= max_matches {
                            return Ok(found);
                        }
                    }
                }
            }
            Ok(found)
        })
        .await?;

        if matches.is_empty() {
            return Ok(ToolOutput::text(format!("No documents mention \"{}\".", args.query)));
        }

        let mut text = format!("Found {} matching lines:\n", matches.len());
        let mut sources: Vec<SourceRef> = Vec::new();
        for (relative, line_no, line) in &matches {
            text.push_str(&format!("{}:{}: {}\n", relative, line_no, line));
            let source_id = format!("doc://{}", relative);
            if !sources.iter().any(|s| s.source_id == source_id) {
                sources.push(
                    LocalDocumentStore::source_for(relative)
                        .with_locator(format!("line {}", line_no))
                        .with_snippet(line.clone()),
                );
            }
        }

        Ok(ToolOutput::text(text).with_sources(sources))
    }
}
