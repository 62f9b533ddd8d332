//! Filesystem natives, confined to the context's workspace root.
//!
//! Paths containing `..`, absolute paths, or anything resolving outside
//! the workspace root after canonicalization are rejected.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use cz_domain::error::{Error, Result};
use cz_domain::tool::ToolConfig;

use crate::executor::{ToolContext, ToolExecutor};
use crate::{Tool, ToolSource};

const MAX_SEARCH_RESULTS: usize = 100;
const MAX_SEARCH_FILE_BYTES: u64 = 1_000_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate and resolve a requested path within the workspace root.
fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(Error::Execution(format!(
            "absolute paths are not allowed; use a path relative to the workspace (got '{requested}')"
        )));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::Execution(format!(
                "path '{requested}' contains '..', which is not allowed"
            )));
        }
    }

    let root = workspace_root
        .canonicalize()
        .map_err(|e| Error::Execution(format!("workspace root unavailable: {e}")))?;
    let joined = root.join(requested_path);

    // The target may not exist yet (write_file); check the nearest
    // existing ancestor stays inside the root.
    let mut probe = joined.clone();
    while !probe.exists() {
        match probe.parent() {
            Some(parent) => probe = parent.to_path_buf(),
            None => break,
        }
    }
    let resolved = probe
        .canonicalize()
        .map_err(|e| Error::Execution(format!("resolving '{requested}': {e}")))?;
    if !resolved.starts_with(&root) {
        return Err(Error::Execution(format!(
            "path '{requested}' resolves outside the workspace"
        )));
    }

    Ok(joined)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn read_file_tool() -> Tool {
    let config = ToolConfig::new("read_file", "Read a text file from the workspace.")
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "offset": {"type": "integer", "minimum": 0, "description": "Start line (0-based)"},
                "limit": {"type": "integer", "minimum": 1, "description": "Max lines to return"}
            },
            "required": ["path"]
        }));
    Tool::new(config, ToolSource::Native, Arc::new(ReadFile))
}

pub fn write_file_tool() -> Tool {
    let config = ToolConfig::new(
        "write_file",
        "Write a text file in the workspace, creating parent directories.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "path": {"type": "string"},
            "content": {"type": "string"}
        },
        "required": ["path", "content"]
    }));
    Tool::new(config, ToolSource::Native, Arc::new(WriteFile))
}

pub fn list_directory_tool() -> Tool {
    let config = ToolConfig::new("list_directory", "List a workspace directory.")
        .with_input_schema(json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path, defaults to '.'"}
            }
        }));
    Tool::new(config, ToolSource::Native, Arc::new(ListDirectory))
}

pub fn search_files_tool() -> Tool {
    let config = ToolConfig::new(
        "search_files",
        "Search workspace files for a regex pattern, returning matching lines.",
    )
    .with_input_schema(json!({
        "type": "object",
        "properties": {
            "pattern": {"type": "string", "description": "Regular expression"},
            "path": {"type": "string", "description": "Subdirectory to search, defaults to '.'"},
            "maxResults": {"type": "integer", "minimum": 1}
        },
        "required": ["pattern"]
    }));
    Tool::new(config, ToolSource::Native, Arc::new(SearchFiles))
}

struct ReadFile;

#[async_trait::async_trait]
impl ToolExecutor for ReadFile {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let path_arg = required_str(&args, "path")?;
        let path = validate_path(&ctx.workspace_root, path_arg)?;

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Execution(format!("reading '{path_arg}': {e}")))?;

        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = args.get("limit").and_then(Value::as_u64).map(|n| n as usize);
        let total_lines = raw.lines().count();

        let content: String = match limit {
            Some(limit) => raw
                .lines()
                .skip(offset)
                .take(limit)
                .collect::<Vec<_>>()
                .join("\n"),
            None if offset > 0 => raw.lines().skip(offset).collect::<Vec<_>>().join("\n"),
            None => raw,
        };

        Ok(json!({
            "path": path_arg,
            "content": content,
            "totalLines": total_lines,
        }))
    }
}

struct WriteFile;

#[async_trait::async_trait]
impl ToolExecutor for WriteFile {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let path_arg = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let path = validate_path(&ctx.workspace_root, path_arg)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Execution(format!("creating directories: {e}")))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| Error::Execution(format!("writing '{path_arg}': {e}")))?;

        Ok(json!({"path": path_arg, "bytesWritten": content.len()}))
    }
}

struct ListDirectory;

#[async_trait::async_trait]
impl ToolExecutor for ListDirectory {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let path_arg = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = validate_path(&ctx.workspace_root, path_arg)?;

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| Error::Execution(format!("listing '{path_arg}': {e}")))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Error::Execution(e.to_string()))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| Error::Execution(e.to_string()))?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "size": meta.len(),
                "isDir": meta.is_dir(),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(json!({"path": path_arg, "entries": entries}))
    }
}

struct SearchFiles;

#[async_trait::async_trait]
impl ToolExecutor for SearchFiles {
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let pattern = required_str(&args, "pattern")?;
        let regex = regex::Regex::new(pattern)
            .map_err(|e| Error::Execution(format!("invalid pattern: {e}")))?;
        let path_arg = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let max_results = args
            .get("maxResults")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(MAX_SEARCH_RESULTS);

        let root = validate_path(&ctx.workspace_root, path_arg)?;
        let mut matches = Vec::new();
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            if matches.len() >= max_results {
                break;
            }
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if matches.len() >= max_results {
                    break;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let entry_path = entry.path();
                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                if meta.is_dir() {
                    stack.push(entry_path);
                    continue;
                }
                if meta.len() > MAX_SEARCH_FILE_BYTES {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&entry_path) else {
                    continue;
                };
                let rel = entry_path
                    .strip_prefix(&root)
                    .unwrap_or(&entry_path)
                    .to_string_lossy()
                    .into_owned();
                for (line_no, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        matches.push(json!({
                            "file": rel,
                            "line": line_no + 1,
                            "text": line,
                        }));
                        if matches.len() >= max_results {
                            break;
                        }
                    }
                }
            }
        }

        Ok(json!({
            "pattern": pattern,
            "matches": matches,
            "truncated": matches.len() >= max_results,
        }))
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Execution(format!("missing required argument '{key}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_store::Db;

    fn ctx(root: &Path) -> ToolContext {
        ToolContext::new(Arc::new(Db::in_memory()), "t1", "A1").with_workspace_root(root)
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());

        write_file_tool()
            .execute(json!({"path": "notes/hello.txt", "content": "line1\nline2"}), &ctx)
            .await
            .unwrap();

        let out = read_file_tool()
            .execute(json!({"path": "notes/hello.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out["content"], "line1\nline2");
        assert_eq!(out["totalLines"], 2);
    }

    #[tokio::test]
    async fn read_supports_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        write_file_tool()
            .execute(json!({"path": "f.txt", "content": "a\nb\nc\nd"}), &ctx)
            .await
            .unwrap();

        let out = read_file_tool()
            .execute(json!({"path": "f.txt", "offset": 1, "limit": 2}), &ctx)
            .await
            .unwrap();
        assert_eq!(out["content"], "b\nc");
    }

    #[tokio::test]
    async fn escapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        for path in ["../outside.txt", "/etc/passwd"] {
            let err = read_file_tool()
                .execute(json!({"path": path}), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Execution(_)), "{path} should be rejected");
        }
    }

    #[tokio::test]
    async fn search_finds_matching_lines() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        write_file_tool()
            .execute(json!({"path": "src/a.txt", "content": "alpha\nneedle here\nomega"}), &ctx)
            .await
            .unwrap();

        let out = search_files_tool()
            .execute(json!({"pattern": "needle"}), &ctx)
            .await
            .unwrap();
        let matches = out["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["line"], 2);
    }

    #[tokio::test]
    async fn list_directory_sorts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        for name in ["b.txt", "a.txt"] {
            write_file_tool()
                .execute(json!({"path": name, "content": "x"}), &ctx)
                .await
                .unwrap();
        }
        let out = list_directory_tool().execute(json!({}), &ctx).await.unwrap();
        let names: Vec<&str> = out["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
