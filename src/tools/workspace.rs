//! The agent's scratch filesystem. Files live in memory for the session.

use crate::approval::collaborators::{FileSource, FileState};
use crate::approval::types::ToolArgs;
use crate::utils::text::{normalize_path, preview};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

const STATE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Default)]
pub struct Workspace {
    files: RwLock<BTreeMap<String, String>>,
}

fn path_arg(args: &ToolArgs) -> Result<String> {
    let path = args
        .get("file_path")
        .or_else(|| args.get("path"))
        .and_then(Value::as_str)
        .context("missing 'file_path'")?;
    let path = normalize_path(path);
    if path.is_empty() {
        bail!("file path is empty");
    }
    Ok(path)
}

fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing '{}'", key))
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: &str, content: impl Into<String>) {
        self.files
            .write()
            .await
            .insert(normalize_path(path), content.into());
    }

    pub async fn contents(&self, path: &str) -> Option<String> {
        self.files.read().await.get(&normalize_path(path)).cloned()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.files.read().await.keys().cloned().collect()
    }

    /// `read_file`
    pub async fn read_file(&self, args: &ToolArgs) -> Result<String> {
        let path = path_arg(args)?;
        match self.files.read().await.get(&path) {
            Some(content) => Ok(content.clone()),
            None => bail!("File '{}' does not exist", path),
        }
    }

    /// `write_file`: create or overwrite.
    pub async fn write_file(&self, args: &ToolArgs) -> Result<String> {
        let path = path_arg(args)?;
        let content = str_arg(args, "content")?;
        let previous = self
            .files
            .write()
            .await
            .insert(path.clone(), content.to_string());
        Ok(match previous {
            Some(_) => format!("Overwrote {} ({} chars)", path, content.chars().count()),
            None => format!("Created {} ({} chars)", path, content.chars().count()),
        })
    }

    /// `edit_file`: replace `old_string` with `new_string`. The old string
    /// must occur exactly once unless `replace_all` is set.
    pub async fn edit_file(&self, args: &ToolArgs) -> Result<String> {
        let path = path_arg(args)?;
        let old = str_arg(args, "old_string")?;
        let new = str_arg(args, "new_string")?;
        let replace_all = args
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if old.is_empty() {
            bail!("'old_string' must not be empty");
        }

        let mut files = self.files.write().await;
        let Some(content) = files.get_mut(&path) else {
            bail!("File '{}' does not exist", path);
        };
        let occurrences = content.matches(old).count();
        match occurrences {
            0 => bail!("'old_string' not found in {}", path),
            1 => {}
            n if !replace_all => {
                bail!("'old_string' occurs {} times in {}; pass replace_all or a longer string", n, path)
            }
            _ => {}
        }
        *content = content.replace(old, new);
        Ok(format!("Edited {} ({} replacement(s))", path, occurrences))
    }
}

#[async_trait]
impl FileSource for Workspace {
    async fn file_state(&self, path: &str) -> Result<FileState> {
        let files = self.files.read().await;
        Ok(match files.get(&normalize_path(path)) {
            Some(content) => FileState {
                exists: true,
                preview: Some(preview(content, STATE_PREVIEW_CHARS)),
            },
            None => FileState::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> ToolArgs {
        match v {
            Value::Object(m) => m,
            _ => panic!("args must be an object"),
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let ws = Workspace::new();
        let out = ws
            .write_file(&args(json!({"file_path": "/notes.md", "content": "hello"})))
            .await
            .unwrap();
        assert!(out.starts_with("Created notes.md"));
        assert_eq!(
            ws.read_file(&args(json!({"path": "notes.md"}))).await.unwrap(),
            "hello"
        );
        assert!(ws.file_state("./notes.md").await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_edit_requires_unique_match() {
        let ws = Workspace::new();
        ws.insert("a.md", "cap cap").await;
        let err = ws
            .edit_file(&args(json!({"file_path": "a.md", "old_string": "cap", "new_string": "limit"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("occurs 2 times"));

        ws.edit_file(&args(json!({
            "file_path": "a.md", "old_string": "cap", "new_string": "limit", "replace_all": true
        })))
        .await
        .unwrap();
        assert_eq!(ws.contents("a.md").await.unwrap(), "limit limit");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let ws = Workspace::new();
        assert!(ws.read_file(&args(json!({"file_path": "x"}))).await.is_err());
        assert!(!ws.file_state("x").await.unwrap().exists);
    }
}
