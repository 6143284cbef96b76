//! Read-only interfaces the context builder pulls metadata through.
//!
//! The data room, the agent's file workspace and the todo board live
//! elsewhere; the approval flow only ever asks them small questions.

use crate::approval::types::Todo;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Lightweight per-document metadata, never full page text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub legally_significant_pages: Vec<u32>,
    pub page_summaries: BTreeMap<u32, String>,
}

/// What the workspace knows about a file path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileState {
    pub exists: bool,
    /// Bounded preview of the current content, if any
    pub preview: Option<String>,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// `Ok(None)` when the document doesn't exist.
    async fn document_metadata(&self, doc_id: &str) -> Result<Option<DocumentMetadata>>;
}

#[async_trait]
pub trait FileSource: Send + Sync {
    async fn file_state(&self, path: &str) -> Result<FileState>;
}

#[async_trait]
pub trait TaskList: Send + Sync {
    async fn task_list(&self) -> Vec<Todo>;
}
