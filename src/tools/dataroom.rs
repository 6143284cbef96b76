//! In-memory data room: documents with per-page text and summaries,
//! loaded from a JSON fixture.

use crate::approval::collaborators::{DocumentMetadata, DocumentSource};
use crate::approval::types::ToolArgs;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub num: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub legally_significant: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page(&self, num: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.num == num)
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            legally_significant_pages: self
                .pages
                .iter()
                .filter(|p| p.legally_significant)
                .map(|p| p.num)
                .collect(),
            page_summaries: self
                .pages
                .iter()
                .filter(|p| !p.summary.is_empty())
                .map(|p| (p.num, p.summary.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDataRoom {
    #[serde(default)]
    name: Option<String>,
    documents: Vec<Document>,
}

#[derive(Debug, Clone, Default)]
pub struct DataRoom {
    name: String,
    documents: BTreeMap<String, Document>,
}

impl DataRoom {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data room: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid data room file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawDataRoom = serde_json::from_str(json).context("Failed to parse data room JSON")?;
        let mut documents = BTreeMap::new();
        for doc in raw.documents {
            if doc.id.trim().is_empty() {
                bail!("Document '{}' has an empty id", doc.filename);
            }
            if documents.contains_key(&doc.id) {
                bail!("Duplicate document id '{}'", doc.id);
            }
            documents.insert(doc.id.clone(), doc);
        }
        Ok(Self {
            name: raw.name.unwrap_or_else(|| "Data room".to_string()),
            documents,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }

    fn require(&self, doc_id: &str) -> Result<&Document> {
        match self.documents.get(doc_id) {
            Some(doc) => Ok(doc),
            None => bail!("Document '{}' not found in the data room", doc_id),
        }
    }

    /// `list_data_room_documents`
    pub fn list_documents(&self) -> String {
        if self.documents.is_empty() {
            return format!("{} is empty.", self.name);
        }
        let mut out = format!("{} ({} documents):\n", self.name, self.documents.len());
        for doc in self.documents.values() {
            out.push_str(&format!(
                "- {}: {} ({} pages) {}\n",
                doc.id,
                doc.filename,
                doc.pages.len(),
                doc.summary
            ));
        }
        out
    }

    /// `get_documents`: summaries for every page plus the full text of the
    /// legally significant ones.
    pub fn get_documents(&self, args: &ToolArgs) -> Result<String> {
        let ids = string_list(args.get("doc_ids"));
        if ids.is_empty() {
            bail!("get_documents requires a non-empty 'doc_ids' list");
        }
        let mut out = String::new();
        for id in &ids {
            let doc = self.require(id)?;
            out.push_str(&format!("## {} ({})\n{}\n", doc.filename, doc.id, doc.summary));
            for page in &doc.pages {
                out.push_str(&format!("\n[page {}] {}\n", page.num, page.summary));
                if page.legally_significant {
                    out.push_str(&page.text);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        Ok(out)
    }

    /// `get_page_text`
    pub fn get_page_text(&self, args: &ToolArgs) -> Result<String> {
        let doc_id = args
            .get("doc_id")
            .and_then(Value::as_str)
            .context("get_page_text requires 'doc_id'")?;
        let doc = self.require(doc_id)?;
        let nums = page_numbers(args);
        if nums.is_empty() {
            bail!("get_page_text requires 'page_nums'");
        }
        let mut out = String::new();
        for num in nums {
            let Some(page) = doc.page(num) else {
                bail!("Page {} does not exist in '{}' ({} pages)", num, doc.id, doc.pages.len());
            };
            out.push_str(&format!("--- {} page {} ---\n{}\n", doc.filename, page.num, page.text));
        }
        Ok(out)
    }

    /// `analyze_documents`: a digest of the named documents' summaries.
    pub fn analyze_documents(&self, args: &ToolArgs) -> Result<String> {
        let ids = string_list(args.get("document_ids").or_else(|| args.get("doc_ids")));
        if ids.is_empty() {
            bail!("analyze_documents requires 'document_ids'");
        }
        let mut out = String::new();
        if let Some(instructions) = args.get("instructions").and_then(Value::as_str) {
            out.push_str(&format!("Analysis: {}\n\n", instructions));
        }
        for id in &ids {
            let doc = self.require(id)?;
            out.push_str(&format!("{} ({}): {}\n", doc.filename, doc.id, doc.summary));
            let meta = doc.metadata();
            for num in meta.legally_significant_pages {
                if let Some(summary) = meta.page_summaries.get(&num) {
                    out.push_str(&format!("  p{}: {}\n", num, summary));
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentSource for DataRoom {
    async fn document_metadata(&self, doc_id: &str) -> Result<Option<DocumentMetadata>> {
        Ok(self.documents.get(doc_id).map(Document::metadata))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn page_numbers(args: &ToolArgs) -> Vec<u32> {
    let value = args.get("page_nums").or_else(|| args.get("page_num"));
    let to_num = |v: &Value| -> Option<u32> {
        v.as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    };
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(to_num).collect(),
        Some(v) => to_num(v).into_iter().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROOM: &str = r#"{
        "name": "Project Atlas",
        "documents": [
            {"id": "d1", "filename": "lease.pdf", "summary": "Office lease",
             "pages": [
                {"num": 1, "text": "Parties and premises", "summary": "Parties"},
                {"num": 2, "text": "Tenant indemnifies landlord up to $2m", "summary": "Indemnity cap", "legally_significant": true}
             ]},
            {"id": "d2", "filename": "ip.pdf", "summary": "IP assignment", "pages": []}
        ]
    }"#;

    fn args(v: Value) -> ToolArgs {
        match v {
            Value::Object(m) => m,
            _ => panic!("args must be an object"),
        }
    }

    #[test]
    fn test_load_and_list() {
        let room = DataRoom::from_json(ROOM).unwrap();
        assert_eq!(room.len(), 2);
        let listing = room.list_documents();
        assert!(listing.contains("Project Atlas (2 documents)"));
        assert!(listing.contains("d1: lease.pdf (2 pages)"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"documents": [{"id": "a", "filename": "x"}, {"id": "a", "filename": "y"}]}"#;
        assert!(DataRoom::from_json(json).is_err());
    }

    #[test]
    fn test_get_documents_includes_significant_text_only() {
        let room = DataRoom::from_json(ROOM).unwrap();
        let out = room.get_documents(&args(json!({"doc_ids": ["d1"]}))).unwrap();
        assert!(out.contains("Tenant indemnifies landlord"));
        assert!(!out.contains("Parties and premises"));
        assert!(out.contains("[page 1] Parties"));
    }

    #[test]
    fn test_get_page_text() {
        let room = DataRoom::from_json(ROOM).unwrap();
        let out = room
            .get_page_text(&args(json!({"doc_id": "d1", "page_nums": [1]})))
            .unwrap();
        assert!(out.contains("Parties and premises"));

        let err = room
            .get_page_text(&args(json!({"doc_id": "d1", "page_nums": [9]})))
            .unwrap_err();
        assert!(err.to_string().contains("Page 9"));
    }

    #[tokio::test]
    async fn test_metadata_for_context() {
        let room = DataRoom::from_json(ROOM).unwrap();
        let meta = room.document_metadata("d1").await.unwrap().unwrap();
        assert_eq!(meta.legally_significant_pages, vec![2]);
        assert_eq!(meta.page_summaries.get(&2).map(String::as_str), Some("Indemnity cap"));
        assert!(room.document_metadata("nope").await.unwrap().is_none());
    }
}
