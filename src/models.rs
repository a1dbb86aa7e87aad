//! Core data models used throughout Doc Shelf.
//!
//! These types represent the per-document records, the denormalized catalog
//! index, and the shelves that organize documents. All persisted types
//! default missing fields on deserialization instead of rejecting, so index
//! files written by older versions keep loading.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved identifier for the virtual Unsorted shelf. Never persisted.
pub const UNSORTED_SHELF_ID: &str = "__unsorted__";
pub const UNSORTED_SHELF_NAME: &str = "Unsorted";
pub const UNSORTED_SHELF_NAME_JA: &str = "未分類";

/// Schema version written to new index files.
pub const INDEX_VERSION: u32 = 1;

/// Metadata pulled out of a source file (PDF Info dictionary or EML headers).
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub creator: String,
    pub creation_date: String,
}

/// Output of the extraction seam: raw text plus metadata, before any
/// enrichment or persistence.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub page_count: u32,
    pub source_path: PathBuf,
    pub char_count: usize,
}

/// Full per-document record persisted as `json/<document_id>.json`.
///
/// `document_id` is assigned once at creation and never changes;
/// `uploaded_date` is immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub uploaded_date: String,
    #[serde(default)]
    pub source_name: String,
    /// Path to the archived original. Legacy deployments may store the
    /// original upload path here instead of `pdfs/<id>.pdf`.
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub char_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub readers_used: Vec<String>,
    /// Reader name → structured reading output. Opaque to the core beyond
    /// tag extraction and one-level search.
    #[serde(default)]
    pub readings: serde_json::Map<String, Value>,
}

/// Lightweight projection of a [`DocumentRecord`] stored in the catalog
/// index, plus the document's shelf membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub uploaded_date: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub char_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub readers_used: Vec<String>,
    /// Shelf ids this document belongs to. Empty means Unsorted.
    #[serde(default)]
    pub shelves: Vec<String>,
}

impl DocumentSummary {
    /// Projects a full record into an index entry with the given membership.
    pub fn from_record(record: &DocumentRecord, shelves: Vec<String>) -> Self {
        DocumentSummary {
            document_id: record.document_id.clone(),
            title: record.title.clone(),
            source_type: record.source_type.clone(),
            author: record.author.clone(),
            subject: record.subject.clone(),
            uploaded_date: record.uploaded_date.clone(),
            page_count: record.page_count,
            char_count: record.char_count,
            tags: record.tags.clone(),
            readers_used: record.readers_used.clone(),
            shelves,
        }
    }
}

/// A user-created shelf, persisted in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shelf {
    pub shelf_id: String,
    pub name: String,
    #[serde(default)]
    pub name_ja: String,
    #[serde(default)]
    pub created_at: String,
}

/// A shelf annotated with its live document count, as returned by listings.
/// The virtual Unsorted shelf is synthesized with `is_virtual: true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfInfo {
    pub shelf_id: String,
    pub name: String,
    #[serde(default)]
    pub name_ja: String,
    #[serde(default)]
    pub created_at: String,
    pub document_count: usize,
    pub is_virtual: bool,
}

impl ShelfInfo {
    pub fn unsorted(document_count: usize) -> Self {
        ShelfInfo {
            shelf_id: UNSORTED_SHELF_ID.to_string(),
            name: UNSORTED_SHELF_NAME.to_string(),
            name_ja: UNSORTED_SHELF_NAME_JA.to_string(),
            created_at: String::new(),
            document_count,
            is_virtual: true,
        }
    }

    pub fn from_shelf(shelf: &Shelf, document_count: usize) -> Self {
        ShelfInfo {
            shelf_id: shelf.shelf_id.clone(),
            name: shelf.name.clone(),
            name_ja: shelf.name_ja.clone(),
            created_at: shelf.created_at.clone(),
            document_count,
            is_virtual: false,
        }
    }
}

/// The denormalized catalog index persisted as `index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIndex {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub shelves: Vec<Shelf>,
    #[serde(default)]
    pub documents: Vec<DocumentSummary>,
}

fn default_version() -> u32 {
    INDEX_VERSION
}

impl LibraryIndex {
    /// A fresh empty index, used when no index exists or the persisted one
    /// is unparseable.
    pub fn empty() -> Self {
        LibraryIndex {
            version: INDEX_VERSION,
            updated_at: chrono::Utc::now().to_rfc3339(),
            shelves: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn find_document(&self, document_id: &str) -> Option<&DocumentSummary> {
        self.documents
            .iter()
            .find(|d| d.document_id == document_id)
    }

    pub fn find_document_mut(&mut self, document_id: &str) -> Option<&mut DocumentSummary> {
        self.documents
            .iter_mut()
            .find(|d| d.document_id == document_id)
    }

    pub fn find_shelf(&self, shelf_id: &str) -> Option<&Shelf> {
        self.shelves.iter().find(|s| s.shelf_id == shelf_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_on_load() {
        let json = r#"{
            "version": 1,
            "shelves": [],
            "documents": [{"document_id": "report"}]
        }"#;
        let index: LibraryIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.documents.len(), 1);
        let doc = &index.documents[0];
        assert_eq!(doc.document_id, "report");
        assert!(doc.shelves.is_empty());
        assert!(doc.tags.is_empty());
        assert_eq!(doc.page_count, 0);
    }

    #[test]
    fn record_round_trips_field_for_field() {
        let mut readings = serde_json::Map::new();
        readings.insert(
            "claude".to_string(),
            serde_json::json!({"summary": "a test", "tags": ["x"]}),
        );
        let record = DocumentRecord {
            document_id: "invoice-2024".to_string(),
            title: "Invoice 2024".to_string(),
            source_type: "pdf".to_string(),
            author: "Acme".to_string(),
            subject: "billing".to_string(),
            creator: "LaTeX".to_string(),
            creation_date: "D:20240101".to_string(),
            uploaded_date: "2024-06-01".to_string(),
            source_name: "invoice.pdf".to_string(),
            source_file: Some("pdfs/invoice-2024.pdf".to_string()),
            page_count: 3,
            char_count: 1200,
            tags: vec!["billing".to_string()],
            readers_used: vec!["claude".to_string()],
            readings,
        };
        let json = serde_json::to_string_pretty(&record).unwrap();
        let back: DocumentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn non_ascii_preserved_in_serialized_index() {
        let mut index = LibraryIndex::empty();
        index.shelves.push(Shelf {
            shelf_id: "finance".to_string(),
            name: "Finance".to_string(),
            name_ja: "財務".to_string(),
            created_at: String::new(),
        });
        let json = serde_json::to_string_pretty(&index).unwrap();
        assert!(json.contains("財務"));
        assert!(!json.contains("\\u"));
    }
}
