//! The catalog index: a single denormalized `index.json` listing every
//! document summary and every shelf.
//!
//! [`Library`] is the authority for shelf existence and membership. All
//! mutations are read-entire-file → modify → write-entire-file, serialized
//! behind one in-process lock so concurrent ingests cannot drop each other's
//! updates. Cross-process writers are out of scope (single-process, local
//! filesystem deployment).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, ShelfError};
use crate::models::{DocumentSummary, ExtractedDocument, LibraryIndex, UNSORTED_SHELF_ID};
use crate::store::{write_atomic, DocumentStore};

/// A document library rooted at a directory, combining the catalog index
/// with the per-document record store.
pub struct Library {
    root: PathBuf,
    store: DocumentStore,
    /// Serializes every index read-modify-write sequence (and document id
    /// reservation, which must be atomic with the subsequent create).
    write_lock: Mutex<()>,
}

impl Library {
    /// Opens (and creates, if needed) a library at the given root.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| ShelfError::storage(format!("creating {}", root.display()), e))?;
        Ok(Library {
            store: DocumentStore::new(&root),
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// Loads the catalog index. A missing, empty, or unparseable file yields
    /// a fresh empty index. Any other read failure (permissions, I/O) is a
    /// `Storage` error: a transient fault must not look like an empty
    /// catalog, or the next save would wipe every shelf and membership.
    /// Missing optional fields on entries are defaulted by the model types.
    pub fn load_index(&self) -> Result<LibraryIndex> {
        let path = self.index_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<LibraryIndex>(&content) {
                Ok(index) => Ok(index),
                Err(e) => {
                    warn!("index file unparseable, starting fresh: {}", e);
                    Ok(LibraryIndex::empty())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LibraryIndex::empty()),
            Err(e) => Err(ShelfError::storage(format!("reading {}", path.display()), e)),
        }
    }

    /// Stamps `updated_at` and persists the full index atomically.
    pub(crate) fn save_index(&self, index: &mut LibraryIndex) -> Result<()> {
        index.updated_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(index)
            .map_err(|e| ShelfError::storage("serializing index", e))?;
        write_atomic(&self.index_path(), &json)
            .map_err(|e| ShelfError::storage("writing index", e))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        // A poisoned lock means another thread panicked mid-update; the
        // index on disk is still consistent (writes are atomic), so recover.
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Saves an extracted document and registers it in the index as one
    /// locked sequence: id reservation, record/artifact writes, and the
    /// index upsert cannot interleave with another in-process writer.
    ///
    /// `shelves` validation: every id must name an existing shelf; the
    /// reserved Unsorted id is filtered out rather than rejected.
    pub fn ingest_document(
        &self,
        document: &ExtractedDocument,
        source_name: &str,
        readings: serde_json::Map<String, Value>,
        shelves: Option<Vec<String>>,
    ) -> Result<String> {
        let _guard = self.lock();

        let mut index = self.load_index()?;
        let shelves = match shelves {
            Some(ids) => Some(clean_shelf_ids(&index, ids)?),
            None => None,
        };

        let document_id = self.store.save_extracted(document, source_name, readings)?;
        let record = self.store.read(&document_id)?;
        let summary = DocumentSummary::from_record(&record, shelves.unwrap_or_default());
        upsert_summary(&mut index, summary, true);
        self.save_index(&mut index)?;
        Ok(document_id)
    }

    /// Re-projects a record into the index. If the entry exists its shelf
    /// membership is preserved unless `shelves_override` is supplied;
    /// otherwise the summary is appended. Insertion order of unrelated
    /// entries is untouched.
    pub fn upsert_document_summary(
        &self,
        document_id: &str,
        shelves_override: Option<Vec<String>>,
    ) -> Result<()> {
        let _guard = self.lock();
        let record = self.store.read(document_id)?;
        let mut index = self.load_index()?;
        let override_given = shelves_override.is_some();
        let summary = DocumentSummary::from_record(&record, shelves_override.unwrap_or_default());
        upsert_summary(&mut index, summary, override_given);
        self.save_index(&mut index)
    }

    /// Deletes a document: record, artifacts, and index entry. Fails with
    /// `NotFound` if the record does not exist (a second delete of the same
    /// id is an error).
    pub fn delete_document(&self, document_id: &str) -> Result<()> {
        let _guard = self.lock();
        self.store.delete(document_id)?;
        let mut index = self.load_index()?;
        index.documents.retain(|d| d.document_id != document_id);
        self.save_index(&mut index)
    }

    /// Lists document summaries. `None` means all; the reserved Unsorted id
    /// means documents with an empty membership list; any other id means
    /// documents whose membership contains it. Storage (insertion) order.
    pub fn list_documents(&self, shelf: Option<&str>) -> Result<Vec<DocumentSummary>> {
        let index = self.load_index()?;
        Ok(filter_by_shelf(index.documents, shelf))
    }
}

/// Applies the shelf-filter semantics shared by listing and search.
pub(crate) fn filter_by_shelf(
    documents: Vec<DocumentSummary>,
    shelf: Option<&str>,
) -> Vec<DocumentSummary> {
    match shelf {
        None => documents,
        Some(UNSORTED_SHELF_ID) => documents
            .into_iter()
            .filter(|d| d.shelves.is_empty())
            .collect(),
        Some(shelf_id) => documents
            .into_iter()
            .filter(|d| d.shelves.iter().any(|s| s == shelf_id))
            .collect(),
    }
}

/// Validates shelf ids against the index, silently dropping the reserved
/// Unsorted id. Unknown ids are `NotFound`.
pub(crate) fn clean_shelf_ids(index: &LibraryIndex, shelf_ids: Vec<String>) -> Result<Vec<String>> {
    for sid in &shelf_ids {
        if sid != UNSORTED_SHELF_ID && index.find_shelf(sid).is_none() {
            return Err(ShelfError::not_found(format!("shelf: {}", sid)));
        }
    }
    Ok(shelf_ids
        .into_iter()
        .filter(|sid| sid != UNSORTED_SHELF_ID)
        .collect())
}

fn upsert_summary(index: &mut LibraryIndex, mut summary: DocumentSummary, override_shelves: bool) {
    if let Some(existing) = index.find_document_mut(&summary.document_id) {
        if !override_shelves {
            summary.shelves = existing.shelves.clone();
        }
        *existing = summary;
    } else {
        index.documents.push(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentMetadata, Shelf};
    use tempfile::TempDir;

    fn extracted(title: &str) -> ExtractedDocument {
        ExtractedDocument {
            text: "body".to_string(),
            metadata: DocumentMetadata {
                title: title.to_string(),
                ..Default::default()
            },
            page_count: 1,
            source_path: PathBuf::from("/nonexistent.pdf"),
            char_count: 4,
        }
    }

    #[test]
    fn load_returns_fresh_index_when_missing_or_corrupt() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();

        let index = library.load_index().unwrap();
        assert_eq!(index.version, 1);
        assert!(index.documents.is_empty());
        assert!(index.shelves.is_empty());

        std::fs::write(tmp.path().join("index.json"), "{not json").unwrap();
        let index = library.load_index().unwrap();
        assert_eq!(index.version, 1);
        assert!(index.documents.is_empty());

        std::fs::write(tmp.path().join("index.json"), "").unwrap();
        let index = library.load_index().unwrap();
        assert!(index.documents.is_empty());
    }

    #[test]
    fn unreadable_index_is_a_storage_error_not_a_fresh_catalog() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();
        // A directory in place of the file makes every read fail with
        // something other than NotFound.
        std::fs::create_dir(tmp.path().join("index.json")).unwrap();

        let err = library.load_index().unwrap_err();
        assert!(matches!(err, ShelfError::Storage(_)));

        // Mutations surface the error instead of writing an empty catalog.
        let err = library
            .ingest_document(&extracted("Doc"), "d.pdf", serde_json::Map::new(), None)
            .unwrap_err();
        assert!(matches!(err, ShelfError::Storage(_)));
    }

    #[test]
    fn concurrent_ingests_all_land_in_the_index() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let library = &library;
                scope.spawn(move || {
                    library
                        .ingest_document(
                            &extracted(&format!("Doc {}", i)),
                            "d.pdf",
                            serde_json::Map::new(),
                            None,
                        )
                        .unwrap();
                });
            }
        });

        let index = library.load_index().unwrap();
        assert_eq!(index.documents.len(), 8);
    }

    #[test]
    fn ingest_registers_summary_in_index() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();

        let id = library
            .ingest_document(&extracted("My Paper"), "paper.pdf", serde_json::Map::new(), None)
            .unwrap();
        assert_eq!(id, "my-paper");

        let index = library.load_index().unwrap();
        assert_eq!(index.documents.len(), 1);
        assert_eq!(index.documents[0].document_id, "my-paper");
        assert!(index.documents[0].shelves.is_empty());
    }

    #[test]
    fn ingest_rejects_unknown_shelf() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();
        let err = library
            .ingest_document(
                &extracted("Doc"),
                "doc.pdf",
                serde_json::Map::new(),
                Some(vec!["ghost".to_string()]),
            )
            .unwrap_err();
        assert!(matches!(err, ShelfError::NotFound(_)));
        // Nothing was persisted to the index.
        assert!(library.load_index().unwrap().documents.is_empty());
    }

    #[test]
    fn upsert_preserves_membership_without_override() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();

        let mut index = library.load_index().unwrap();
        index.shelves.push(Shelf {
            shelf_id: "work".to_string(),
            name: "Work".to_string(),
            name_ja: String::new(),
            created_at: String::new(),
        });
        library.save_index(&mut index).unwrap();

        let id = library
            .ingest_document(
                &extracted("Doc"),
                "doc.pdf",
                serde_json::Map::new(),
                Some(vec!["work".to_string()]),
            )
            .unwrap();

        // Re-upsert without an override: membership sticks.
        library.upsert_document_summary(&id, None).unwrap();
        let index = library.load_index().unwrap();
        assert_eq!(index.documents[0].shelves, vec!["work"]);

        // With an override: membership replaced.
        library
            .upsert_document_summary(&id, Some(vec![]))
            .unwrap();
        let index = library.load_index().unwrap();
        assert!(index.documents[0].shelves.is_empty());
    }

    #[test]
    fn list_filters_by_shelf_and_unsorted() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();

        let mut index = library.load_index().unwrap();
        index.shelves.push(Shelf {
            shelf_id: "a".to_string(),
            name: "A".to_string(),
            name_ja: String::new(),
            created_at: String::new(),
        });
        library.save_index(&mut index).unwrap();

        library
            .ingest_document(
                &extracted("On Shelf"),
                "1.pdf",
                serde_json::Map::new(),
                Some(vec!["a".to_string()]),
            )
            .unwrap();
        library
            .ingest_document(&extracted("Loose"), "2.pdf", serde_json::Map::new(), None)
            .unwrap();

        assert_eq!(library.list_documents(None).unwrap().len(), 2);
        let on_a = library.list_documents(Some("a")).unwrap();
        assert_eq!(on_a.len(), 1);
        assert_eq!(on_a[0].document_id, "on-shelf");
        let unsorted = library.list_documents(Some(UNSORTED_SHELF_ID)).unwrap();
        assert_eq!(unsorted.len(), 1);
        assert_eq!(unsorted[0].document_id, "loose");
    }

    #[test]
    fn delete_removes_entry_and_second_delete_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let library = Library::open(tmp.path()).unwrap();
        let id = library
            .ingest_document(&extracted("Temp"), "t.pdf", serde_json::Map::new(), None)
            .unwrap();

        library.delete_document(&id).unwrap();
        assert!(library.load_index().unwrap().documents.is_empty());
        assert!(matches!(
            library.delete_document(&id),
            Err(ShelfError::NotFound(_))
        ));
    }
}
