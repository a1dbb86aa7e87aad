//! Shelf CRUD and document↔shelf membership.
//!
//! Shelves live only in the catalog index; the virtual Unsorted shelf is
//! synthesized on demand and can never be created, renamed, or deleted.
//! Renames that change the derived slug rewrite every member document's
//! membership list in the same persisted update.

use crate::error::{Result, ShelfError};
use crate::index::{clean_shelf_ids, Library};
use crate::models::{Shelf, ShelfInfo, UNSORTED_SHELF_ID};
use crate::slug::generate_id;

impl Library {
    /// Creates a shelf. The id is derived from the name; a colliding slug
    /// (including the reserved Unsorted token) is a `Conflict`, not
    /// auto-resolved.
    pub fn create_shelf(&self, name: &str, name_ja: &str) -> Result<Shelf> {
        let _guard = self.lock();
        let mut index = self.load_index()?;
        let shelf_id = generate_id(name);

        if shelf_id == UNSORTED_SHELF_ID || index.find_shelf(&shelf_id).is_some() {
            return Err(ShelfError::Conflict(format!(
                "shelf already exists: {}",
                shelf_id
            )));
        }

        let shelf = Shelf {
            shelf_id,
            name: name.to_string(),
            name_ja: name_ja.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        index.shelves.push(shelf.clone());
        self.save_index(&mut index)?;
        Ok(shelf)
    }

    /// Renames a shelf. If the new name derives a different slug, every
    /// document referencing the old id is rewritten to the new id in the
    /// same index save; no intermediate state is persisted.
    pub fn rename_shelf(
        &self,
        shelf_id: &str,
        new_name: &str,
        new_name_ja: Option<&str>,
    ) -> Result<Shelf> {
        if shelf_id == UNSORTED_SHELF_ID {
            return Err(ShelfError::InvalidOperation(
                "cannot rename the Unsorted shelf".to_string(),
            ));
        }

        let _guard = self.lock();
        let mut index = self.load_index()?;
        let new_id = generate_id(new_name);

        if index.find_shelf(shelf_id).is_none() {
            return Err(ShelfError::not_found(format!("shelf: {}", shelf_id)));
        }
        if new_id != shelf_id
            && (new_id == UNSORTED_SHELF_ID || index.find_shelf(&new_id).is_some())
        {
            return Err(ShelfError::Conflict(format!(
                "shelf already exists: {}",
                new_id
            )));
        }

        let mut renamed = None;
        for shelf in &mut index.shelves {
            if shelf.shelf_id == shelf_id {
                shelf.shelf_id = new_id.clone();
                shelf.name = new_name.to_string();
                if let Some(ja) = new_name_ja {
                    shelf.name_ja = ja.to_string();
                }
                renamed = Some(shelf.clone());
                break;
            }
        }
        let renamed =
            renamed.ok_or_else(|| ShelfError::not_found(format!("shelf: {}", shelf_id)))?;

        if new_id != shelf_id {
            for doc in &mut index.documents {
                for sid in &mut doc.shelves {
                    if sid == shelf_id {
                        *sid = new_id.clone();
                    }
                }
            }
        }

        self.save_index(&mut index)?;
        Ok(renamed)
    }

    /// Deletes a shelf and strips its id from every document's membership.
    /// Member documents with no other shelves become Unsorted.
    pub fn delete_shelf(&self, shelf_id: &str) -> Result<()> {
        if shelf_id == UNSORTED_SHELF_ID {
            return Err(ShelfError::InvalidOperation(
                "cannot delete the Unsorted shelf".to_string(),
            ));
        }

        let _guard = self.lock();
        let mut index = self.load_index()?;
        let before = index.shelves.len();
        index.shelves.retain(|s| s.shelf_id != shelf_id);
        if index.shelves.len() == before {
            return Err(ShelfError::not_found(format!("shelf: {}", shelf_id)));
        }

        for doc in &mut index.documents {
            doc.shelves.retain(|sid| sid != shelf_id);
        }
        self.save_index(&mut index)
    }

    /// Lists all shelves: the synthesized Unsorted entry first, then
    /// persisted shelves in storage order, each with its live membership
    /// count computed by scanning document summaries.
    pub fn list_shelves(&self) -> Result<Vec<ShelfInfo>> {
        let index = self.load_index()?;

        let mut unsorted_count = 0usize;
        for doc in &index.documents {
            if doc.shelves.is_empty() {
                unsorted_count += 1;
            }
        }

        let mut shelves = vec![ShelfInfo::unsorted(unsorted_count)];
        for shelf in &index.shelves {
            let count = index
                .documents
                .iter()
                .filter(|d| d.shelves.iter().any(|sid| sid == &shelf.shelf_id))
                .count();
            shelves.push(ShelfInfo::from_shelf(shelf, count));
        }
        Ok(shelves)
    }

    /// Looks up one shelf; the reserved id yields the synthesized Unsorted
    /// entry with its live count.
    pub fn get_shelf(&self, shelf_id: &str) -> Result<ShelfInfo> {
        self.list_shelves()?
            .into_iter()
            .find(|s| s.shelf_id == shelf_id)
            .ok_or_else(|| ShelfError::not_found(format!("shelf: {}", shelf_id)))
    }

    /// Replaces a document's entire membership list. Every id must name an
    /// existing shelf; the reserved Unsorted id is filtered out silently.
    pub fn assign_document_to_shelves(
        &self,
        document_id: &str,
        shelf_ids: Vec<String>,
    ) -> Result<()> {
        let _guard = self.lock();
        let mut index = self.load_index()?;
        let clean = clean_shelf_ids(&index, shelf_ids)?;

        let doc = index
            .find_document_mut(document_id)
            .ok_or_else(|| ShelfError::not_found(format!("document: {}", document_id)))?;
        doc.shelves = clean;
        self.save_index(&mut index)
    }

    /// Adds one membership. Idempotent: already-present ids are left alone.
    /// The reserved Unsorted id is a no-op.
    pub fn add_document_to_shelf(&self, document_id: &str, shelf_id: &str) -> Result<()> {
        let _guard = self.lock();
        let mut index = self.load_index()?;

        if shelf_id != UNSORTED_SHELF_ID && index.find_shelf(shelf_id).is_none() {
            return Err(ShelfError::not_found(format!("shelf: {}", shelf_id)));
        }

        let doc = index
            .find_document_mut(document_id)
            .ok_or_else(|| ShelfError::not_found(format!("document: {}", document_id)))?;
        if shelf_id != UNSORTED_SHELF_ID && !doc.shelves.iter().any(|s| s == shelf_id) {
            doc.shelves.push(shelf_id.to_string());
        }
        self.save_index(&mut index)
    }

    /// Removes one membership. Idempotent: removing an absent id succeeds.
    pub fn remove_document_from_shelf(&self, document_id: &str, shelf_id: &str) -> Result<()> {
        let _guard = self.lock();
        let mut index = self.load_index()?;
        let doc = index
            .find_document_mut(document_id)
            .ok_or_else(|| ShelfError::not_found(format!("document: {}", document_id)))?;
        doc.shelves.retain(|s| s != shelf_id);
        self.save_index(&mut index)
    }
}

/// CLI: `shelf shelf list`.
pub fn run_shelf_list(library: &Library) -> anyhow::Result<()> {
    println!("{:<24} {:<20} {:<14} {:>9}", "ID", "Name", "名前 (Ja)", "Documents");
    for s in library.list_shelves()? {
        let label = if s.is_virtual {
            format!("{} (virtual)", s.shelf_id)
        } else {
            s.shelf_id.clone()
        };
        println!(
            "{:<24} {:<20} {:<14} {:>9}",
            label, s.name, s.name_ja, s.document_count
        );
    }
    Ok(())
}

/// CLI: `shelf shelf create`.
pub fn run_shelf_create(library: &Library, name: &str, name_ja: &str) -> anyhow::Result<()> {
    let shelf = library.create_shelf(name, name_ja)?;
    println!("Created shelf: {} ({})", shelf.shelf_id, shelf.name);
    Ok(())
}

/// CLI: `shelf shelf rename`.
pub fn run_shelf_rename(
    library: &Library,
    shelf_id: &str,
    new_name: &str,
    name_ja: Option<&str>,
) -> anyhow::Result<()> {
    let shelf = library.rename_shelf(shelf_id, new_name, name_ja)?;
    println!("Renamed to: {} ({})", shelf.shelf_id, shelf.name);
    Ok(())
}

/// CLI: `shelf shelf delete`.
pub fn run_shelf_delete(library: &Library, shelf_id: &str) -> anyhow::Result<()> {
    library.delete_shelf(shelf_id)?;
    println!("Deleted shelf: {}", shelf_id);
    Ok(())
}

/// CLI: `shelf shelf assign`.
pub fn run_shelf_assign(
    library: &Library,
    document_id: &str,
    shelf_ids: Vec<String>,
) -> anyhow::Result<()> {
    library.assign_document_to_shelves(document_id, shelf_ids.clone())?;
    println!("Assigned {} to: {}", document_id, shelf_ids.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DocumentMetadata, ExtractedDocument, UNSORTED_SHELF_NAME, UNSORTED_SHELF_NAME_JA,
    };
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn library() -> (TempDir, Library) {
        let tmp = TempDir::new().unwrap();
        let lib = Library::open(tmp.path()).unwrap();
        (tmp, lib)
    }

    fn add_document(library: &Library, title: &str, shelves: Option<Vec<String>>) -> String {
        let doc = ExtractedDocument {
            text: "text".to_string(),
            metadata: DocumentMetadata {
                title: title.to_string(),
                ..Default::default()
            },
            page_count: 1,
            source_path: PathBuf::from("/nonexistent.pdf"),
            char_count: 4,
        };
        library
            .ingest_document(&doc, "file.pdf", serde_json::Map::new(), shelves)
            .unwrap()
    }

    #[test]
    fn create_derives_slug_and_rejects_duplicates() {
        let (_tmp, lib) = library();
        let shelf = lib.create_shelf("Finance", "財務").unwrap();
        assert_eq!(shelf.shelf_id, "finance");
        assert_eq!(shelf.name_ja, "財務");

        let err = lib.create_shelf("finance", "").unwrap_err();
        assert!(matches!(err, ShelfError::Conflict(_)));
    }

    #[test]
    fn reserved_id_cannot_be_created_or_mutated() {
        let (_tmp, lib) = library();
        assert!(matches!(
            lib.rename_shelf(UNSORTED_SHELF_ID, "x", None),
            Err(ShelfError::InvalidOperation(_))
        ));
        assert!(matches!(
            lib.delete_shelf(UNSORTED_SHELF_ID),
            Err(ShelfError::InvalidOperation(_))
        ));
    }

    #[test]
    fn rename_rewrites_membership_atomically() {
        let (_tmp, lib) = library();
        lib.create_shelf("Alpha", "").unwrap();
        lib.create_shelf("Keep", "").unwrap();

        let doc1 = add_document(&lib, "One", Some(vec!["alpha".to_string()]));
        let doc2 = add_document(
            &lib,
            "Two",
            Some(vec!["alpha".to_string(), "keep".to_string()]),
        );
        let doc3 = add_document(&lib, "Three", None);

        let renamed = lib.rename_shelf("alpha", "Beta", None).unwrap();
        assert_eq!(renamed.shelf_id, "beta");

        let index = lib.load_index().unwrap();
        let shelves_of = |id: &str| {
            index
                .find_document(id)
                .map(|d| d.shelves.clone())
                .unwrap()
        };
        assert_eq!(shelves_of(&doc1), vec!["beta"]);
        assert_eq!(shelves_of(&doc2), vec!["beta", "keep"]);
        assert!(shelves_of(&doc3).is_empty());
        assert!(index.find_shelf("alpha").is_none());
    }

    #[test]
    fn rename_to_existing_slug_is_conflict() {
        let (_tmp, lib) = library();
        lib.create_shelf("Alpha", "").unwrap();
        lib.create_shelf("Beta", "").unwrap();
        assert!(matches!(
            lib.rename_shelf("alpha", "Beta", None),
            Err(ShelfError::Conflict(_))
        ));
    }

    #[test]
    fn delete_strips_membership_and_members_become_unsorted() {
        let (_tmp, lib) = library();
        lib.create_shelf("Doomed", "").unwrap();
        let doc = add_document(&lib, "Member", Some(vec!["doomed".to_string()]));

        lib.delete_shelf("doomed").unwrap();

        let unsorted = lib.list_documents(Some(UNSORTED_SHELF_ID)).unwrap();
        assert_eq!(unsorted.len(), 1);
        assert_eq!(unsorted[0].document_id, doc);

        assert!(matches!(
            lib.delete_shelf("doomed"),
            Err(ShelfError::NotFound(_))
        ));
    }

    #[test]
    fn list_prepends_unsorted_with_live_counts() {
        let (_tmp, lib) = library();
        lib.create_shelf("Finance", "財務").unwrap();
        let doc = add_document(&lib, "Report", None);

        let shelves = lib.list_shelves().unwrap();
        assert_eq!(shelves[0].shelf_id, UNSORTED_SHELF_ID);
        assert!(shelves[0].is_virtual);
        assert_eq!(shelves[0].document_count, 1);
        assert_eq!(shelves[1].shelf_id, "finance");
        assert_eq!(shelves[1].document_count, 0);

        lib.assign_document_to_shelves(&doc, vec!["finance".to_string()])
            .unwrap();
        let shelves = lib.list_shelves().unwrap();
        assert_eq!(shelves[0].document_count, 0);
        assert_eq!(shelves[1].document_count, 1);
    }

    #[test]
    fn get_shelf_synthesizes_unsorted_and_errors_on_unknown() {
        let (_tmp, lib) = library();
        let unsorted = lib.get_shelf(UNSORTED_SHELF_ID).unwrap();
        assert!(unsorted.is_virtual);
        assert_eq!(unsorted.name, UNSORTED_SHELF_NAME);
        assert_eq!(unsorted.name_ja, UNSORTED_SHELF_NAME_JA);
        assert!(matches!(
            lib.get_shelf("nope"),
            Err(ShelfError::NotFound(_))
        ));
    }

    #[test]
    fn assign_replaces_validates_and_filters_reserved() {
        let (_tmp, lib) = library();
        lib.create_shelf("A", "").unwrap();
        let doc = add_document(&lib, "Doc", None);

        assert!(matches!(
            lib.assign_document_to_shelves(&doc, vec!["missing".to_string()]),
            Err(ShelfError::NotFound(_))
        ));

        lib.assign_document_to_shelves(
            &doc,
            vec!["a".to_string(), UNSORTED_SHELF_ID.to_string()],
        )
        .unwrap();
        assert_eq!(
            lib.load_index().unwrap().find_document(&doc).unwrap().shelves,
            vec!["a"]
        );

        // Empty assignment moves the document back to Unsorted.
        lib.assign_document_to_shelves(&doc, vec![]).unwrap();
        let unsorted = lib.list_documents(Some(UNSORTED_SHELF_ID)).unwrap();
        assert_eq!(unsorted.len(), 1);
        lib.assign_document_to_shelves(&doc, vec!["a".to_string()])
            .unwrap();
        assert!(lib
            .list_documents(Some(UNSORTED_SHELF_ID))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let (_tmp, lib) = library();
        lib.create_shelf("A", "").unwrap();
        let doc = add_document(&lib, "Doc", None);

        lib.add_document_to_shelf(&doc, "a").unwrap();
        lib.add_document_to_shelf(&doc, "a").unwrap();
        assert_eq!(
            lib.load_index().unwrap().find_document(&doc).unwrap().shelves,
            vec!["a"]
        );

        assert!(matches!(
            lib.add_document_to_shelf(&doc, "missing"),
            Err(ShelfError::NotFound(_))
        ));

        lib.remove_document_from_shelf(&doc, "a").unwrap();
        lib.remove_document_from_shelf(&doc, "a").unwrap();
        assert!(lib
            .load_index()
            .unwrap()
            .find_document(&doc)
            .unwrap()
            .shelves
            .is_empty());
    }

    #[test]
    fn unreadable_index_fails_mutations_and_preserves_the_catalog() {
        let (tmp, lib) = library();
        lib.create_shelf("Keep", "").unwrap();

        // A directory in place of the file makes reads fail with something
        // other than NotFound.
        let index_path = tmp.path().join("index.json");
        let aside = tmp.path().join("index.json.aside");
        std::fs::rename(&index_path, &aside).unwrap();
        std::fs::create_dir(&index_path).unwrap();

        assert!(matches!(
            lib.create_shelf("Another", ""),
            Err(ShelfError::Storage(_))
        ));
        assert!(matches!(
            lib.delete_shelf("keep"),
            Err(ShelfError::Storage(_))
        ));
        assert!(matches!(lib.list_shelves(), Err(ShelfError::Storage(_))));

        // Restore the file: no failed mutation overwrote the catalog.
        std::fs::remove_dir(&index_path).unwrap();
        std::fs::rename(&aside, &index_path).unwrap();
        let shelves = lib.list_shelves().unwrap();
        assert_eq!(shelves[1].shelf_id, "keep");
    }
}
