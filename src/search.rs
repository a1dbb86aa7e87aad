//! Field-scoped substring search over the catalog.
//!
//! Matching is case-insensitive substring containment. Candidates are
//! shelf-filtered first, then matched; result order is candidate order,
//! there is no relevance ranking. The `readings` and `text` fields reach
//! past the index into the record store, so they are the expensive ones;
//! `all` checks the cheap index fields first and only loads records and
//! text files when nothing cheaper matched.

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, ShelfError};
use crate::index::{filter_by_shelf, Library};
use crate::models::DocumentSummary;

/// Which part of a document a query is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Author,
    Subject,
    Tags,
    Readers,
    Readings,
    Text,
    All,
}

impl SearchField {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "title" => Ok(SearchField::Title),
            "author" => Ok(SearchField::Author),
            "subject" => Ok(SearchField::Subject),
            "tags" => Ok(SearchField::Tags),
            "readers" => Ok(SearchField::Readers),
            "readings" => Ok(SearchField::Readings),
            "text" => Ok(SearchField::Text),
            "all" => Ok(SearchField::All),
            other => Err(ShelfError::InvalidOperation(format!(
                "unknown search field: {}",
                other
            ))),
        }
    }
}

/// Sort order for document listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Title, ascending, case-insensitive.
    Title,
    /// Upload date, newest first.
    Date,
    /// Page count, largest first.
    Pages,
}

impl SortKey {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "title" => Ok(SortKey::Title),
            "date" => Ok(SortKey::Date),
            "pages" => Ok(SortKey::Pages),
            other => Err(ShelfError::InvalidOperation(format!(
                "unknown sort key: {}",
                other
            ))),
        }
    }
}

/// Sorts summaries in place by the given key.
pub fn sort_documents(documents: &mut [DocumentSummary], key: SortKey) {
    match key {
        SortKey::Title => documents.sort_by_key(|d| d.title.to_lowercase()),
        SortKey::Date => {
            documents.sort_by(|a, b| b.uploaded_date.cmp(&a.uploaded_date));
        }
        SortKey::Pages => documents.sort_by(|a, b| b.page_count.cmp(&a.page_count)),
    }
}

impl Library {
    /// Searches documents, optionally restricted to one shelf first.
    pub fn search(
        &self,
        query: &str,
        field: SearchField,
        shelf: Option<&str>,
    ) -> Result<Vec<DocumentSummary>> {
        let index = self.load_index()?;
        let candidates = filter_by_shelf(index.documents, shelf);
        let query = query.to_lowercase();

        Ok(candidates
            .into_iter()
            .filter(|doc| self.matches(doc, &query, field))
            .collect())
    }

    fn matches(&self, doc: &DocumentSummary, query: &str, field: SearchField) -> bool {
        let contains = |s: &str| s.to_lowercase().contains(query);
        match field {
            SearchField::Title => contains(&doc.title),
            SearchField::Author => contains(&doc.author),
            SearchField::Subject => contains(&doc.subject),
            SearchField::Tags => doc.tags.iter().any(|t| contains(t)),
            SearchField::Readers => doc.readers_used.iter().any(|r| contains(r)),
            SearchField::Readings => self.readings_match(&doc.document_id, query),
            SearchField::Text => self.text_matches(&doc.document_id, query),
            SearchField::All => {
                contains(&doc.title)
                    || contains(&doc.author)
                    || contains(&doc.subject)
                    || doc.tags.iter().any(|t| contains(t))
                    || doc.readers_used.iter().any(|r| contains(r))
                    || self.readings_match(&doc.document_id, query)
                    || self.text_matches(&doc.document_id, query)
            }
        }
    }

    /// Scans string and string-list values one level inside each reading.
    fn readings_match(&self, document_id: &str, query: &str) -> bool {
        let record = match self.store().read(document_id) {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping {} in readings search: {}", document_id, e);
                return false;
            }
        };
        record
            .readings
            .values()
            .any(|reading| reading_value_matches(reading, query))
    }

    /// A missing or unreadable text file excludes the document; it never
    /// fails the whole search.
    fn text_matches(&self, document_id: &str, query: &str) -> bool {
        match self.store().read_text(document_id) {
            Ok(text) => text.to_lowercase().contains(query),
            Err(_) => false,
        }
    }
}

fn reading_value_matches(reading: &Value, query: &str) -> bool {
    let Some(object) = reading.as_object() else {
        return false;
    };
    object.values().any(|value| match value {
        Value::String(s) => s.to_lowercase().contains(query),
        Value::Array(items) => items.iter().any(|item| {
            item.as_str()
                .is_some_and(|s| s.to_lowercase().contains(query))
        }),
        _ => false,
    })
}

/// CLI: `shelf search`.
pub fn run_search(
    library: &Library,
    query: &str,
    field: &str,
    shelf: Option<&str>,
) -> anyhow::Result<()> {
    let field = SearchField::parse(field)?;
    let results = library.search(query, field, shelf)?;
    if results.is_empty() {
        println!("No documents matched '{}'", query);
        return Ok(());
    }
    println!("{} document(s) matched:", results.len());
    for doc in &results {
        println!(
            "  {:<32} {:<40} {:>5}p  {}",
            doc.document_id,
            doc.title,
            doc.page_count,
            doc.tags.join(", ")
        );
    }
    Ok(())
}
