//! Per-document persistence: JSON records, rendered Markdown summaries, raw
//! extracted text, and archived originals.
//!
//! Layout under the library root:
//!
//! ```text
//! json/<id>.json      full document record
//! markdown/<id>.md    rendered human-readable summary
//! texts/<id>.txt      raw extracted text
//! pdfs/<id>.pdf       archived original (or emls/<id>.eml)
//! ```
//!
//! All record writes go through write-to-temp-then-rename so a crash never
//! leaves a half-written file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::error::{Result, ShelfError};
use crate::models::{DocumentMetadata, DocumentRecord, ExtractedDocument};
use crate::slug::generate_id;

/// Metadata-derived tags are capped lower than the merged total.
const MAX_METADATA_TAGS: usize = 8;
/// Hard cap on a document's merged tag list.
const MAX_TAGS: usize = 12;
/// Characters of raw text included in the Markdown preview.
const MARKDOWN_PREVIEW_CHARS: usize = 8000;

/// Owns the per-document files under a library root.
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DocumentStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn json_path(&self, document_id: &str) -> PathBuf {
        self.root.join("json").join(format!("{}.json", document_id))
    }

    pub fn markdown_path(&self, document_id: &str) -> PathBuf {
        self.root
            .join("markdown")
            .join(format!("{}.md", document_id))
    }

    pub fn text_path(&self, document_id: &str) -> PathBuf {
        self.root.join("texts").join(format!("{}.txt", document_id))
    }

    pub fn archive_path(&self, document_id: &str, source_type: &str) -> PathBuf {
        if source_type == "eml" {
            self.root.join("emls").join(format!("{}.eml", document_id))
        } else {
            self.root.join("pdfs").join(format!("{}.pdf", document_id))
        }
    }

    pub fn exists(&self, document_id: &str) -> bool {
        self.json_path(document_id).exists()
    }

    /// Resolves a free identifier for the candidate slug: the candidate
    /// itself, or `<slug>-2`, `<slug>-3`, and so on (the smallest free
    /// suffix).
    ///
    /// Callers must hold the library's index lock so check-and-reserve is
    /// atomic with respect to other in-process writers.
    pub fn reserve_id(&self, candidate: &str) -> String {
        if !self.exists(candidate) {
            return candidate.to_string();
        }
        let mut n = 2u64;
        loop {
            let id = format!("{}-{}", candidate, n);
            if !self.exists(&id) {
                return id;
            }
            n += 1;
        }
    }

    /// Writes a new record. Fails with `Conflict` if the storage location is
    /// already occupied (should not happen after `reserve_id`, but checked).
    pub fn create(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.json_path(&record.document_id);
        if path.exists() {
            return Err(ShelfError::Conflict(format!(
                "document already exists: {}",
                record.document_id
            )));
        }
        self.write_record(record)
    }

    pub fn read(&self, document_id: &str) -> Result<DocumentRecord> {
        let path = self.json_path(document_id);
        if !path.exists() {
            return Err(ShelfError::not_found(format!("document: {}", document_id)));
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ShelfError::storage(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&content)
            .map_err(|e| ShelfError::storage(format!("parsing {}", path.display()), e))
    }

    /// Full overwrite of an existing record.
    pub fn update(&self, document_id: &str, record: &DocumentRecord) -> Result<()> {
        if !self.exists(document_id) {
            return Err(ShelfError::not_found(format!("document: {}", document_id)));
        }
        self.write_record(record)
    }

    /// Returns the archived plain-text extraction.
    pub fn read_text(&self, document_id: &str) -> Result<String> {
        let path = self.text_path(document_id);
        if !path.exists() {
            return Err(ShelfError::not_found(format!(
                "text for document: {}",
                document_id
            )));
        }
        std::fs::read_to_string(&path)
            .map_err(|e| ShelfError::storage(format!("reading {}", path.display()), e))
    }

    pub fn read_markdown(&self, document_id: &str) -> Result<String> {
        let path = self.markdown_path(document_id);
        if !path.exists() {
            return Err(ShelfError::not_found(format!(
                "markdown for document: {}",
                document_id
            )));
        }
        std::fs::read_to_string(&path)
            .map_err(|e| ShelfError::storage(format!("reading {}", path.display()), e))
    }

    /// Removes the record and every associated artifact. Absent artifacts
    /// are skipped silently; an absent record is `NotFound`.
    pub fn delete(&self, document_id: &str) -> Result<()> {
        if !self.exists(document_id) {
            return Err(ShelfError::not_found(format!("document: {}", document_id)));
        }

        let mut paths = vec![
            self.markdown_path(document_id),
            self.text_path(document_id),
            self.archive_path(document_id, "pdf"),
            self.archive_path(document_id, "eml"),
        ];

        // Legacy deployments store the original's path in the record itself.
        if let Ok(record) = self.read(document_id) {
            if let Some(source_file) = record.source_file.as_deref() {
                if let Some(resolved) = self.resolve_source_path(source_file) {
                    paths.push(resolved);
                }
            }
        }
        paths.push(self.json_path(document_id));
        paths.sort();
        paths.dedup();

        for path in paths {
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| ShelfError::storage(format!("removing {}", path.display()), e))?;
            }
        }
        Ok(())
    }

    /// Resolves a possibly-relative `source_file` path against the library
    /// root. Returns `None` if the file does not exist under any candidate.
    pub fn resolve_source_path(&self, path: &str) -> Option<PathBuf> {
        if path.is_empty() {
            return None;
        }
        let raw = PathBuf::from(path);
        let mut candidates = vec![raw.clone()];
        if raw.is_relative() {
            candidates.push(self.root.join(&raw));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    /// Saves an extracted document with its readings: assigns a unique id,
    /// writes the JSON record, Markdown summary, and raw text, and archives
    /// the original source file. Returns the assigned document id.
    ///
    /// Text and original-archive failures are non-fatal (logged); the JSON
    /// record is the source of truth. Must be called with the library's
    /// index lock held so id reservation stays atomic in-process.
    pub fn save_extracted(
        &self,
        document: &ExtractedDocument,
        source_name: &str,
        readings: serde_json::Map<String, Value>,
    ) -> Result<String> {
        for dir in ["json", "markdown", "texts", "pdfs", "emls"] {
            std::fs::create_dir_all(self.root.join(dir))
                .map_err(|e| ShelfError::storage(format!("creating {}/", dir), e))?;
        }

        let title = derive_title(&document.metadata, source_name);
        let document_id = self.reserve_id(&generate_id(&title));
        let mut record = build_record(document, &document_id, source_name, readings);

        self.create(&record)?;

        let markdown = render_markdown(&record, &document.text);
        if let Err(e) = write_atomic(&self.markdown_path(&document_id), &markdown) {
            warn!("failed to write markdown summary: {}", e);
        }

        if let Err(e) = write_atomic(&self.text_path(&document_id), &document.text) {
            warn!("failed to save extracted text: {}", e);
        }

        if document.source_path.exists() {
            let dest = self.archive_path(&document_id, &record.source_type);
            match std::fs::copy(&document.source_path, &dest) {
                Ok(_) => {
                    record.source_file = Some(dest.to_string_lossy().into_owned());
                    self.write_record(&record)?;
                }
                Err(e) => warn!("failed to copy source file: {}", e),
            }
        }

        Ok(document_id)
    }

    fn write_record(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.json_path(&record.document_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ShelfError::storage(format!("creating {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| ShelfError::storage("serializing record", e))?;
        write_atomic(&path, &json)
            .map_err(|e| ShelfError::storage(format!("writing {}", path.display()), e))
    }
}

/// Writes content to a sibling temp file and renames it into place.
pub(crate) fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Title: metadata title, else the source filename stem, else a fixed label.
pub fn derive_title(metadata: &DocumentMetadata, source_name: &str) -> String {
    let title = metadata.title.trim();
    if !title.is_empty() {
        return title.to_string();
    }
    if !source_name.is_empty() {
        if let Some(stem) = Path::new(source_name).file_stem() {
            return stem.to_string_lossy().into_owned();
        }
    }
    "Untitled Document".to_string()
}

/// Source type from the filename extension: `.eml` → eml, everything else pdf.
pub fn detect_source_type(source_name: &str, source_path: &Path) -> String {
    let ext = Path::new(source_name)
        .extension()
        .or_else(|| source_path.extension())
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ext == "eml" {
        "eml".to_string()
    } else {
        "pdf".to_string()
    }
}

fn build_record(
    document: &ExtractedDocument,
    document_id: &str,
    source_name: &str,
    readings: serde_json::Map<String, Value>,
) -> DocumentRecord {
    let metadata = &document.metadata;
    let meta_tags = tags_from_metadata(metadata);
    let reading_tags = tags_from_readings(&readings);
    let readers_used: Vec<String> = readings.keys().cloned().collect();

    DocumentRecord {
        document_id: document_id.to_string(),
        title: derive_title(metadata, source_name),
        source_type: detect_source_type(source_name, &document.source_path),
        author: metadata.author.clone(),
        subject: metadata.subject.clone(),
        creator: metadata.creator.clone(),
        creation_date: metadata.creation_date.clone(),
        uploaded_date: chrono::Utc::now().format("%Y-%m-%d").to_string(),
        source_name: source_name.to_string(),
        source_file: Some(document.source_path.to_string_lossy().into_owned()),
        page_count: document.page_count,
        char_count: document.char_count as u64,
        tags: merge_tags(meta_tags, reading_tags),
        readers_used,
        readings,
    }
}

/// Tags from PDF keywords (or subject as a fallback), split on `,` / `;`,
/// case-insensitively deduplicated, first-seen order, capped at 8.
fn tags_from_metadata(metadata: &DocumentMetadata) -> Vec<String> {
    let raw = if !metadata.keywords.is_empty() {
        metadata.keywords.as_str()
    } else {
        metadata.subject.as_str()
    };
    if raw.is_empty() {
        return Vec::new();
    }

    let mut tags: Vec<String> = Vec::new();
    for chunk in raw.split([',', ';']) {
        let tag = chunk.trim();
        if !tag.is_empty() && !contains_case_insensitive(&tags, tag) {
            tags.push(tag.to_string());
        }
        if tags.len() >= MAX_METADATA_TAGS {
            break;
        }
    }
    tags
}

/// Tags from each reading's `tags` array, capped at 12.
fn tags_from_readings(readings: &serde_json::Map<String, Value>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for data in readings.values() {
        let reading_tags = data
            .get("tags")
            .and_then(Value::as_array)
            .map(|a| a.as_slice())
            .unwrap_or_default();
        for tag in reading_tags {
            if let Some(s) = tag.as_str() {
                let clean = s.trim();
                if !clean.is_empty() && !contains_case_insensitive(&tags, clean) {
                    tags.push(clean.to_string());
                }
            }
            if tags.len() >= MAX_TAGS {
                return tags;
            }
        }
    }
    tags
}

/// Merged tag list: metadata first, then readings, capped at 12,
/// case-insensitive first-seen-wins.
fn merge_tags(meta_tags: Vec<String>, reading_tags: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for tag in meta_tags.into_iter().chain(reading_tags) {
        if !tag.is_empty() && !contains_case_insensitive(&merged, &tag) {
            merged.push(tag);
        }
        if merged.len() >= MAX_TAGS {
            break;
        }
    }
    merged
}

fn contains_case_insensitive(tags: &[String], candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    tags.iter().any(|t| t.to_lowercase() == lower)
}

/// Renders the human-readable Markdown summary for a record.
pub fn render_markdown(record: &DocumentRecord, text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# {}", record.title));
    lines.push(String::new());
    lines.push(format!("**Document ID:** {}  ", record.document_id));
    lines.push(format!(
        "**Author:** {}  ",
        if record.author.is_empty() {
            "Unknown"
        } else {
            &record.author
        }
    ));
    lines.push(format!(
        "**Subject:** {}  ",
        if record.subject.is_empty() {
            "N/A"
        } else {
            &record.subject
        }
    ));
    lines.push(format!("**Pages:** {}  ", record.page_count));
    lines.push(format!("**Characters:** {}  ", record.char_count));
    lines.push(format!("**Uploaded:** {}  ", record.uploaded_date));
    if !record.source_type.is_empty() {
        lines.push(format!(
            "**Source Type:** {}  ",
            record.source_type.to_uppercase()
        ));
    }
    if !record.readers_used.is_empty() {
        lines.push(format!("**Readers:** {}  ", record.readers_used.join(", ")));
    }
    lines.push(String::new());

    if !record.readings.is_empty() {
        lines.push("## LLM Readings".to_string());
        lines.push(String::new());
        for (reader_name, data) in &record.readings {
            lines.push(format!("### {}", capitalize(reader_name)));
            lines.push(String::new());

            push_text_section(&mut lines, data, "summary", "Summary");
            push_text_section(&mut lines, data, "summary_ja", "要約");
            push_list_section(&mut lines, data, &["key_points"], "Key Points");
            push_list_section(&mut lines, data, &["key_points_ja"], "重要ポイント");
            push_list_section(
                &mut lines,
                data,
                &["keyword_explanations", "action_items"],
                "Keyword Explanations",
            );
            push_list_section(
                &mut lines,
                data,
                &["keyword_explanations_ja", "action_items_ja"],
                "キーワード解説",
            );
            // Readers emit confidence notes as either a list or free text.
            push_list_section(&mut lines, data, &["confidence_notes"], "Confidence Notes");
            push_text_section(&mut lines, data, "confidence_notes", "Confidence Notes");
        }
    }

    lines.push("---".to_string());
    lines.push(String::new());
    lines.push("## Extracted Text (Preview)".to_string());
    lines.push(String::new());

    let mut preview: String = text.chars().take(MARKDOWN_PREVIEW_CHARS).collect();
    if text.chars().count() > MARKDOWN_PREVIEW_CHARS {
        preview.push_str(
            "\n\n... (truncated in markdown preview, full text is saved in texts/)",
        );
    }
    lines.push("```".to_string());
    lines.push(preview);
    lines.push("```".to_string());

    lines.join("\n") + "\n"
}

fn push_text_section(lines: &mut Vec<String>, data: &Value, key: &str, heading: &str) {
    if let Some(text) = data.get(key).and_then(Value::as_str) {
        if !text.is_empty() {
            lines.push(format!("#### {}", heading));
            lines.push(text.to_string());
            lines.push(String::new());
        }
    }
}

/// Lists under the first present key win; later keys are fallbacks.
fn push_list_section(lines: &mut Vec<String>, data: &Value, keys: &[&str], heading: &str) {
    let items = keys
        .iter()
        .filter_map(|k| data.get(*k).and_then(Value::as_array))
        .find(|a| !a.is_empty());
    if let Some(items) = items {
        lines.push(format!("#### {}", heading));
        for item in items {
            if let Some(s) = item.as_str() {
                lines.push(format!("- {}", s));
            }
        }
        lines.push(String::new());
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
