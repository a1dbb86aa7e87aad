//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: extract → optional readers → save → index.
//! Each reader runs independently; one reader failing is logged and skipped
//! unless it was the only source requested. If readers were requested and
//! none produced a reading, the ingest fails and nothing is persisted.

use std::path::Path;

use tracing::error;

use crate::error::{Result, ShelfError};
use crate::extract;
use crate::index::Library;
use crate::readers::Reader;
use crate::tasks::{IngestPhase, ProgressSink, StderrProgress};

/// Runs the pipeline for one source file and returns the new document id.
/// Phase transitions go to `progress`; the final completed/failed report is
/// emitted here so callers only pass a sink.
pub async fn run_pipeline(
    library: &Library,
    source_path: &Path,
    source_name: &str,
    readers: &[Box<dyn Reader>],
    shelves: Option<Vec<String>>,
    progress: &dyn ProgressSink,
) -> Result<String> {
    match pipeline(library, source_path, source_name, readers, shelves, progress).await {
        Ok(document_id) => {
            progress.completed(&document_id);
            Ok(document_id)
        }
        Err(e) => {
            progress.failed(&e.to_string());
            Err(e)
        }
    }
}

async fn pipeline(
    library: &Library,
    source_path: &Path,
    source_name: &str,
    readers: &[Box<dyn Reader>],
    shelves: Option<Vec<String>>,
    progress: &dyn ProgressSink,
) -> Result<String> {
    progress.phase(IngestPhase::Extracting);
    let document = extract::extract(source_path)?;

    let mut readings = serde_json::Map::new();
    for reader in readers {
        progress.phase(IngestPhase::Reading(reader.name().to_string()));
        match reader.read(&document).await {
            Ok(reading) => {
                readings.insert(reader.name().to_string(), reading);
            }
            Err(e) => {
                error!("{} reader failed: {}", reader.name(), e);
                if readers.len() == 1 {
                    return Err(e);
                }
            }
        }
    }

    if !readers.is_empty() && readings.is_empty() {
        return Err(ShelfError::Reader(
            "no reader produced results".to_string(),
        ));
    }

    progress.phase(IngestPhase::Saving);
    library.ingest_document(&document, source_name, readings, shelves)
}

/// CLI: `shelf add`.
pub async fn run_add(
    library: &Library,
    source_path: &Path,
    readers: Vec<Box<dyn Reader>>,
    shelves: Vec<String>,
) -> anyhow::Result<()> {
    let source_name = source_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    let shelves = if shelves.is_empty() {
        None
    } else {
        Some(shelves)
    };

    let document_id = run_pipeline(
        library,
        source_path,
        &source_name,
        &readers,
        shelves,
        &StderrProgress,
    )
    .await?;
    println!("{}", document_id);
    Ok(())
}
