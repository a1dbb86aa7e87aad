//! In-memory background task tracking for uploads.
//!
//! Tasks are ephemeral: the registry lives for the server process and is
//! never persisted. Polling reads observe the most recent status write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use uuid::Uuid;

/// Phase of the ingest pipeline, reported to a [`ProgressSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestPhase {
    Extracting,
    /// A reader is working; carries the reader name.
    Reading(String),
    Saving,
}

impl IngestPhase {
    /// Status label, e.g. `extracting` or `reading_claude`.
    pub fn label(&self) -> String {
        match self {
            IngestPhase::Extracting => "extracting".to_string(),
            IngestPhase::Reading(name) => format!("reading_{}", name),
            IngestPhase::Saving => "saving".to_string(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            IngestPhase::Extracting => "Extracting text...".to_string(),
            IngestPhase::Reading(name) => format!("{} is reading the document...", name),
            IngestPhase::Saving => "Saving document...".to_string(),
        }
    }
}

/// Receives ingest phase transitions. Observability only; the pipeline
/// never depends on a sink for correctness.
pub trait ProgressSink: Send + Sync {
    fn phase(&self, phase: IngestPhase);
    fn completed(&self, document_id: &str);
    fn failed(&self, error: &str);
}

/// Sink that discards everything.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn phase(&self, _phase: IngestPhase) {}
    fn completed(&self, _document_id: &str) {}
    fn failed(&self, _error: &str) {}
}

/// Sink for interactive CLI runs: phase lines on stderr so stdout stays
/// parseable.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn phase(&self, phase: IngestPhase) {
        eprintln!("{}", phase.message());
    }
    fn completed(&self, document_id: &str) {
        eprintln!("Done: {}", document_id);
    }
    fn failed(&self, error: &str) {
        eprintln!("Failed: {}", error);
    }
}

/// One tracked upload.
#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub task_id: String,
    pub status: String,
    pub progress_message: String,
    pub document_id: Option<String>,
    pub error: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// Shared in-memory task table. Cheap to clone; all clones see the same
/// tasks.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending task and returns its id.
    pub fn create(&self) -> String {
        let task_id = Uuid::new_v4().simple().to_string()[..12].to_string();
        let task = Task {
            task_id: task_id.clone(),
            status: "pending".to_string(),
            progress_message: "Queued".to_string(),
            document_id: None,
            error: None,
            started_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        };
        self.lock().insert(task_id.clone(), task);
        task_id
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.lock().get(task_id).cloned()
    }

    pub fn all(&self) -> Vec<Task> {
        self.lock().values().cloned().collect()
    }

    fn update(&self, task_id: &str, apply: impl FnOnce(&mut Task)) {
        if let Some(task) = self.lock().get_mut(task_id) {
            apply(task);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A sink that writes phase transitions into this registry under the
    /// given task id.
    pub fn sink_for(&self, task_id: &str) -> TaskProgress {
        TaskProgress {
            registry: self.clone(),
            task_id: task_id.to_string(),
        }
    }
}

/// [`ProgressSink`] writing into a [`TaskRegistry`] entry.
pub struct TaskProgress {
    registry: TaskRegistry,
    task_id: String,
}

impl ProgressSink for TaskProgress {
    fn phase(&self, phase: IngestPhase) {
        self.registry.update(&self.task_id, |task| {
            task.status = phase.label();
            task.progress_message = phase.message();
        });
    }

    fn completed(&self, document_id: &str) {
        self.registry.update(&self.task_id, |task| {
            task.status = "completed".to_string();
            task.progress_message = "Done!".to_string();
            task.document_id = Some(document_id.to_string());
            task.completed_at = Some(chrono::Utc::now().to_rfc3339());
        });
    }

    fn failed(&self, error: &str) {
        self.registry.update(&self.task_id, |task| {
            task.status = "failed".to_string();
            task.progress_message = error.to_string();
            task.error = Some(error.to_string());
            task.completed_at = Some(chrono::Utc::now().to_rfc3339());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_registers_pending_task_with_short_id() {
        let registry = TaskRegistry::new();
        let id = registry.create();
        assert_eq!(id.len(), 12);

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, "pending");
        assert_eq!(task.progress_message, "Queued");
        assert!(task.document_id.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn sink_drives_status_transitions() {
        let registry = TaskRegistry::new();
        let id = registry.create();
        let sink = registry.sink_for(&id);

        sink.phase(IngestPhase::Extracting);
        assert_eq!(registry.get(&id).unwrap().status, "extracting");

        sink.phase(IngestPhase::Reading("claude".to_string()));
        assert_eq!(registry.get(&id).unwrap().status, "reading_claude");

        sink.phase(IngestPhase::Saving);
        sink.completed("my-doc");
        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, "completed");
        assert_eq!(task.document_id.as_deref(), Some("my-doc"));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn failure_records_error() {
        let registry = TaskRegistry::new();
        let id = registry.create();
        registry.sink_for(&id).failed("boom");
        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, "failed");
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn unknown_task_lookup_is_none_and_update_is_ignored() {
        let registry = TaskRegistry::new();
        assert!(registry.get("missing").is_none());
        registry.sink_for("missing").failed("ignored");
        assert!(registry.all().is_empty());
    }
}
