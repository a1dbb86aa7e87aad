//! Readers: external CLIs that produce a structured reading of a document.
//!
//! A reading is an opaque JSON object (summary, key points, tags and so on)
//! keyed by reader name in the document record. Readers run as subprocesses
//! with a hard time ceiling; a reader failure is an error for that reader
//! only, never a panic. Tests substitute in-process implementations of
//! [`Reader`] instead of spawning anything.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ReadersConfig;
use crate::error::{Result, ShelfError};
use crate::models::ExtractedDocument;

/// Instruction template sent to every reader. `{document_*}` placeholders
/// are substituted before dispatch.
const READING_PROMPT: &str = r#"You are reading a document for a personal document library.

Title: {document_title}
Author: {document_author}
Subject: {document_subject}

Read the document text below and respond with a single JSON object with
these fields:
- "summary": a concise English summary (3-6 sentences)
- "summary_ja": the same summary in Japanese
- "key_points": a list of the most important points (strings, max 8)
- "key_points_ja": the same points in Japanese
- "keyword_explanations": a list of short "term: explanation" strings for
  domain terms a general reader may not know (max 6)
- "tags": a list of short lowercase topic tags (max 12)
- "confidence_notes": a list of caveats about anything you were unsure of

Document text:
{document_text}
"#;

/// JSON schema forwarded to readers that accept one.
const READING_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "summary": {"type": "string"},
    "summary_ja": {"type": "string"},
    "key_points": {"type": "array", "items": {"type": "string"}},
    "key_points_ja": {"type": "array", "items": {"type": "string"}},
    "keyword_explanations": {"type": "array", "items": {"type": "string"}},
    "tags": {"type": "array", "items": {"type": "string"}},
    "confidence_notes": {"type": "array", "items": {"type": "string"}}
  },
  "required": ["summary"]
}"#;

/// A source of structured readings.
#[async_trait]
pub trait Reader: Send + Sync {
    fn name(&self) -> &str;
    async fn read(&self, document: &ExtractedDocument) -> Result<Value>;
}

/// Builds the reader set for a choice string: `none`, `claude`, `codex`, or
/// `both`.
pub fn readers_for(choice: &str, config: &ReadersConfig) -> Result<Vec<Box<dyn Reader>>> {
    match choice {
        "none" => Ok(vec![]),
        "claude" => Ok(vec![Box::new(ClaudeReader::new(config))]),
        "codex" => Ok(vec![Box::new(CodexReader::new(config))]),
        "both" => Ok(vec![
            Box::new(ClaudeReader::new(config)),
            Box::new(CodexReader::new(config)),
        ]),
        other => Err(ShelfError::InvalidOperation(format!(
            "unknown reader choice: {}",
            other
        ))),
    }
}

/// Reader backed by the Claude Code CLI.
pub struct ClaudeReader {
    command: String,
    timeout: Duration,
    max_text_chars: usize,
}

impl ClaudeReader {
    pub fn new(config: &ReadersConfig) -> Self {
        ClaudeReader {
            command: config.claude_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_text_chars: config.max_text_chars,
        }
    }
}

#[async_trait]
impl Reader for ClaudeReader {
    fn name(&self) -> &str {
        "claude"
    }

    async fn read(&self, document: &ExtractedDocument) -> Result<Value> {
        let prompt_file = write_prompt_file(document, self.max_text_chars)?;
        let instruction = format!(
            "Read the file at {} and follow the instructions in it. \
             Respond ONLY with valid JSON matching this schema: {}",
            prompt_file.path().display(),
            READING_SCHEMA
        );

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("-p")
            .arg(&instruction)
            .arg("--output-format")
            .arg("json")
            .arg("--allowedTools")
            .arg("Read");

        let output = run_with_timeout(self.name(), &self.command, cmd, self.timeout).await?;
        let stdout = String::from_utf8_lossy(&output);

        // The CLI wraps its answer in an envelope with a "result" field.
        let envelope: Value = serde_json::from_str(&stdout).map_err(|e| {
            ShelfError::Reader(format!("failed to parse claude output as JSON: {}", e))
        })?;
        if let Some(result) = envelope.get("result").and_then(Value::as_str) {
            if let Some(reading) = extract_json(result) {
                return Ok(reading);
            }
        }
        if envelope.get("summary").is_some() {
            return Ok(envelope);
        }
        Err(ShelfError::Reader(
            "could not extract structured reading JSON from claude output".to_string(),
        ))
    }
}

/// Reader backed by the Codex CLI.
pub struct CodexReader {
    command: String,
    timeout: Duration,
    max_text_chars: usize,
}

impl CodexReader {
    pub fn new(config: &ReadersConfig) -> Self {
        CodexReader {
            command: config.codex_command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_text_chars: config.max_text_chars,
        }
    }
}

#[async_trait]
impl Reader for CodexReader {
    fn name(&self) -> &str {
        "codex"
    }

    async fn read(&self, document: &ExtractedDocument) -> Result<Value> {
        let prompt_file = write_prompt_file(document, self.max_text_chars)?;

        let mut schema_file = tempfile::Builder::new()
            .prefix("shelf-schema-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| ShelfError::storage("creating schema file", e))?;
        schema_file
            .write_all(READING_SCHEMA.as_bytes())
            .map_err(|e| ShelfError::storage("writing schema file", e))?;

        let output_dir = tempfile::tempdir()
            .map_err(|e| ShelfError::storage("creating output dir", e))?;
        let output_path = output_dir.path().join("reading.json");

        let instruction = format!(
            "Read the file at {} and follow the instructions in it. \
             Respond ONLY with valid JSON matching the schema.",
            prompt_file.path().display()
        );

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("exec")
            .arg(&instruction)
            .arg("--full-auto")
            .arg("--output-schema")
            .arg(schema_file.path())
            .arg("-o")
            .arg(&output_path);

        let stdout = run_with_timeout(self.name(), &self.command, cmd, self.timeout).await?;

        if let Ok(content) = std::fs::read_to_string(&output_path) {
            if let Some(reading) = extract_json(content.trim()) {
                return Ok(reading);
            }
        }
        let stdout = String::from_utf8_lossy(&stdout);
        if let Some(reading) = extract_json(stdout.trim()) {
            return Ok(reading);
        }
        Err(ShelfError::Reader(
            "no structured output received from codex".to_string(),
        ))
    }
}

/// Renders the prompt into a temp file the CLI can read. The file is
/// deleted when the returned handle drops.
fn write_prompt_file(
    document: &ExtractedDocument,
    max_text_chars: usize,
) -> Result<tempfile::NamedTempFile> {
    let text = truncate_text(&document.text, max_text_chars);
    let prompt = READING_PROMPT
        .replace("{document_title}", &document.metadata.title)
        .replace("{document_author}", &document.metadata.author)
        .replace("{document_subject}", &document.metadata.subject)
        .replace("{document_text}", &text);

    let mut file = tempfile::Builder::new()
        .prefix("shelf-prompt-")
        .suffix(".txt")
        .tempfile()
        .map_err(|e| ShelfError::storage("creating prompt file", e))?;
    file.write_all(prompt.as_bytes())
        .map_err(|e| ShelfError::storage("writing prompt file", e))?;
    Ok(file)
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    warn!(
        "document text ({} chars) exceeds limit, truncating to {} chars",
        text.chars().count(),
        max_chars
    );
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}\n\n[... text truncated due to length ...]", truncated)
}

/// Spawns the command, enforces the time ceiling, and maps every failure
/// mode to a reader error. Returns captured stdout on success.
async fn run_with_timeout(
    reader: &str,
    command: &str,
    mut cmd: tokio::process::Command,
    timeout: Duration,
) -> Result<Vec<u8>> {
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    debug!("running {} reader via '{}'", reader, command);
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ShelfError::Reader(format!(
                "{} CLI not found (command '{}')",
                reader, command
            )));
        }
        Ok(Err(e)) => {
            return Err(ShelfError::Reader(format!(
                "failed to run {} CLI: {}",
                reader, e
            )));
        }
        Err(_) => {
            return Err(ShelfError::Reader(format!(
                "{} CLI timed out after {} seconds",
                reader,
                timeout.as_secs()
            )));
        }
    };

    if !output.status.success() {
        let mut detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if detail.is_empty() {
            detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        let detail: String = detail.chars().take(1200).collect();
        return Err(ShelfError::Reader(format!(
            "{} CLI failed (exit {:?}): {}",
            reader,
            output.status.code(),
            detail
        )));
    }

    Ok(output.stdout)
}

/// Pulls a reading object out of possibly messy CLI output: a bare JSON
/// object, a ```json fence, any fence, or the first balanced brace span.
/// Bare objects and brace spans must carry a "summary" key to count.
fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.get("summary").is_some() {
            return Some(value);
        }
    }

    for fence in ["```json", "```"] {
        if let Some(start) = text.find(fence) {
            let body = &text[start + fence.len()..];
            if let Some(end) = body.find("```") {
                if let Ok(value) = serde_json::from_str::<Value>(body[..end].trim()) {
                    if value.is_object() {
                        return Some(value);
                    }
                }
            }
        }
    }

    let brace_start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in text[brace_start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let span = &text[brace_start..brace_start + offset + 1];
                    if let Ok(value) = serde_json::from_str::<Value>(span) {
                        if value.get("summary").is_some() {
                            return Some(value);
                        }
                    }
                    break;
                }
            }
            _ => {}
        }
    }
    None
}
