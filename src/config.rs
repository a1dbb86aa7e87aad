use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub readers: ReadersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("./library")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Upload request body ceiling in megabytes. Scanned PDFs run large,
    /// so the default is well above typical web-framework limits.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_max_upload_mb() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadersConfig {
    /// Reader selection when `--reader` is not given: none, claude, codex,
    /// or both.
    #[serde(default = "default_reader_choice")]
    pub default_choice: String,
    #[serde(default = "default_reader_timeout")]
    pub timeout_secs: u64,
    /// Document text is truncated to this many characters before prompting.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_claude_command")]
    pub claude_command: String,
    #[serde(default = "default_codex_command")]
    pub codex_command: String,
}

impl Default for ReadersConfig {
    fn default() -> Self {
        Self {
            default_choice: default_reader_choice(),
            timeout_secs: default_reader_timeout(),
            max_text_chars: default_max_text_chars(),
            claude_command: default_claude_command(),
            codex_command: default_codex_command(),
        }
    }
}

fn default_reader_choice() -> String {
    "none".to_string()
}
fn default_reader_timeout() -> u64 {
    600
}
fn default_max_text_chars() -> usize {
    120_000
}
fn default_claude_command() -> String {
    "claude".to_string()
}
fn default_codex_command() -> String {
    "codex".to_string()
}

impl Config {
    /// A config with every field at its default, used when no config file
    /// exists.
    pub fn minimal() -> Self {
        Config {
            library: LibraryConfig::default(),
            server: ServerConfig::default(),
            readers: ReadersConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    match config.readers.default_choice.as_str() {
        "none" | "claude" | "codex" | "both" => {}
        other => anyhow::bail!(
            "Unknown readers.default_choice: '{}'. Must be none, claude, codex, or both.",
            other
        ),
    }

    if config.readers.timeout_secs == 0 {
        anyhow::bail!("readers.timeout_secs must be > 0");
    }
    if config.readers.max_text_chars == 0 {
        anyhow::bail!("readers.max_text_chars must be > 0");
    }
    if config.server.max_upload_mb == 0 {
        anyhow::bail!("server.max_upload_mb must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.library.root, PathBuf::from("./library"));
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.server.max_upload_mb, 100);
        assert_eq!(config.readers.default_choice, "none");
        assert_eq!(config.readers.timeout_secs, 600);
        assert_eq!(config.readers.max_text_chars, 120_000);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            [library]
            root = "/data/shelf"

            [readers]
            default_choice = "claude"
            "#,
        )
        .unwrap();
        assert_eq!(config.library.root, PathBuf::from("/data/shelf"));
        assert_eq!(config.readers.default_choice, "claude");
        assert_eq!(config.readers.claude_command, "claude");
    }

    #[test]
    fn invalid_reader_choice_rejected_on_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[readers]\ndefault_choice = \"gpt\"\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn zero_upload_ceiling_rejected_on_load() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[server]\nmax_upload_mb = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
