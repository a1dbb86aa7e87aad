//! # Doc Shelf CLI (`shelf`)
//!
//! The `shelf` binary is the primary interface for Doc Shelf. It provides
//! commands for adding documents, browsing and searching the catalog,
//! managing shelves, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! shelf [--config ./shelf.toml] [--library ./library] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf add <file>` | Ingest a PDF or EML document |
//! | `shelf list` | List documents in the library |
//! | `shelf search "<query>"` | Field-scoped substring search |
//! | `shelf show <id>` | Print a document's Markdown summary |
//! | `shelf shelf <subcommand>` | Manage shelves |
//! | `shelf serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest with both readers
//! shelf add report.pdf --reader both
//!
//! # Ingest straight onto a shelf
//! shelf add invoice.pdf --shelf finance
//!
//! # Search reader output only
//! shelf search "merger" --field readings
//!
//! # Start the HTTP server on a custom port
//! shelf serve --bind 0.0.0.0:9000
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use doc_shelf::{config, index::Library, ingest, readers, search, server, shelves, show};

/// Doc Shelf CLI: a personal library for PDF and EML documents with
/// optional LLM-generated readings.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; `--library` overrides the library root from config.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "Doc Shelf: organize, enrich, and search PDF/EML documents",
    version,
    long_about = "Doc Shelf extracts text and metadata from PDF and EML files, optionally \
    enriches them with structured readings from external LLM CLIs (claude, codex), and keeps \
    a searchable catalog organized into shelves, exposed via CLI and a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional; when the file does not exist, built-in defaults are used
    /// (library root `./library`, no readers).
    #[arg(long, global = true, default_value = "./shelf.toml")]
    config: PathBuf,

    /// Library root directory. Overrides `[library].root` from config.
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Add a PDF or EML document to the library.
    ///
    /// Extracts text and metadata, optionally runs readers, writes the
    /// record and its Markdown/text artifacts, and registers the document
    /// in the catalog index. Prints the new document id on success.
    Add {
        /// Path to the source file (`.pdf` or `.eml`).
        file: PathBuf,

        /// Which reader(s) to run: `none`, `claude`, `codex`, or `both`.
        /// Defaults to `readers.default_choice` from config.
        #[arg(long)]
        reader: Option<String>,

        /// Assign the document to this shelf (repeatable).
        #[arg(long = "shelf")]
        shelves: Vec<String>,
    },

    /// List documents in the library.
    List {
        /// Output format: `table` or `json`.
        #[arg(long, default_value = "table")]
        format: String,

        /// Sort order: `title` (A→Z), `date` (newest first), or `pages`
        /// (largest first).
        #[arg(long, default_value = "date")]
        sort: String,

        /// Only documents on this shelf (`__unsorted__` for the virtual
        /// Unsorted shelf).
        #[arg(long)]
        shelf: Option<String>,
    },

    /// Search documents in the library.
    ///
    /// Case-insensitive substring matching over the chosen field. The
    /// `readings` field scans reader output; `text` scans the full
    /// extracted text.
    Search {
        /// The search query string.
        query: String,

        /// Field to search: `title`, `author`, `subject`, `tags`,
        /// `readers`, `readings`, `text`, or `all`.
        #[arg(long, default_value = "all")]
        field: String,

        /// Only documents on this shelf.
        #[arg(long)]
        shelf: Option<String>,
    },

    /// Print a document's Markdown summary.
    Show {
        /// Document id.
        document_id: String,

        /// Print the archived plain text instead of the Markdown summary.
        #[arg(long)]
        raw: bool,
    },

    /// Manage shelves.
    Shelf {
        #[command(subcommand)]
        action: ShelfAction,
    },

    /// Start the JSON HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// `/api` endpoints, including background multipart uploads.
    Serve {
        /// Override the bind address (HOST:PORT).
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Shelf management subcommands.
#[derive(Subcommand)]
enum ShelfAction {
    /// List all shelves, including the virtual Unsorted shelf.
    List,

    /// Create a new shelf. The id is derived from the name.
    Create {
        /// Shelf display name.
        name: String,

        /// Japanese display name.
        #[arg(long, default_value = "")]
        name_ja: String,
    },

    /// Rename a shelf. Renames that change the derived id rewrite every
    /// member document's membership.
    Rename {
        /// Current shelf id.
        shelf_id: String,

        /// New display name.
        new_name: String,

        /// New Japanese display name (unchanged when omitted).
        #[arg(long)]
        name_ja: Option<String>,
    },

    /// Delete a shelf. Member documents become Unsorted.
    Delete {
        /// Shelf id.
        shelf_id: String,
    },

    /// Replace a document's entire shelf membership.
    Assign {
        /// Document id.
        document_id: String,

        /// Shelf ids the document should belong to (empty = Unsorted).
        shelf_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        config::Config::minimal()
    };
    if let Some(root) = cli.library {
        cfg.library.root = root;
    }

    let library = Library::open(&cfg.library.root)?;

    match cli.command {
        Commands::Add {
            file,
            reader,
            shelves,
        } => {
            let choice = reader.unwrap_or_else(|| cfg.readers.default_choice.clone());
            let readers = readers::readers_for(&choice, &cfg.readers)?;
            ingest::run_add(&library, &file, readers, shelves).await?;
        }
        Commands::List {
            format,
            sort,
            shelf,
        } => {
            show::run_list(&library, &format, &sort, shelf.as_deref())?;
        }
        Commands::Search {
            query,
            field,
            shelf,
        } => {
            search::run_search(&library, &query, &field, shelf.as_deref())?;
        }
        Commands::Show { document_id, raw } => {
            show::run_show(&library, &document_id, raw)?;
        }
        Commands::Shelf { action } => match action {
            ShelfAction::List => shelves::run_shelf_list(&library)?,
            ShelfAction::Create { name, name_ja } => {
                shelves::run_shelf_create(&library, &name, &name_ja)?;
            }
            ShelfAction::Rename {
                shelf_id,
                new_name,
                name_ja,
            } => {
                shelves::run_shelf_rename(&library, &shelf_id, &new_name, name_ja.as_deref())?;
            }
            ShelfAction::Delete { shelf_id } => {
                shelves::run_shelf_delete(&library, &shelf_id)?;
            }
            ShelfAction::Assign {
                document_id,
                shelf_ids,
            } => {
                shelves::run_shelf_assign(&library, &document_id, shelf_ids)?;
            }
        },
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg, library).await?;
        }
    }

    Ok(())
}
