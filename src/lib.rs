//! # Doc Shelf
//!
//! A personal document library for PDF and EML files.
//!
//! Doc Shelf extracts text and metadata from source files, optionally
//! enriches them with structured readings from external LLM CLIs, and keeps
//! a searchable catalog organized into user-defined shelves. Everything
//! lives as plain JSON, Markdown, and text files under a library root.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Extractors │──▶│   Pipeline    │──▶│ Library root  │
//! │  PDF / EML │   │ read + save  │   │ JSON/MD/text  │
//! └────────────┘   └──────────────┘   └──────┬────────┘
//!                                            │
//!                          ┌─────────────────┤
//!                          ▼                 ▼
//!                     ┌─────────┐      ┌──────────┐
//!                     │   CLI   │      │   HTTP   │
//!                     │ (shelf) │      │  (/api)  │
//!                     └─────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf add paper.pdf --reader claude   # ingest and enrich
//! shelf list --sort date                # browse the catalog
//! shelf search "merger" --field text    # full-text search
//! shelf shelf create "Finance" --name-ja 財務
//! shelf serve                           # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`slug`] | Identifier derivation |
//! | [`store`] | Per-document record and artifact store |
//! | [`index`] | Catalog index and library facade |
//! | [`shelves`] | Shelf CRUD and membership |
//! | [`search`] | Field-scoped substring search |
//! | [`extract`] | PDF and EML extraction |
//! | [`readers`] | External LLM reader CLIs |
//! | [`ingest`] | Extract → read → save pipeline |
//! | [`tasks`] | Background task registry |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod models;
pub mod readers;
pub mod search;
pub mod server;
pub mod shelves;
pub mod show;
pub mod slug;
pub mod store;
pub mod tasks;
