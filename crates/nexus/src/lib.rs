//! # Nexus
//!
//! PDF ingestion and grounded retrieval over a versioned SQLite corpus.
//!
//! Nexus walks configured collection roots for PDFs, extracts page text
//! (falling back to OCR when extraction quality is poor), splits it into
//! overlapping windows, embeds every window, and stores documents and
//! chunks transactionally. Queries are answered by cosine-similarity
//! retrieval plus an optional LLM generation step that cites its sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────┐
//! │  Discovery  │──▶│ Extract → OCR → Chunk →  │──▶│  SQLite  │
//! │ walk + hash │   │ Embed (per file, atomic) │   │ + vectors│
//! └─────────────┘   └──────────────────────────┘   └────┬─────┘
//!                                                       │
//!                                     ┌─────────────────┤
//!                                     ▼                 ▼
//!                                ┌──────────┐     ┌──────────┐
//!                                │  search  │     │   ask    │
//!                                └──────────┘     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite [`CorpusStore`](nexus_core::store::CorpusStore) |
//! | [`discover`] | Root walking, filtering, hashing |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`ocr`] | OCR subprocess with timeout and retry |
//! | [`hooks`] | Optional pre/post ingestion scripts |
//! | [`embedding`] | Ollama and OpenAI embedders |
//! | [`generate`] | Ollama generator |
//! | [`ingest`] | Ingestion orchestrator |
//! | [`progress`] | Progress reporting |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod db;
pub mod discover;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod hooks;
pub mod ingest;
pub mod migrate;
pub mod ocr;
pub mod progress;
pub mod sqlite_store;
