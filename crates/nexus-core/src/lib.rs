//! # Nexus Core
//!
//! Shared, I/O-free logic for Nexus: corpus models, the sliding-window
//! chunker, the extraction quality assessor, the [`store::CorpusStore`]
//! abstraction, similarity ranking, and the embedding/generation traits.
//!
//! This crate contains no tokio, sqlx, filesystem walking, or HTTP code.
//! The `nexus` application crate supplies the SQLite store, PDF extraction,
//! OCR, and provider implementations.

pub mod answer;
pub mod chunk;
pub mod embedding;
pub mod generate;
pub mod models;
pub mod quality;
pub mod search;
pub mod store;
