//! # Book RAG
//!
//! A local-first engine for asking questions about books and summarizing
//! them, grounded only in the books' own text.
//!
//! Each ingested document gets its own vector collection. Questions are
//! answered from the top-scoring chunks of that collection in a single
//! language-model call; summaries stuff a larger retrieval into one prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Chunk   │──▶│   Embed   │──▶│ Corpus Index │
//! │ PDF/text │   │ per page │   │ (Ollama)  │   │  (SQLite)    │
//! └──────────┘   └──────────┘   └───────────┘   └──────┬───────┘
//!                                                      │
//!                        ┌─────────────────────────────┤
//!                        ▼                             ▼
//!                 ┌─────────────┐               ┌─────────────┐
//!                 │   Answer    │               │  Summarize  │
//!                 │ (qa_k = 5)  │               │ (k = 20)    │
//!                 └─────────────┘               └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bookrag init
//! bookrag ingest ./moby_dick.pdf
//! bookrag ask 1 "Why does Ahab hunt the whale?"
//! bookrag summarize 1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed pipeline failures |
//! | [`models`] | Core data types |
//! | [`extract`] | Page-level text extraction |
//! | [`chunk`] | Overlapping per-page chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Language model abstraction |
//! | [`index`] | Per-book vector collections |
//! | [`retrieve`] | Query embedding and search |
//! | [`answer`] | Grounded question answering |
//! | [`summarize`] | Whole-book summaries |
//! | [`ingest`] | Chunk → embed → build pipeline |
//! | [`catalog`] | Book metadata, history and summaries |
//! | [`library`] | Facade used by the CLI |
//! | [`stats`] | Library overview output |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod answer;
pub mod catalog;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod library;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod stats;
pub mod summarize;
