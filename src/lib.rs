//! # docrag
//!
//! A retrieval-augmented generation backend: upload documents, split them
//! into overlapping chunks, embed the chunks into a vector index, and
//! answer questions with a completion model grounded on the most relevant
//! chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Ingest       │──▶│ Vector index │
//! │ (HTTP/CLI)│  │ Chunk+Embed  │   │ memory/SQLite│
//! └────┬─────┘   └──────────────┘   └──────┬───────┘
//!      │                                   │
//!      ▼                                   ▼
//! ┌──────────┐                      ┌──────────────┐
//! │ Document │                      │ Query handler│──▶ completion
//! │  store   │                      │ top-k+prompt │
//! └──────────┘                      └──────────────┘
//! ```
//!
//! Runtime-agnostic pieces (chunker, index trait and flat index, prompt
//! assembly, error taxonomy) live in the `docrag-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! docrag init                          # create database (sqlite backends)
//! docrag ingest ./notes.txt            # upload and index a file
//! docrag ask "what color is the fox?"  # answer from the index
//! docrag serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`retry`] | Timeout and single-retry call policy |
//! | [`embedding`] | OpenAI / Ollama / hashing embedders |
//! | [`completion`] | OpenAI / Ollama completion clients |
//! | [`sqlite_index`] | SQLite-backed vector index |
//! | [`stores`] | Filesystem, S3, and SQLite stores |
//! | [`ingest`] | Ingestion pipeline |
//! | [`answer`] | Retrieval-augmented query handler |
//! | [`upload`] | Upload sessions |
//! | [`services`] | Component wiring |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod retry;
pub mod server;
pub mod services;
pub mod sqlite_index;
pub mod stores;
pub mod upload;
