//! # docrag core
//!
//! Runtime-agnostic building blocks for docrag: data models, the error
//! taxonomy, the overlapping chunker, embedding and completion provider
//! traits, the vector index abstraction with an in-memory flat index,
//! document/session store traits, and prompt assembly.
//!
//! This crate contains no tokio, sqlx, or network dependencies. Concrete
//! provider clients, SQLite backends, and the HTTP server live in the
//! `docrag` application crate.

pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod prompt;
pub mod store;

pub use error::{RagError, RagResult};
