//! # chunkseek core
//!
//! Backend-agnostic retrieval logic for chunked document corpora: the chunk
//! data model, the [`store::ChunkStore`] backend trait and its
//! [`accessor::ChunkStoreAccessor`], full-text reconstruction from
//! overlapping chunks, the semantic / lexical / regex / content retrieval
//! operations, and the response envelopes they return.
//!
//! This crate contains no tokio, HTTP client, or filesystem dependencies.
//! Concrete backends (OpenSearch) and embedding providers live in the
//! `chunkseek` application crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | `Chunk`, `ChunkHit`, `ChunkPage` |
//! | [`error`] | `RetrievalError` taxonomy |
//! | [`cancel`] | Cooperative cancellation token |
//! | [`store`] | `ChunkStore` trait and in-memory implementation |
//! | [`accessor`] | Validated query issuing and transparent paging |
//! | [`reconstruct`] | Overlap-aware full-text reconstruction |
//! | [`embedding`] | `Embedder` trait and vector helpers |
//! | [`search`] | Semantic, lexical, regex, and content operations |
//! | [`format`] | Response envelopes |

pub mod accessor;
pub mod cancel;
pub mod embedding;
pub mod error;
pub mod format;
pub mod models;
pub mod reconstruct;
pub mod search;
pub mod store;

pub use error::{ErrorKind, RetrievalError};
