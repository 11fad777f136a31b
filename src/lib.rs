//! # chunkseek
//!
//! Retrieval over a document index that stores files as overlapping
//! chunks. Three search modes locate chunks; a reconstructor stitches a
//! file back together from all of its chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐
//! │   CLI    │   │   HTTP   │
//! │ (search, │   │  (tools) │
//! │   get)   │   └────┬─────┘
//! └────┬─────┘        │
//!      └──────┬───────┘
//!             ▼
//!      ┌─────────────┐      ┌────────────┐
//!      │  Services   │─────▶│  Embedder  │ OpenAI / Ollama
//!      └──────┬──────┘      └────────────┘
//!             ▼
//!   ┌───────────────────┐   ┌────────────┐
//!   │ ChunkStoreAccessor│──▶│ OpenSearch │ k-NN, multi_match, regexp, scroll
//!   └───────────────────┘   └────────────┘
//! ```
//!
//! The retrieval logic itself (validation, grouping, reconstruction,
//! response shapes) lives in [`chunkseek_core`] and runs against any
//! [`ChunkStore`](chunkseek_core::store::ChunkStore).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`opensearch`] | OpenSearch-backed chunk store |
//! | [`embedding`] | Embedding providers |
//! | [`services`] | Composition root |
//! | [`tools`] | Tool trait and built-in retrieval tools |
//! | [`server`] | HTTP tool server |
//! | [`search`] | `semantic`, `lexical`, `regex` commands |
//! | [`get`] | `get` command |

pub mod config;
pub mod embedding;
pub mod get;
pub mod logging;
pub mod opensearch;
pub mod search;
pub mod server;
pub mod services;
pub mod tools;
