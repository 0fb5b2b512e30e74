//! # FlowFactor Knowledge Base
//!
//! Document ingestion and retrieval pipeline behind the FlowFactor site's
//! knowledge and chat widgets.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ Callers      │──▶│  Pipeline     │──▶│  SQLite    │
//! │ (name, text) │   │ Chunk+Embed  │   │ FTS5+Vec  │
//! └──────────────┘   └──────────────┘   └────┬──────┘
//!                                           │
//!                        ┌──────────────────┤
//!                        ▼                  ▼
//!                   ┌──────────┐      ┌──────────┐
//!                   │   CLI    │      │   HTTP   │
//!                   │   (kb)   │      │  (axum)  │
//!                   └──────────┘      └──────────┘
//! ```
//!
//! Callers hand over already-extracted `(fileName, text)` pairs; the
//! pipeline chunks, optionally embeds, and stores them, then serves
//! similarity search with a keyword fallback when embeddings are
//! unavailable.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed store error kinds |
//! | [`chunk`] | Overlapping-window text chunking |
//! | [`embedding`] | Embedding provider abstraction + vector math |
//! | [`store`] | Storage trait, SQLite and in-memory backends |
//! | [`search`] | Similarity search with keyword fallback |
//! | [`format`] | Response formatting for chat callers |
//! | [`ingest`] | Ingestion orchestration |
//! | [`embed_cmd`] | Embedding backfill |
//! | [`server`] | HTTP API |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod embed_cmd;
pub mod embedding;
pub mod error;
pub mod format;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
