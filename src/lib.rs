//! # Policy Assistant
//!
//! Answers employee HR and IT policy questions from locally indexed policy
//! documents. A question is classified into a domain, matched against that
//! domain's policy chunks, and answered by a language model that may only
//! use the retrieved text. When the domain is unclear or nothing relevant is
//! found, the assistant asks for clarification instead of guessing.
//!
//! ## Architecture
//!
//! ```text
//!  ingest (offline)
//!  ┌────────────┐   ┌─────────┐   ┌──────────────┐
//!  │ policy .md │──▶│ Chunker │──▶│ VectorIndex  │
//!  └────────────┘   └─────────┘   │   (SQLite)   │
//!                                 └──────┬───────┘
//!  query (online)                        │
//!  ┌──────────┐   ┌────────────┐   ┌─────▼─────┐   ┌───────────┐
//!  │ question │──▶│ Classifier │──▶│ retrieve  │──▶│ Generator │──▶ ChatAnswer
//!  └──────────┘   └────────────┘   │ dedup/rank│   └───────────┘
//!                                  └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Heading-scoped windowed chunking |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`index`] | Vector index trait, SQLite and in-memory backends |
//! | [`classifier`] | HR/IT domain classification |
//! | [`generator`] | Prompt building and inference backends |
//! | [`pipeline`] | Per-request orchestration |
//! | [`error`] | Pipeline failure kinds |
//! | [`identity`] | Bearer-token verification |
//! | [`logging`] | Subscriber setup and answer records |
//! | [`ingest`] | Offline ingestion |
//! | [`services`] | Startup wiring of shared handles |
//! | [`server`] | HTTP boundary |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod classifier;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod identity;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod services;
pub mod sources;
