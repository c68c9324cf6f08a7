//! # RAG server
//!
//! Local document ingestion and semantic retrieval, served to AI clients
//! over the Model Context Protocol.
//!
//! Documents in a data directory (or ingested one at a time) are split into
//! overlapping chunks, embedded, and stored in a persistent vector store.
//! Clients query the store in natural language and get back the closest
//! passages with their source and similarity score.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Data dir /  │──▶│   Ingestor   │──▶│ StoreAdapter │
//! │ single file │   │ parse+chunk  │   │ SQLite+embed │
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │
//!                                       ┌─────▼──────┐
//!                                       │ RagService │
//!                                       └─────┬──────┘
//!                          ┌──────────────────┤
//!                          ▼                  ▼
//!                    ┌──────────┐      ┌─────────────┐
//!                    │   CLI    │      │ MCP bridge  │
//!                    │          │      │ stdio/http  │
//!                    └──────────┘      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment snapshot |
//! | [`paths`] | Data and store directory resolution |
//! | [`chunk`] | Word-boundary-aware text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`store`] | Vector store engines and the collection adapter |
//! | [`parser`] | External and local parsers for binary documents |
//! | [`extract`] | Local PDF and OOXML text extraction |
//! | [`ingest`] | File routing, discovery and the ingestion pipeline |
//! | [`retrieval`] | Result, listing and status formatting |
//! | [`service`] | The operations exposed to clients |
//! | [`tools`] | Tool trait and registry |
//! | [`mcp`] | rmcp `ServerHandler` implementation |
//! | [`server`] | stdio and streamable HTTP transports |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod mcp;
pub mod models;
pub mod parser;
pub mod paths;
pub mod retrieval;
pub mod server;
pub mod service;
pub mod store;
pub mod tools;
