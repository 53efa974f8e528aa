//! # docsearch
//!
//! Document processing with hybrid keyword + vector retrieval.
//!
//! Documents are uploaded as raw files, parsed into markdown, optionally
//! edited, then ingested: a per-document BM25 keyword record is written
//! and, when dense retrieval is configured, each passage is embedded and
//! upserted into a vector index. Queries fuse both signals, and an LLM
//! can answer from the top passages or summarize a document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌────────────────────────┐
//! │  Upload  │──▶│  Parser  │──▶│ Ingest: BM25 record +  │
//! │ (bytes)  │   │ markdown │   │ embeddings + vectors   │
//! └──────────┘   └──────────┘   └───────────┬────────────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                 ┌──────────┐       ┌──────────────┐
//!                 │   CLI    │       │  HTTP (axum) │
//!                 └──────────┘       └──────────────┘
//! ```
//!
//! The runtime-agnostic engine (tokenizer, keyword records, fusion) lives
//! in the `docsearch-core` crate; this crate supplies storage backends,
//! vendor clients, and the two front ends.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`storage`] | Local directory, S3 and in-memory blob stores |
//! | [`http`] | Vendor HTTP client and retry policy |
//! | [`parser`] | Upload-to-markdown conversion |
//! | [`embedding`] | Embedding providers |
//! | [`vector_db`] | Vector index backends |
//! | [`generation`] | LLM answers, summaries, questions, FAQs |
//! | [`ingest`] | Ingestion pipeline |
//! | [`services`] | Operations shared by the CLI and the server |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI output |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod http;
pub mod ingest;
pub mod parser;
pub mod server;
pub mod services;
pub mod storage;
pub mod vector_db;
