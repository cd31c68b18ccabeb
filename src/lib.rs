//! Crate root: public surface and module map for the AI Publishing System
//! translation-and-publishing pipeline.
//!
//! This module is the single canonical entry point for downstream users.
//! It re-exports the pieces most callers need (the orchestrator, its
//! request/result types, and the external-collaborator traits) and leaves
//! everything else addressable through its own module path.
//!
//! ## Invariants
//!
//! - **No shared mutable state across jobs** except the template cache
//!   (read-mostly, built once) and the optional translation cache (narrow
//!   `get`/`set`, thread-safe by construction).
//! - **Ordering.** Chunk order in the aggregated result always matches
//!   input order, regardless of completion order; extraction and AST
//!   construction are deterministic given identical input.
//! - **Cancellation is cooperative and idempotent**: `cancel()` causes
//!   queued work to short-circuit; in-flight work completes or times out.
//!
//! These invariants are enforced by design across the submodules. A
//! violation surfaces as a precise, typed error, never a panic in
//! production code paths.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

/// Crate-wide error taxonomy (`thiserror` enums, one per component family).
pub mod error;
/// `JobId`/`ChunkIndex` newtypes.
pub mod ids;
/// Structured logging initialization.
pub mod logging;
/// Pipeline configuration (`Config`, `PhaseWeights`).
pub mod config;
/// External-collaborator traits: `Translator`, `Cache`, `FileIo`.
pub mod interfaces;
/// STEM placeholder codec (C1).
pub mod stem;
/// Paragraph-respecting chunker (C2).
pub mod chunker;
/// Bounded-concurrency chunk processor (C3).
pub mod chunk_processor;
/// Result aggregator (C4).
pub mod aggregator;
/// Phase-weighted progress tracker (C5).
pub mod progress;
/// Job lifecycle state machine (C6).
pub mod job;
/// Top-level pipeline orchestrator (C7).
pub mod orchestrator;
/// Semantic extractor: paragraphs to document nodes (C8).
pub mod semantic;
/// AST builder: document nodes to rendering blocks (C9).
pub mod ast;
/// Output rendering: AST to DOCX/PDF/EPUB (C10).
pub mod render;
/// Inter-stage contracts and their validator (C11).
pub mod contracts;
/// Post-translation terminology polisher (C12).
pub mod polish;
/// LaTeX source ingest and equation splitter (C13).
pub mod latex;

pub use config::Config;
pub use error::ApsError;
pub use ids::{ChunkIndex, JobId};
pub use interfaces::{Cache, FileIo, Translator};
pub use job::JobState;
pub use orchestrator::{Orchestrator, OrchestratorRequest, OrchestratorResult};
