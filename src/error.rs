//! Crate-wide error taxonomy.
//!
//! One `thiserror` enum per component family, matching the error taxonomy
//! table in the spec one row at a time, plus an aggregate [`ApsError`] that
//! binaries match against at the `anyhow` boundary.

use thiserror::Error;

/// Errors raised while loading or exporting job input/output.
#[derive(Debug, Error)]
pub enum IoStageError {
    /// No text and no input path were supplied.
    #[error("no input: empty text and no path given")]
    NoInput,
    /// Input file could not be read or decoded.
    #[error("failed to read input {path}: {source}")]
    InputRead {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Output could not be written.
    #[error("failed to write output {path}: {source}")]
    OutputWrite {
        /// Path that failed to write.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Requested output format has no registered renderer.
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Errors raised by the chunk processor (C3).
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// A chunk's translation call exceeded its wall-clock timeout.
    #[error("chunk {chunk_id} timed out after {timeout_secs}s")]
    ChunkTimeout {
        /// Chunk id that timed out.
        chunk_id: String,
        /// Configured timeout, seconds.
        timeout_secs: f64,
    },
    /// The translation callable itself returned an error.
    #[error("translation provider error for chunk {chunk_id}: {message}")]
    TranslationProvider {
        /// Chunk id the provider failed on.
        chunk_id: String,
        /// Provider-supplied message.
        message: String,
    },
}

/// Errors raised by the orchestrator (C7) and job handler (C6).
#[derive(Debug, Error)]
pub enum JobError {
    /// Input-stage failure; job fails fast.
    #[error(transparent)]
    Io(#[from] IoStageError),
    /// The whole job exceeded its wall-clock timeout.
    #[error("job timed out after {0}s")]
    Timeout(f64),
    /// The job was cancelled externally.
    #[error("job cancelled")]
    Cancelled,
    /// A stage emitted a contract that failed validation.
    #[error("contract violation in stage {stage}: {violations:?}")]
    ContractViolation {
        /// Stage that produced the invalid contract.
        stage: String,
        /// List of violated rules.
        violations: Vec<String>,
    },
    /// Attempted a state transition not permitted from the current state.
    #[error("invalid job transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Originating state.
        from: crate::job::JobState,
        /// Attempted target state.
        to: crate::job::JobState,
    },
    /// Retry requested but the retry budget is exhausted.
    #[error("retry budget exhausted ({retry_count}/{max_retries})")]
    RetryBudgetExhausted {
        /// Retries already spent.
        retry_count: u32,
        /// Configured maximum.
        max_retries: u32,
    },
}

/// Errors raised by the contract validator (C11).
#[derive(Debug, Error)]
#[error("contract validation failed: {0:?}")]
pub struct ContractValidationError(pub Vec<String>);

/// Errors raised by LaTeX ingest / splitting (C13).
#[derive(Debug, Error)]
pub enum LatexError {
    /// No `.tex` file could be found in the supplied source.
    #[error("no .tex file found in source")]
    NoTexFound,
    /// Archive format not recognized.
    #[error("unrecognized archive extension: {0}")]
    UnknownArchive(String),
    /// Archive extraction failed.
    #[error("archive extraction failed: {0}")]
    Extraction(String),
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by the DOCX/PDF/EPUB renderers (C10).
#[derive(Debug, Error)]
pub enum RenderError {
    /// The requested named template has no cached entry.
    #[error("template missing: {0}")]
    TemplateMissing(String),
    /// Underlying XML serialization failure.
    #[error("xml write error: {0}")]
    Xml(String),
    /// Underlying zip-container failure.
    #[error("archive error: {0}")]
    Archive(String),
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error aggregate for binaries and integration callers.
#[derive(Debug, Error)]
pub enum ApsError {
    /// Job-lifecycle failure.
    #[error(transparent)]
    Job(#[from] JobError),
    /// I/O stage failure.
    #[error(transparent)]
    Io(#[from] IoStageError),
    /// Chunk-processing failure.
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// Contract validation failure.
    #[error(transparent)]
    Contract(#[from] ContractValidationError),
    /// LaTeX ingest/splitter failure.
    #[error(transparent)]
    Latex(#[from] LatexError),
    /// Rendering failure.
    #[error(transparent)]
    Render(#[from] RenderError),
}
