//! Error types for the edgequake-ocr2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Ocr2MdError`] is **fatal**: the batch cannot start at all (no
//!   credential, no input files, invalid configuration). Returned as
//!   `Err(Ocr2MdError)` from [`crate::batch::run_batch`] before any file is
//!   touched.
//!
//! * [`FileError`] is **non-fatal**: one file failed at one stage (OCR tool
//!   exited non-zero, completion request failed, output not writable) while
//!   every sibling file keeps going. Stored inside
//!   [`crate::output::FileOutcome`] so callers can inspect partial success
//!   instead of losing the whole batch to one bad input.

use crate::output::Stage;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// All fatal errors returned by the edgequake-ocr2md library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::FileOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Ocr2MdError {
    // ── Configuration errors ─────────────────────────────────────────────
    /// The completion-service credential is not set.
    #[error("{var} not set\nExport it before running: export {var}=sk-...")]
    MissingApiKey { var: String },

    /// The batch was started with an empty input list.
    #[error("You must provide one or more files as input")]
    NoInputs,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Batch results ────────────────────────────────────────────────────
    /// Some files succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::BatchReport::into_result`] when the
    /// caller wants to treat any per-file failure as an error.
    #[error("{failed}/{total} files failed during processing")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        total: usize,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of the external OCR subprocess.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The OCR program could not be started (missing binary, permissions).
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the subprocess output failed.
    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The OCR program ran but reported failure.
    #[error("'{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Failure of one completion round trip.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The request body could not be serialised.
    #[error("failed to build completion request: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Connection, TLS or body-transfer failure.
    #[error("completion request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body is not a completion object.
    #[error("failed to decode completion response: {0}")]
    Decode(#[source] serde_json::Error),

    /// The response carried zero choices and the batch is configured to
    /// reject that (see [`crate::config::EmptyResponsePolicy::Fail`]).
    #[error("completion response contained no choices")]
    EmptyCompletion,

    /// Failure reported by a custom [`crate::pipeline::llm::CompletionClient`]
    /// whose transport is not HTTP via reqwest. [`crate::OpenAiClient`] never
    /// returns it.
    #[error("{0}")]
    Transport(String),
}

/// A non-fatal error for a single input file.
///
/// The failing [`Stage`] is recoverable via [`FileError::stage`] so the
/// diagnostic line can name both the file and where it stopped.
#[derive(Debug, Error)]
pub enum FileError {
    /// The input file could not be opened for reading.
    #[error("cannot open input '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// OCR extraction failed.
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    /// The completion service call failed.
    #[error("formatting failed: {0}")]
    Formatting(#[from] FormatError),

    /// The output file could not be created, written or committed.
    #[error("failed to write output file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another input in the same batch maps to the same output path and
    /// the batch rejects collisions.
    #[error("output '{output}' is already claimed by '{claimed_by}'")]
    OutputCollision { output: PathBuf, claimed_by: PathBuf },

    /// The task processing this file panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

impl FileError {
    /// The pipeline stage at which this error stopped the file.
    pub fn stage(&self) -> Stage {
        match self {
            FileError::InputUnreadable { .. } => Stage::Open,
            FileError::Ocr(_) => Stage::Extract,
            FileError::Formatting(_) => Stage::Format,
            FileError::Write { .. } | FileError::OutputCollision { .. } => Stage::Write,
            FileError::TaskPanicked(_) => Stage::Unknown,
        }
    }
}
