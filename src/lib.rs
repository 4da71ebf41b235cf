//! # edgequake-ocr2md
//!
//! Batch-convert scanned documents to Markdown: an external OCR tool
//! extracts the text, a chat-completion model fixes spelling, grammar and
//! layout, and the result lands next to the input as `<name>.md`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! FILES (one task each, all concurrent)
//!  │
//!  ├─ 1. Open     read the input file
//!  ├─ 2. OCR      `trex -i` < file   (one subprocess at a time, process-wide)
//!  ├─ 3. Format   POST /v1/chat/completions (system prompt + OCR text)
//!  └─ 4. Write    <name>.md via temp file + rename
//! ```
//!
//! A failing file stops at its failing stage and is reported; every other
//! file carries on. [`run_batch`] returns after all files reached a
//! terminal state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr2md::{run_batch, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY; fails here, before any file is touched, if unset.
//!     let config = PipelineConfig::builder().api_key_from_env().build()?;
//!     let report = run_batch(&["scan-1.png", "scan-2.png"], &config).await?;
//!     for outcome in report.failures() {
//!         eprintln!("{}: {:?}", outcome.input.display(), outcome.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2md` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{process_file, run_batch, run_batch_sync};
pub use config::{
    CollisionPolicy, EmptyResponsePolicy, ErrorStatusPolicy, PipelineConfig, PipelineConfigBuilder,
};
pub use error::{FileError, FormatError, Ocr2MdError, OcrError};
pub use output::{BatchReport, FileOutcome, FileTask, Stage, TaskState};
pub use pipeline::llm::{ChatMessage, ChatRequest, ChatResponse, CompletionClient, OpenAiClient};
pub use pipeline::ocr::{OcrCommand, OcrGate};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
