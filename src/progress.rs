//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as each file moves through the pipeline.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr2md::{BatchProgressCallback, PipelineConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, input: &Path, output: &Path, bytes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} -> {} ({bytes} bytes)", input.display(), output.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .api_key("sk-test")
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::Stage;
use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as each file moves through the pipeline.
///
/// Files are processed concurrently, so every per-file method may be called
/// from several threads at once. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, before any task is spawned.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file's task begins (before it queues for OCR).
    fn on_file_start(&self, input: &Path) {
        let _ = input;
    }

    /// Called when a file enters a new stage.
    fn on_stage(&self, input: &Path, stage: Stage) {
        let _ = (input, stage);
    }

    /// Called when a file's output has been committed.
    fn on_file_complete(&self, input: &Path, output: &Path, bytes_written: usize) {
        let _ = (input, output, bytes_written);
    }

    /// Called when a file fails at `stage`.
    fn on_file_error(&self, input: &Path, stage: Stage, error: &str) {
        let _ = (input, stage, error);
    }

    /// Called once after every task reached a terminal state.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
