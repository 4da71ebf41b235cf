//! Per-file task state and batch results.
//!
//! A [`FileTask`] is created for every input path when the batch starts and
//! is owned by exactly one spawned task until its pipeline finishes. What
//! survives the task is a [`FileOutcome`]; the orchestrator collects one per
//! input into a [`BatchReport`].

use crate::error::{FileError, Ocr2MdError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle of one [`FileTask`].
///
/// Transitions are strictly forward:
/// `Pending → Extracting → Formatting → Writing → Done`, with `Failed`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Extracting,
    Formatting,
    Writing,
    Done,
    Failed,
}

impl TaskState {
    /// `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// A pipeline stage, used to label failures and progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Opening the input file.
    Open,
    /// Running the OCR subprocess.
    Extract,
    /// Calling the completion service.
    Format,
    /// Committing the output file.
    Write,
    /// The task died without reporting a stage (panic).
    Unknown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Open => "open",
            Stage::Extract => "ocr",
            Stage::Format => "format",
            Stage::Write => "write",
            Stage::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One unit of work: a single input file and where its Markdown goes.
#[derive(Debug)]
pub struct FileTask {
    input: PathBuf,
    output: PathBuf,
    state: TaskState,
}

impl FileTask {
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            state: TaskState::Pending,
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Move to `next`. Terminal states are sticky.
    pub(crate) fn advance(&mut self, next: TaskState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }

    /// Consume the task into its outcome.
    pub(crate) fn finish(
        mut self,
        result: Result<usize, FileError>,
        duration_ms: u64,
    ) -> FileOutcome {
        match result {
            Ok(bytes_written) => {
                self.advance(TaskState::Done);
                FileOutcome {
                    input: self.input,
                    output: self.output,
                    state: self.state,
                    bytes_written,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                self.advance(TaskState::Failed);
                FileOutcome {
                    input: self.input,
                    output: self.output,
                    state: self.state,
                    bytes_written: 0,
                    duration_ms,
                    error: Some(e),
                }
            }
        }
    }
}

/// Terminal result of one file's pipeline.
#[derive(Debug)]
pub struct FileOutcome {
    /// Input path as supplied by the caller.
    pub input: PathBuf,
    /// Derived output path (written only when `error` is `None`).
    pub output: PathBuf,
    /// Always `Done` or `Failed`.
    pub state: TaskState,
    /// Bytes committed to `output`. Zero on failure, and also zero on
    /// success when the service returned no choices.
    pub bytes_written: usize,
    /// Wall-clock time spent in the pipeline, including waiting for the
    /// OCR gate.
    pub duration_ms: u64,
    /// Why the file failed, if it did.
    pub error: Option<FileError>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One outcome per input, in input order.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    /// Wall-clock time from fan-out to fan-in.
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Iterate over the failed outcomes only.
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Treat any per-file failure as a batch error.
    pub fn into_result(self) -> Result<Self, Ocr2MdError> {
        let failed = self.failed();
        if failed == 0 {
            Ok(self)
        } else {
            Err(Ocr2MdError::PartialFailure {
                succeeded: self.succeeded(),
                failed,
                total: self.total(),
            })
        }
    }
}
