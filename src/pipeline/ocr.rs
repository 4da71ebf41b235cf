//! OCR extraction: pipe one input file through the external OCR tool.
//!
//! The tool reads the document on stdin and prints the recognised text on
//! stdout. It keeps shared state of its own (models, scratch files), so
//! running several copies at once is unsafe; every invocation therefore
//! holds a slot of an [`OcrGate`] from spawn until exit. Tasks that find
//! the gate full wait in the queue instead of failing.

use crate::error::OcrError;
use std::fs::File;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// The external OCR program and its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl OcrCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for OcrCommand {
    /// `trex -i`: read an image from stdin, print text on stdout.
    fn default() -> Self {
        Self::new("trex", ["-i"])
    }
}

/// Capacity limiter for concurrent OCR invocations.
///
/// Created by the orchestrator once per batch and cloned into every task.
/// Capacity 1 (see [`OcrGate::serial`]) means at most one subprocess runs
/// at any instant. No fairness beyond tokio's semaphore queue is promised.
#[derive(Debug, Clone)]
pub struct OcrGate {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl OcrGate {
    /// A gate admitting one invocation at a time.
    pub fn serial() -> Self {
        Self::with_capacity(1)
    }

    /// A gate admitting up to `capacity` invocations (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    ///
    /// Fails only if the underlying semaphore was closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.slots).acquire_owned().await
    }
}

impl Default for OcrGate {
    fn default() -> Self {
        Self::serial()
    }
}

/// Run the OCR tool with `input` as its stdin and return its stdout.
///
/// Blocks (asynchronously) until a gate slot is free; the slot is held only
/// while the subprocess runs. A spawn failure, a read failure or a non-zero
/// exit status is an [`OcrError`].
pub async fn extract_text(
    cmd: &OcrCommand,
    gate: &OcrGate,
    input: File,
) -> Result<Vec<u8>, OcrError> {
    let _permit = gate.acquire().await.map_err(|e| OcrError::Io {
        program: cmd.program.clone(),
        source: std::io::Error::other(e),
    })?;
    debug!("Running OCR: {} {:?}", cmd.program, cmd.args);

    let child = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::from(input))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| OcrError::Spawn {
            program: cmd.program.clone(),
            source: e,
        })?;

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| OcrError::Io {
            program: cmd.program.clone(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(OcrError::ExitStatus {
            program: cmd.program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    debug!("OCR produced {} bytes", output.stdout.len());
    Ok(output.stdout)
}
