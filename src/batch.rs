//! Batch orchestration: one concurrent pipeline per input file.
//!
//! Every input becomes a [`FileTask`] driven through
//! open → OCR → format → write on its own tokio task. Tasks share three
//! things only: the read-only [`PipelineConfig`], the completion client,
//! and the [`OcrGate`] that serialises OCR subprocesses. A failure stops
//! its own file and is recorded in that file's [`FileOutcome`]; siblings
//! keep running. [`run_batch`] returns once every task reached a terminal
//! state.

use crate::config::{CollisionPolicy, PipelineConfig};
use crate::error::{FileError, Ocr2MdError};
use crate::output::{BatchReport, FileOutcome, FileTask, Stage, TaskState};
use crate::pipeline::llm::{self, CompletionClient, OpenAiClient};
use crate::pipeline::ocr::{self, OcrGate};
use crate::pipeline::write;
use crate::progress::ProgressCallback;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process every file in `inputs` concurrently and wait for all of them.
///
/// # Returns
/// `Ok(BatchReport)` once every file finished, even if some failed
/// (check [`BatchReport::failed`] or call [`BatchReport::into_result`]).
///
/// # Errors
/// Returns `Err(Ocr2MdError)` only for fatal errors, before any file is
/// touched:
/// - `inputs` is empty
/// - the credential is missing
/// - the HTTP client cannot be initialised
pub async fn run_batch<P: AsRef<Path>>(
    inputs: &[P],
    config: &PipelineConfig,
) -> Result<BatchReport, Ocr2MdError> {
    let total_start = Instant::now();

    if inputs.is_empty() {
        return Err(Ocr2MdError::NoInputs);
    }
    if config.api_key.trim().is_empty() {
        return Err(Ocr2MdError::MissingApiKey {
            var: crate::prompts::API_KEY_ENV.to_string(),
        });
    }

    let client = resolve_client(config)?;
    let gate = OcrGate::with_capacity(config.ocr_concurrency);
    let config = Arc::new(config.clone());
    let total = inputs.len();
    info!(
        "Starting batch: {} files, OCR capacity {}",
        total,
        gate.capacity()
    );

    let tasks: Vec<FileTask> = inputs
        .iter()
        .map(|p| {
            let input = p.as_ref().to_path_buf();
            let output = write::output_path_for(&input, &config.output_extension);
            FileTask::new(input, output)
        })
        .collect();
    let rejected = find_collisions(&tasks, config.collisions);

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    // ── Fan out ──────────────────────────────────────────────────────────
    let mut slots: Vec<Option<FileOutcome>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);
    let mut paths: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(total);
    let mut running = FuturesUnordered::new();

    for (idx, task) in tasks.into_iter().enumerate() {
        paths.push((task.input().to_path_buf(), task.output().to_path_buf()));

        if let Some(claimed_by) = rejected.get(&idx) {
            let err = FileError::OutputCollision {
                output: task.output().to_path_buf(),
                claimed_by: claimed_by.clone(),
            };
            report_failure(config.progress_callback.as_ref(), task.input(), &err);
            slots[idx] = Some(task.finish(Err(err), 0));
            continue;
        }

        let config = Arc::clone(&config);
        let client = Arc::clone(&client);
        let gate = gate.clone();
        let handle = tokio::spawn(async move {
            process_task(task, &config, client.as_ref(), &gate).await
        });
        running.push(async move { (idx, handle.await) });
    }

    // ── Fan in ───────────────────────────────────────────────────────────
    while let Some((idx, joined)) = running.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                let (input, output) = paths[idx].clone();
                let err = FileError::TaskPanicked(e.to_string());
                report_failure(config.progress_callback.as_ref(), &input, &err);
                FileTask::new(input, output).finish(Err(err), 0)
            }
        };
        slots[idx] = Some(outcome);
    }

    let outcomes: Vec<FileOutcome> = slots
        .into_iter()
        .zip(paths)
        .map(|(slot, (input, output))| {
            slot.unwrap_or_else(|| {
                FileTask::new(input, output).finish(
                    Err(FileError::TaskPanicked("task produced no outcome".into())),
                    0,
                )
            })
        })
        .collect();

    let report = BatchReport {
        outcomes,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} files, {}ms total",
        report.succeeded(),
        report.total(),
        report.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(report.total(), report.succeeded());
    }

    Ok(report)
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a multi-thread tokio runtime internally.
pub fn run_batch_sync<P: AsRef<Path>>(
    inputs: &[P],
    config: &PipelineConfig,
) -> Result<BatchReport, Ocr2MdError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Ocr2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(inputs, config))
}

/// Run the full pipeline for a single file.
///
/// Never returns an error: failures are recorded in the outcome. The
/// caller supplies the client and gate so several calls can share them.
pub async fn process_file(
    input: impl Into<PathBuf>,
    config: &PipelineConfig,
    client: &dyn CompletionClient,
    gate: &OcrGate,
) -> FileOutcome {
    let input = input.into();
    let output = write::output_path_for(&input, &config.output_extension);
    process_task(FileTask::new(input, output), config, client, gate).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn process_task(
    mut task: FileTask,
    config: &PipelineConfig,
    client: &dyn CompletionClient,
    gate: &OcrGate,
) -> FileOutcome {
    let start = Instant::now();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_file_start(task.input());
    }

    let result = run_stages(&mut task, config, client, gate).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match &result {
        Ok(bytes) => {
            info!(
                "Created {} from {} ({} bytes, {}ms)",
                task.output().display(),
                task.input().display(),
                bytes,
                duration_ms
            );
            if let Some(cb) = cb {
                cb.on_file_complete(task.input(), task.output(), *bytes);
            }
        }
        Err(e) => report_failure(cb, task.input(), e),
    }

    task.finish(result, duration_ms)
}

async fn run_stages(
    task: &mut FileTask,
    config: &PipelineConfig,
    client: &dyn CompletionClient,
    gate: &OcrGate,
) -> Result<usize, FileError> {
    let cb = config.progress_callback.as_ref();

    // ── Stage 1: Open input ──────────────────────────────────────────────
    enter_stage(task, cb, TaskState::Pending, Stage::Open);
    info!("Reading file {}", task.input().display());
    let file = tokio::fs::File::open(task.input())
        .await
        .map_err(|e| FileError::InputUnreadable {
            path: task.input().to_path_buf(),
            source: e,
        })?
        .into_std()
        .await;

    // ── Stage 2: OCR (serialised through the gate) ───────────────────────
    enter_stage(task, cb, TaskState::Extracting, Stage::Extract);
    let extracted = ocr::extract_text(&config.ocr, gate, file).await?;

    // ── Stage 3: Format via completion service ───────────────────────────
    enter_stage(task, cb, TaskState::Formatting, Stage::Format);
    let formatted = llm::format_text(client, config, &extracted).await?;

    // ── Stage 4: Commit output ───────────────────────────────────────────
    enter_stage(task, cb, TaskState::Writing, Stage::Write);
    write::write_output(task.output(), formatted.into_bytes()).await
}

fn enter_stage(
    task: &mut FileTask,
    cb: Option<&ProgressCallback>,
    state: TaskState,
    stage: Stage,
) {
    task.advance(state);
    debug!("{}: entering {} stage", task.input().display(), stage);
    if let Some(cb) = cb {
        cb.on_stage(task.input(), stage);
    }
}

fn report_failure(cb: Option<&ProgressCallback>, input: &Path, err: &FileError) {
    let stage = err.stage();
    warn!("{}: {} stage failed: {}", input.display(), stage, err);
    if let Some(cb) = cb {
        cb.on_file_error(input, stage, &err.to_string());
    }
}

/// Use the caller's client if one was injected, else build the HTTP client.
fn resolve_client(config: &PipelineConfig) -> Result<Arc<dyn CompletionClient>, Ocr2MdError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    let client = OpenAiClient::from_config(config)
        .map_err(|e| Ocr2MdError::Internal(format!("Failed to create HTTP client: {e}")))?;
    Ok(Arc::new(client))
}

/// Find tasks whose output path was already claimed by an earlier task.
///
/// Collisions are always logged. Under [`CollisionPolicy::Reject`] the
/// returned map holds, for each losing task index, the input that claimed
/// the path first; under [`CollisionPolicy::Allow`] it is empty.
fn find_collisions(tasks: &[FileTask], policy: CollisionPolicy) -> HashMap<usize, PathBuf> {
    let mut claimed: HashMap<&Path, &Path> = HashMap::new();
    let mut rejected = HashMap::new();

    for (idx, task) in tasks.iter().enumerate() {
        match claimed.get(task.output()) {
            Some(&first) => {
                warn!(
                    "{} and {} both map to {}",
                    first.display(),
                    task.input().display(),
                    task.output().display()
                );
                if policy == CollisionPolicy::Reject {
                    rejected.insert(idx, first.to_path_buf());
                }
            }
            None => {
                claimed.insert(task.output(), task.input());
            }
        }
    }

    rejected
}
