//! Batch-level integration tests.
//!
//! The OCR stage runs real subprocesses (`cat`, `sh -c ...`) so the gate,
//! stdin piping and exit-status handling are exercised for real. The
//! completion service is replaced by an in-process [`CompletionClient`].

use async_trait::async_trait;
use edgequake_ocr2md::pipeline::llm::{Choice, ResponseMessage};
use edgequake_ocr2md::{
    process_file, run_batch, run_batch_sync, BatchProgressCallback, ChatRequest, ChatResponse, CollisionPolicy,
    CompletionClient, EmptyResponsePolicy, FileError, FormatError, Ocr2MdError, OcrCommand, OcrGate,
    PipelineConfig, ProgressCallback, Stage, TaskState,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Answers with `# Formatted\n\n<user text>`; `BADAPI` in the text fails the
/// call; `empty` mode answers with zero choices.
struct FakeClient {
    empty: bool,
    calls: AtomicUsize,
}

impl FakeClient {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            empty: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn empty() -> Arc<Self> {
        Arc::new(Self {
            empty: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionClient for FakeClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, FormatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.temperature, 0.5);

        let text = &request.messages[1].content;
        if text.contains("BADAPI") {
            return Err(FormatError::Transport("service unavailable".into()));
        }
        if self.empty {
            return Ok(ChatResponse::default());
        }
        Ok(ChatResponse {
            choices: vec![Choice {
                message: ResponseMessage {
                    content: Some(format!("# Formatted\n\n{text}")),
                },
            }],
        })
    }
}

fn cat() -> OcrCommand {
    OcrCommand::new("cat", Vec::<String>::new())
}

fn sh(script: &str, args: &[&str]) -> OcrCommand {
    let mut all = vec!["-c".to_string(), script.to_string()];
    all.extend(args.iter().map(|a| a.to_string()));
    OcrCommand::new("sh", all)
}

fn config_with(client: Arc<FakeClient>, ocr: OcrCommand) -> PipelineConfig {
    PipelineConfig::builder()
        .api_key("sk-test")
        .ocr_command(ocr)
        .client(client)
        .build()
        .expect("valid config")
}

fn write_inputs(dir: &TempDir, files: &[(&str, &str)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, content)| {
            let p = dir.path().join(name);
            std::fs::write(&p, content).unwrap();
            p
        })
        .collect()
}

// ── Fan-out / fan-in ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_input_reaches_a_terminal_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = write_inputs(
        &dir,
        &[("a.png", "alpha"), ("b.png", "beta"), ("c.jpg", "gamma")],
    );
    inputs.push(dir.path().join("missing.png"));

    let client = FakeClient::new();
    let config = config_with(client.clone(), cat());
    let report = run_batch(&inputs, &config).await.unwrap();

    assert_eq!(report.total(), 4);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 1);
    assert!(report.outcomes.iter().all(|o| o.state.is_terminal()));

    // Outcomes come back in input order.
    for (outcome, input) in report.outcomes.iter().zip(&inputs) {
        assert_eq!(&outcome.input, input);
    }

    let missing = &report.outcomes[3];
    assert_eq!(missing.state, TaskState::Failed);
    assert!(matches!(
        missing.error,
        Some(FileError::InputUnreadable { .. })
    ));
    assert_eq!(missing.error.as_ref().unwrap().stage(), Stage::Open);
    assert!(!dir.path().join("missing.md").exists());

    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outputs_land_next_to_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("page.one.png", "teh text"), ("notes", "misspeled")]);

    let report = run_batch(&inputs, &config_with(FakeClient::new(), cat()))
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 2);

    let first = dir.path().join("page.one.md");
    assert_eq!(report.outcomes[0].output, first);
    assert_eq!(
        std::fs::read_to_string(&first).unwrap(),
        "# Formatted\n\nteh text"
    );
    assert_eq!(report.outcomes[0].bytes_written, "# Formatted\n\nteh text".len());

    let second = dir.path().join("notes.md");
    assert_eq!(
        std::fs::read_to_string(&second).unwrap(),
        "# Formatted\n\nmisspeled"
    );
}

#[test]
fn sync_wrapper_runs_batch() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("x.png", "sync")]);
    let report = run_batch_sync(&inputs, &config_with(FakeClient::new(), cat())).unwrap();
    assert_eq!(report.succeeded(), 1);
    assert!(dir.path().join("x.md").exists());
}

#[tokio::test]
async fn single_file_shares_caller_gate() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("solo.tiff", "one page")]);
    let client = FakeClient::new();
    let config = config_with(client.clone(), cat());
    let gate = OcrGate::serial();

    let outcome = process_file(&inputs[0], &config, client.as_ref(), &gate).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.output, dir.path().join("solo.md"));
    assert_eq!(gate.available(), 1, "permit released after OCR");
}

// ── Zero choices ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn zero_choices_writes_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("blank.png", "something")]);

    let report = run_batch(&inputs, &config_with(FakeClient::empty(), cat()))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.outcomes[0].state, TaskState::Done);
    let out = dir.path().join("blank.md");
    assert!(out.exists(), "empty output must still be created");
    assert_eq!(std::fs::metadata(&out).unwrap().len(), 0);
}

#[tokio::test]
async fn zero_choices_fails_under_strict_policy() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("blank.png", "something")]);
    let mut config = config_with(FakeClient::empty(), cat());
    config.empty_response = EmptyResponsePolicy::Fail;

    let report = run_batch(&inputs, &config).await.unwrap();
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, TaskState::Failed);
    assert!(matches!(
        outcome.error,
        Some(FileError::Formatting(FormatError::EmptyCompletion))
    ));
    assert!(!dir.path().join("blank.md").exists());
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ocr_failure_only_affects_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(
        &dir,
        &[("good1.png", "fine"), ("bad.png", "FAIL here"), ("good2.png", "also fine")],
    );
    let ocr = sh(
        r#"input=$(cat); case "$input" in *FAIL*) echo "unreadable scan" >&2; exit 7;; esac; printf %s "$input""#,
        &[],
    );

    let report = run_batch(&inputs, &config_with(FakeClient::new(), ocr))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    let bad = &report.outcomes[1];
    assert_eq!(bad.error.as_ref().unwrap().stage(), Stage::Extract);
    let msg = bad.error.as_ref().unwrap().to_string();
    assert!(msg.contains("unreadable scan"), "got: {msg}");

    assert!(!dir.path().join("bad.md").exists());
    assert!(dir.path().join("good1.md").exists());
    assert!(dir.path().join("good2.md").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn formatting_failure_only_affects_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("ok.png", "fine"), ("api.png", "BADAPI")]);

    let report = run_batch(&inputs, &config_with(FakeClient::new(), cat()))
        .await
        .unwrap();

    assert!(report.outcomes[0].is_success());
    let failed = &report.outcomes[1];
    assert_eq!(failed.error.as_ref().unwrap().stage(), Stage::Format);
    assert!(!dir.path().join("api.md").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn write_failure_only_affects_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(
        &dir,
        &[("first.png", "one"), ("blocked.png", "two"), ("third.png", "three")],
    );
    // A directory where the output should go cannot be replaced by a file.
    let blocked = dir.path().join("blocked.md");
    std::fs::create_dir(&blocked).unwrap();

    let report = run_batch(&inputs, &config_with(FakeClient::new(), cat()))
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 2);
    let failed = &report.outcomes[1];
    assert_eq!(failed.state, TaskState::Failed);
    assert!(matches!(failed.error, Some(FileError::Write { .. })), "got {:?}", failed.error);
    assert_eq!(failed.error.as_ref().unwrap().stage(), Stage::Write);
    assert!(blocked.is_dir());

    assert_eq!(
        std::fs::read_to_string(dir.path().join("first.md")).unwrap(),
        "# Formatted\n\none"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("third.md")).unwrap(),
        "# Formatted\n\nthree"
    );

    // No temp files left next to the outputs.
    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        ["blocked.md", "blocked.png", "first.md", "first.png", "third.md", "third.png"]
    );
}

#[tokio::test]
async fn missing_ocr_program_fails_each_file() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("a.png", "x"), ("b.png", "y")]);
    let ocr = OcrCommand::new("no-such-ocr-binary-9341", Vec::<String>::new());

    let report = run_batch(&inputs, &config_with(FakeClient::new(), ocr))
        .await
        .unwrap();
    assert_eq!(report.failed(), 2);
    for o in &report.outcomes {
        assert_eq!(o.error.as_ref().unwrap().stage(), Stage::Extract);
    }
}

// ── OCR serialisation ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn ocr_invocations_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<(String, String)> = (0..8)
        .map(|i| (format!("page{i}.png"), format!("page {i}")))
        .collect();
    let refs: Vec<(&str, &str)> = files
        .iter()
        .map(|(n, c)| (n.as_str(), c.as_str()))
        .collect();
    let inputs = write_inputs(&dir, &refs);

    // `mkdir` is atomic: a second concurrent OCR process would fail to take
    // the lock directory and exit 9.
    let lock = dir.path().join("ocr.lock");
    let ocr = sh(
        r#"mkdir "$0" || exit 9; sleep 0.05; cat; rmdir "$0""#,
        &[lock.to_str().unwrap()],
    );

    let report = run_batch(&inputs, &config_with(FakeClient::new(), ocr))
        .await
        .unwrap();

    for o in &report.outcomes {
        assert!(o.is_success(), "{}: {:?}", o.input.display(), o.error);
    }
    assert!(!lock.exists());
}

// ── Configuration errors ─────────────────────────────────────────────────────

#[tokio::test]
async fn missing_credential_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("a.png", "x")]);
    let marker = dir.path().join("ocr-ran");
    let ocr = sh(r#"touch "$0"; cat"#, &[marker.to_str().unwrap()]);

    let built = PipelineConfig::builder()
        .ocr_command(ocr.clone())
        .client(FakeClient::new())
        .build();
    assert!(matches!(built, Err(Ocr2MdError::MissingApiKey { .. })));

    let mut config = config_with(FakeClient::new(), ocr);
    config.api_key = String::new();
    let err = run_batch(&inputs, &config).await.unwrap_err();
    assert!(matches!(err, Ocr2MdError::MissingApiKey { .. }));

    assert!(!marker.exists(), "no OCR subprocess may run");
    assert!(!dir.path().join("a.md").exists());
}

#[tokio::test]
async fn empty_input_list_is_usage_error() {
    let inputs: Vec<&Path> = Vec::new();
    let err = run_batch(&inputs, &config_with(FakeClient::new(), cat()))
        .await
        .unwrap_err();
    assert!(matches!(err, Ocr2MdError::NoInputs));
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn rerun_produces_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("doc.png", "Same input\nevery time")]);
    let config = config_with(FakeClient::new(), cat());
    let out = dir.path().join("doc.md");

    run_batch(&inputs, &config).await.unwrap();
    let first = std::fs::read(&out).unwrap();
    run_batch(&inputs, &config).await.unwrap();
    let second = std::fs::read(&out).unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

// ── Output collisions ────────────────────────────────────────────────────────

#[tokio::test]
async fn collisions_are_allowed_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("scan.png", "one"), ("scan.jpg", "two")]);

    let report = run_batch(&inputs, &config_with(FakeClient::new(), cat()))
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 2);

    let content = std::fs::read_to_string(dir.path().join("scan.md")).unwrap();
    assert!(
        content == "# Formatted\n\none" || content == "# Formatted\n\ntwo",
        "one complete result must win, got {content:?}"
    );
}

#[tokio::test]
async fn collisions_rejected_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(&dir, &[("scan.png", "one"), ("scan.jpg", "two")]);
    let mut config = config_with(FakeClient::new(), cat());
    config.collisions = CollisionPolicy::Reject;

    let report = run_batch(&inputs, &config).await.unwrap();

    assert!(report.outcomes[0].is_success());
    match &report.outcomes[1].error {
        Some(FileError::OutputCollision { claimed_by, .. }) => {
            assert_eq!(claimed_by, &inputs[0]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(dir.path().join("scan.md")).unwrap(),
        "# Formatted\n\none"
    );
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Counter {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    batch_total: AtomicUsize,
    batch_ok: AtomicUsize,
}

impl BatchProgressCallback for Counter {
    fn on_file_start(&self, _input: &Path) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_complete(&self, _input: &Path, _output: &Path, _bytes: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_file_error(&self, _input: &Path, _stage: Stage, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.batch_total.store(total_files, Ordering::SeqCst);
        self.batch_ok.store(success_count, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn progress_callback_sees_every_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = write_inputs(&dir, &[("a.png", "x"), ("b.png", "BADAPI")]);
    inputs.push(dir.path().join("gone.png"));

    let counter = Arc::new(Counter::default());
    let mut config = config_with(FakeClient::new(), cat());
    let cb: ProgressCallback = counter.clone();
    config.progress_callback = Some(cb);

    run_batch(&inputs, &config).await.unwrap();

    assert_eq!(counter.started.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 1);
    assert_eq!(counter.failed.load(Ordering::SeqCst), 2);
    assert_eq!(counter.batch_total.load(Ordering::SeqCst), 3);
    assert_eq!(counter.batch_ok.load(Ordering::SeqCst), 1);
}
