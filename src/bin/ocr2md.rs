//! CLI binary for edgequake-ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the batch and prints one line per file.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr2md::prompts::{DEFAULT_API_URL, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use edgequake_ocr2md::{
    run_batch, BatchProgressCallback, CollisionPolicy, EmptyResponsePolicy, ErrorStatusPolicy,
    OcrCommand, PipelineConfig, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback ────────────────────────────────────────────────────

const BAR_TEMPLATE: &str = "{spinner:.cyan} {prefix:.bold}  \
     [{bar:42.green/238}] {pos:>3}/{len} files  \
     ⏱ {elapsed_precise}  {wide_msg:.dim}";

/// Prints `Created <output> from <input>` on stdout for every committed file
/// and one diagnostic line on stderr for every failure. When a bar is
/// active, lines are printed above it.
///
/// The bar stays hidden until the batch starts, so a fatal configuration
/// error is the only thing printed when the run cannot begin.
struct CliProgressCallback {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl CliProgressCallback {
    fn new(show_bar: bool, quiet: bool) -> Arc<Self> {
        let bar = show_bar.then(|| {
            let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
            let style = ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.set_prefix("Formatting");
            bar
        });

        Arc::new(Self { bar, quiet })
    }

    fn emit(&self, f: impl FnOnce()) {
        match self.bar {
            Some(ref bar) => bar.suspend(f),
            None => f(),
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        if let Some(ref bar) = self.bar {
            bar.set_length(total_files as u64);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            bar.enable_steady_tick(Duration::from_millis(80));
        }
    }

    fn on_stage(&self, input: &Path, stage: Stage) {
        if let Some(ref bar) = self.bar {
            if stage == Stage::Extract {
                bar.set_message(format!("{}", input.display()));
            }
        }
    }

    fn on_file_complete(&self, input: &Path, output: &Path, _bytes_written: usize) {
        if !self.quiet {
            self.emit(|| println!("Created {} from {}", output.display(), input.display()));
        }
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    fn on_file_error(&self, input: &Path, stage: Stage, error: &str) {
        self.emit(|| {
            eprintln!(
                "{} {}  {}  {}",
                red("✗"),
                input.display(),
                dim(&format!("[{stage}]")),
                red(error),
            )
        });
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
        if self.quiet {
            return;
        }

        let failed = total_files.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} files formatted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files formatted  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Format every scan next to itself (scan-1.png → scan-1.md)
  ocr2md scan-1.png scan-2.png

  # Use tesseract instead of trex (a custom program gets no implied -i)
  ocr2md --ocr-program tesseract --ocr-arg stdin --ocr-arg stdout page.png

  # Custom instruction and model
  ocr2md --sysprompt "Fix typos only. Return markdown." --model gpt-4o *.png

  # Treat an empty completion or an HTTP error as a failure, exit non-zero on any failure
  ocr2md --fail-on-empty --reject-error-status --strict receipts/*.jpg

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Completion-service credential (required)
  OCR2MD_MODEL            Override model ID
  OCR2MD_API_URL          Override chat-completions endpoint
  OCR2MD_OCR_PROGRAM      Override OCR program
  RUST_LOG                Override log filter
"#;

/// OCR documents and reformat the text to Markdown with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "OCR documents and reformat the text to Markdown with an LLM",
    long_about = "Runs each input file through an external OCR program, sends the extracted \
text to a chat-completion model for spellchecking and formatting, and writes the result next \
to the input with a .md extension. Files are processed concurrently; OCR runs one file at a time.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files.
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// System instruction sent to the model.
    #[arg(
        long,
        visible_alias = "system-prompt",
        env = "OCR2MD_SYSPROMPT",
        default_value = DEFAULT_SYSTEM_PROMPT,
        hide_default_value = true
    )]
    sysprompt: String,

    /// Model ID.
    #[arg(long, env = "OCR2MD_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Chat-completions endpoint.
    #[arg(long, env = "OCR2MD_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// OCR program; reads the document on stdin, prints text on stdout.
    #[arg(long, env = "OCR2MD_OCR_PROGRAM", default_value = "trex")]
    ocr_program: String,

    /// Argument passed to the OCR program (repeatable). Default: `-i` for
    /// the default program, none for any other.
    #[arg(long = "ocr-arg", allow_hyphen_values = true)]
    ocr_args: Vec<String>,

    /// Run the OCR program without arguments.
    #[arg(long, conflicts_with = "ocr_args")]
    no_ocr_args: bool,

    /// Maximum OCR processes running at once.
    #[arg(long, env = "OCR2MD_OCR_CONCURRENCY", default_value_t = 1)]
    ocr_concurrency: usize,

    /// Output extension (without the dot).
    #[arg(long, env = "OCR2MD_EXT", default_value = "md")]
    ext: String,

    /// Fail a file when the model returns no choices instead of writing an empty file.
    #[arg(long, env = "OCR2MD_FAIL_ON_EMPTY")]
    fail_on_empty: bool,

    /// Fail a file when the service answers with a non-2xx status instead of
    /// decoding the body.
    #[arg(long, env = "OCR2MD_REJECT_ERROR_STATUS")]
    reject_error_status: bool,

    /// Fail later inputs that map to an output path already claimed in this batch.
    #[arg(long, env = "OCR2MD_REJECT_COLLISIONS")]
    reject_collisions: bool,

    /// Exit non-zero if any file failed.
    #[arg(long, env = "OCR2MD_STRICT")]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCR2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The callback prints the per-file lines; library logs stay at ERROR
    // unless -v is given.
    let filter = if cli.verbose { "debug" } else { "error" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config (fatal errors surface here, before any file) ────────
    let mut config = build_config(&cli)?;
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let progress: ProgressCallback = CliProgressCallback::new(show_progress, cli.quiet);
    config.progress_callback = Some(progress);

    // ── Run batch ────────────────────────────────────────────────────────
    let report = run_batch(&cli.files, &config)
        .await
        .context("Batch could not start")?;

    if cli.verbose {
        eprintln!(
            "{}",
            dim(&format!(
                "{}/{} files in {}ms",
                report.succeeded(),
                report.total(),
                report.total_duration_ms
            ))
        );
    }

    if cli.strict {
        report
            .into_result()
            .context("Batch finished with failures")?;
    }

    Ok(())
}

/// OCR command from the CLI args. `-i` is implied only for the default
/// program when no `--ocr-arg` is given.
fn ocr_command(cli: &Cli) -> OcrCommand {
    let default = OcrCommand::default();
    let args = if cli.no_ocr_args {
        Vec::new()
    } else if cli.ocr_args.is_empty() && cli.ocr_program == default.program {
        default.args
    } else {
        cli.ocr_args.clone()
    };
    OcrCommand::new(cli.ocr_program.as_str(), args)
}

/// Map CLI args to `PipelineConfig`. The progress callback is attached by
/// the caller once the config is valid.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let empty_response = if cli.fail_on_empty {
        EmptyResponsePolicy::Fail
    } else {
        EmptyResponsePolicy::WriteEmpty
    };
    let error_status = if cli.reject_error_status {
        ErrorStatusPolicy::Reject
    } else {
        ErrorStatusPolicy::Decode
    };
    let collisions = if cli.reject_collisions {
        CollisionPolicy::Reject
    } else {
        CollisionPolicy::Allow
    };

    PipelineConfig::builder()
        .api_key_from_env()
        .api_url(cli.api_url.as_str())
        .model(cli.model.as_str())
        .system_prompt(cli.sysprompt.as_str())
        .ocr_command(ocr_command(cli))
        .ocr_concurrency(cli.ocr_concurrency)
        .output_extension(cli.ext.as_str())
        .empty_response(empty_response)
        .error_status(error_status)
        .collisions(collisions)
        .build()
        .context("Invalid configuration")
}
