//! Configuration for a batch run.
//!
//! Every knob lives in [`PipelineConfig`], built once through
//! [`PipelineConfigBuilder`] before any file is processed and then shared
//! read-only (behind an `Arc`) by every per-file task. Nothing in the
//! pipeline reads the environment after `build()` returns.

use crate::error::Ocr2MdError;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::ocr::OcrCommand;
use crate::progress::ProgressCallback;
use crate::prompts::{API_KEY_ENV, DEFAULT_API_URL, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use std::fmt;
use std::sync::Arc;

/// Configuration for one batch.
///
/// # Example
/// ```rust
/// use edgequake_ocr2md::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .api_key("sk-test")
///     .model("gpt-4")
///     .ocr_program("tesseract")
///     .ocr_args(["stdin", "stdout"])
///     .build()
///     .unwrap();
/// assert_eq!(config.output_extension, "md");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Bearer credential for the completion service. Never empty.
    pub api_key: String,

    /// Chat-completions endpoint. Default: OpenAI.
    pub api_url: String,

    /// Model identifier. Default: `gpt-4`.
    pub model: String,

    /// System instruction sent before each extracted text.
    pub system_prompt: String,

    /// External OCR program and its arguments. Default: `trex -i`.
    pub ocr: OcrCommand,

    /// How many OCR subprocesses may run at once. Default: 1.
    ///
    /// The OCR tool manages shared state internally, so the default
    /// serialises it process-wide. Raise only for tools known to be safe.
    pub ocr_concurrency: usize,

    /// Extension (without the dot) given to output files. Default: `md`.
    pub output_extension: String,

    /// What to do when the service answers with zero choices.
    pub empty_response: EmptyResponsePolicy,

    /// What to do when two inputs map to the same output path.
    pub collisions: CollisionPolicy,

    /// What the HTTP client does with a non-2xx answer.
    pub error_status: ErrorStatusPolicy,

    /// Pre-constructed completion client. Takes precedence over the
    /// built-in HTTP client.
    pub client: Option<Arc<dyn CompletionClient>>,

    /// Optional per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("ocr", &self.ocr)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("output_extension", &self.output_extension)
            .field("empty_response", &self.empty_response)
            .field("collisions", &self.collisions)
            .field("error_status", &self.error_status)
            .field("client", &self.client.as_ref().map(|_| "<dyn CompletionClient>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder with every default filled in except the
    /// credential.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self {
                api_key: String::new(),
                api_url: DEFAULT_API_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                ocr: OcrCommand::default(),
                ocr_concurrency: 1,
                output_extension: "md".to_string(),
                empty_response: EmptyResponsePolicy::default(),
                collisions: CollisionPolicy::default(),
                error_status: ErrorStatusPolicy::default(),
                client: None,
                progress_callback: None,
            },
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Read the credential from `OPENAI_API_KEY`. Leaves the key unset when
    /// the variable is missing, so `build()` reports it.
    pub fn api_key_from_env(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            self.config.api_key = key;
        }
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn ocr_command(mut self, cmd: OcrCommand) -> Self {
        self.config.ocr = cmd;
        self
    }

    pub fn ocr_program(mut self, program: impl Into<String>) -> Self {
        self.config.ocr.program = program.into();
        self
    }

    pub fn ocr_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ocr.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n;
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.output_extension = ext.into();
        self
    }

    pub fn empty_response(mut self, policy: EmptyResponsePolicy) -> Self {
        self.config.empty_response = policy;
        self
    }

    pub fn error_status(mut self, policy: ErrorStatusPolicy) -> Self {
        self.config.error_status = policy;
        self
    }

    pub fn collisions(mut self, policy: CollisionPolicy) -> Self {
        self.config.collisions = policy;
        self
    }

    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Ocr2MdError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(Ocr2MdError::MissingApiKey {
                var: API_KEY_ENV.to_string(),
            });
        }
        if c.ocr.program.trim().is_empty() {
            return Err(Ocr2MdError::InvalidConfig(
                "OCR program must not be empty".into(),
            ));
        }
        if c.ocr_concurrency == 0 {
            return Err(Ocr2MdError::InvalidConfig(
                "OCR concurrency must be ≥ 1".into(),
            ));
        }
        if c.output_extension.is_empty() || c.output_extension.starts_with('.') {
            return Err(Ocr2MdError::InvalidConfig(format!(
                "Output extension must be non-empty and given without a leading dot, got {:?}",
                c.output_extension
            )));
        }
        if c.client.is_none() && c.api_url.trim().is_empty() {
            return Err(Ocr2MdError::InvalidConfig(
                "API URL must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Policies ─────────────────────────────────────────────────────────────

/// Handling of a completion response that carries zero choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyResponsePolicy {
    /// Write an empty output file and count the file as done. (default)
    #[default]
    WriteEmpty,
    /// Fail the file at the format stage.
    Fail,
}

/// Handling of two inputs whose derived output paths are equal.
///
/// Collisions are always logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Let both pipelines run; the last commit wins. (default)
    #[default]
    Allow,
    /// Fail every input after the first that claims an output path.
    Reject,
}

/// Handling of a non-2xx answer from the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatusPolicy {
    /// Decode the body like a success body. A JSON error object carries no
    /// choices, so it falls through to [`EmptyResponsePolicy`]. A body that
    /// does not decode fails with `FormatError::Status`. (default)
    #[default]
    Decode,
    /// Fail the file with `FormatError::Status` without decoding.
    Reject,
}
