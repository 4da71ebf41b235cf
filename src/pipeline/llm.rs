//! Completion-service interaction: one chat request per extracted text.
//!
//! The request always carries exactly two messages, the system instruction
//! first and the extracted text second, at temperature 0.5. The first
//! choice's message content is the formatted text.
//!
//! Transport sits behind [`CompletionClient`] so request construction and
//! response handling ([`format_text`]) are the same whether the call goes
//! over HTTP ([`OpenAiClient`]) or to an in-process fake in tests.

use crate::config::{EmptyResponsePolicy, ErrorStatusPolicy, PipelineConfig};
use crate::error::FormatError;
use crate::prompts::TEMPERATURE;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ── Wire types ───────────────────────────────────────────────────────────

/// One `{role, content}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for the chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// Response body; only the fields the pipeline consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    /// `null` for some refusals and tool calls.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice, or `None` when there are no choices.
    ///
    /// A first choice with `null` content yields `Some("")`.
    pub fn first_content(&self) -> Option<String> {
        self.choices
            .first()
            .map(|c| c.message.content.clone().unwrap_or_default())
    }
}

// ── Transport ────────────────────────────────────────────────────────────

/// Sends one completion request and returns the decoded response.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, FormatError>;
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
///
/// One instance is shared by every task in a batch so connections are
/// reused. No timeout is configured: a hung call blocks only its own file.
///
/// A non-2xx answer is handled per [`ErrorStatusPolicy`]; by default its
/// body is decoded like any other, so an `{"error": ...}` object yields a
/// response with zero choices.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    error_status: ErrorStatusPolicy,
}

impl OpenAiClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, FormatError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(FormatError::Http)?;
        Ok(Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
            error_status: ErrorStatusPolicy::default(),
        })
    }

    /// Endpoint, credential and status policy taken from `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FormatError> {
        Ok(Self::new(config.api_url.clone(), config.api_key.clone())?
            .with_error_status(config.error_status))
    }

    pub fn with_error_status(mut self, policy: ErrorStatusPolicy) -> Self {
        self.error_status = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, FormatError> {
        let body = serde_json::to_vec(request).map_err(FormatError::Serialize)?;

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
            .body(body)
            .send()
            .await
            .map_err(FormatError::Http)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(FormatError::Http)?;
        debug!("Completion service answered {} ({} bytes)", status, bytes.len());

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(FormatError::Decode);
        }

        let status_error = || FormatError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).trim().to_string(),
        };
        match self.error_status {
            ErrorStatusPolicy::Reject => Err(status_error()),
            ErrorStatusPolicy::Decode => match serde_json::from_slice::<ChatResponse>(&bytes) {
                Ok(response) => {
                    warn!(
                        "Completion service answered {}; using its body ({} choices)",
                        status,
                        response.choices.len()
                    );
                    Ok(response)
                }
                Err(_) => Err(status_error()),
            },
        }
    }
}

// ── Request / response handling ──────────────────────────────────────────

/// Build the two-message request for `text`.
pub fn build_request(config: &PipelineConfig, text: &str) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages: vec![
            ChatMessage::system(config.system_prompt.as_str()),
            ChatMessage::user(text),
        ],
        temperature: TEMPERATURE,
    }
}

/// Reformat extracted OCR output through the completion service.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD before sending.
/// Zero choices yields empty text under [`EmptyResponsePolicy::WriteEmpty`]
/// and [`FormatError::EmptyCompletion`] under [`EmptyResponsePolicy::Fail`].
pub async fn format_text(
    client: &dyn CompletionClient,
    config: &PipelineConfig,
    extracted: &[u8],
) -> Result<String, FormatError> {
    let text = String::from_utf8_lossy(extracted);
    let request = build_request(config, &text);
    debug!(
        "Sending completion request: model={}, {} chars",
        request.model,
        text.len()
    );

    let response = client.complete(&request).await?;

    match response.first_content() {
        Some(content) => Ok(content),
        None => match config.empty_response {
            EmptyResponsePolicy::WriteEmpty => {
                warn!("Completion response contained no choices; writing empty output");
                Ok(String::new())
            }
            EmptyResponsePolicy::Fail => Err(FormatError::EmptyCompletion),
        },
    }
}
