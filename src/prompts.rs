//! Default system instruction and model for the formatting request.
//!
//! Callers can override both via [`crate::config::PipelineConfigBuilder`];
//! the constants here are used only when no override is provided.

/// Default system instruction sent ahead of every extracted text.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a formatter, spellchecker and grammar checker. \
Format the provided text without changing the wording, except to correct mistakes. \
Return the result as markdown.";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Default chat-completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Sampling temperature for every request.
pub const TEMPERATURE: f32 = 0.5;
