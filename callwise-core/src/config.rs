//! Configuration for callwise.
//!
//! Layered in order: built-in defaults, an optional `callwise.toml`, then
//! environment variables. The resulting [`CallwiseConfig`] is read-only and is
//! handed to the selector and executor at construction time.

use std::path::Path;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::error::{CallwiseError, Result};

/// Default chat-completion endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// Default short-context chat model.
pub const DEFAULT_TEXT_MODEL: &str = "gpt-3.5-turbo-0613";
/// Default long-context chat model.
pub const DEFAULT_LONG_TEXT_MODEL: &str = "gpt-3.5-turbo-16k";
/// Substring that marks a model name as a long-context variant.
pub const DEFAULT_LONG_CONTEXT_MARKER: &str = "16k";
/// Context window of the default standard model.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;
/// Context window of the default long-context model.
pub const DEFAULT_LONG_CONTEXT_WINDOW: usize = 16384;

/// Top-level callwise configuration, loadable from TOML and the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct CallwiseConfig {
    /// API key sent as a bearer token. Never logged.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL of the chat-completion API.
    #[serde(default = "default_api_base")]
    pub api_base: Url,
    /// Standard (short-context) model.
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Long-context model used when a prompt outgrows the standard budget.
    #[serde(default = "default_long_text_model")]
    pub long_text_model: String,
    /// Substring marking a model as a long-context variant (e.g. `16k` in
    /// `gpt-3.5-turbo-16k-0613`). Blank disables the check, leaving only
    /// equality with `long_text_model`.
    #[serde(default = "default_long_context_marker")]
    pub long_context_marker: String,
    /// Context window of the standard model, in tokens.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Context window of the long-context model, in tokens.
    #[serde(default = "default_long_context_window")]
    pub long_context_window: usize,
    /// Token budget before switching to the long-context model.
    /// Defaults to three quarters of `context_window`.
    #[serde(default)]
    pub chunk_length: Option<usize>,
    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Pause between retry attempts in milliseconds. `0` retries immediately.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Verbose logging.
    #[serde(default)]
    pub debug: bool,
    /// Hide the long-context switch warning.
    #[serde(default)]
    pub suppress_warnings: bool,
}

impl Default for CallwiseConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            long_text_model: DEFAULT_LONG_TEXT_MODEL.to_string(),
            long_context_marker: DEFAULT_LONG_CONTEXT_MARKER.to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            long_context_window: DEFAULT_LONG_CONTEXT_WINDOW,
            chunk_length: None,
            request_timeout_ms: default_request_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            debug: false,
            suppress_warnings: false,
        }
    }
}

impl CallwiseConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CallwiseError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| CallwiseError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Defaults overridden by the process environment.
    ///
    /// # Errors
    /// Returns `CallwiseError::Config` if a numeric or URL variable is malformed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Like [`CallwiseConfig::from_env`], after loading a `.env` file from the
    /// working directory (or a parent) if one exists.
    ///
    /// # Errors
    /// Returns `CallwiseError::Config` if a variable is malformed.
    pub fn from_dotenv() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(CallwiseError::Config(format!("failed to load .env: {e}")));
            }
        }
        Self::from_env()
    }

    /// Overlay environment variables onto this configuration.
    ///
    /// Unset or blank variables leave the current value alone.
    ///
    /// # Errors
    /// Returns `CallwiseError::Config` if a numeric or URL variable is malformed.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(key) = env_string("CALLWISE_API_KEY").or_else(|| env_string("OPENAI_API_KEY")) {
            self.api_key = Some(SecretString::from(key));
        }
        if let Some(base) = env_string("CALLWISE_API_ENDPOINT") {
            self.api_base = Url::parse(&base)
                .map_err(|e| CallwiseError::Config(format!("CALLWISE_API_ENDPOINT: {e}")))?;
        }
        if let Some(model) = env_string("CALLWISE_TEXT_MODEL") {
            self.text_model = model;
        }
        if let Some(model) = env_string("CALLWISE_LONG_TEXT_MODEL") {
            self.long_text_model = model;
        }
        if let Some(marker) = env_string("CALLWISE_LONG_CONTEXT_MARKER") {
            self.long_context_marker = marker;
        }
        if let Some(window) = env_parse("CALLWISE_CONTEXT_WINDOW")? {
            self.context_window = window;
        }
        if let Some(window) = env_parse("CALLWISE_LONG_CONTEXT_WINDOW")? {
            self.long_context_window = window;
        }
        if let Some(length) = env_parse("CALLWISE_CHUNK_LENGTH")? {
            self.chunk_length = Some(length);
        }
        if let Some(timeout) = env_parse("CALLWISE_REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = timeout;
        }
        if let Some(backoff) = env_parse("CALLWISE_RETRY_BACKOFF_MS")? {
            self.retry_backoff_ms = backoff;
        }
        if let Some(flag) = env_string("DEBUG") {
            self.debug = truthy(&flag);
        }
        if let Some(flag) = env_string("SUPPRESS_WARNINGS") {
            self.suppress_warnings = truthy(&flag);
        }
        Ok(())
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the retry backoff.
    #[must_use]
    pub fn with_retry_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.retry_backoff_ms = backoff_ms;
        self
    }

    /// Whether a non-blank API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    /// Token budget above which the long-context model is selected.
    #[must_use]
    pub fn chunk_length(&self) -> usize {
        self.chunk_length.unwrap_or(self.context_window * 3 / 4)
    }

    /// Largest prompt accepted at all: the long-context window minus the
    /// same margin reserved for the completion.
    #[must_use]
    pub fn hard_ceiling(&self) -> usize {
        self.long_context_window.saturating_sub(self.chunk_length())
    }

}

/// Whether `model` is `long_model` itself or a variant carrying `marker`.
#[must_use]
pub fn is_long_context_variant(model: &str, long_model: &str, marker: &str) -> bool {
    model == long_model || (!marker.is_empty() && model.contains(marker))
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_string(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| CallwiseError::Config(format!("{name}={raw}: {e}")))
        })
        .transpose()
}

fn truthy(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_api_base() -> Url {
    Url::parse(DEFAULT_API_BASE).expect("DEFAULT_API_BASE is a valid URL")
}

fn default_text_model() -> String { DEFAULT_TEXT_MODEL.to_string() }
fn default_long_text_model() -> String { DEFAULT_LONG_TEXT_MODEL.to_string() }
fn default_long_context_marker() -> String { DEFAULT_LONG_CONTEXT_MARKER.to_string() }
fn default_context_window() -> usize { DEFAULT_CONTEXT_WINDOW }
fn default_long_context_window() -> usize { DEFAULT_LONG_CONTEXT_WINDOW }
fn default_request_timeout_ms() -> u64 { 60_000 }
fn default_retry_backoff_ms() -> u64 { 1000 }
