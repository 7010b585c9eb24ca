//! LLM error types.

use callwise_core::{CallRejection, CallwiseError};
use thiserror::Error;

/// Errors that can occur while executing a completion.
///
/// The first group are precondition failures, raised before any network I/O.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No usable API key is configured.
    #[error("invalid API key")]
    MissingApiKey,

    /// Functions were supplied but do not form a non-empty schema list.
    #[error("functions must be a list of functions or a single function")]
    InvalidFunctions,

    /// Neither text nor messages were supplied.
    #[error("text is required")]
    MissingText,

    /// Two declared functions share a name.
    #[error("function names must be unique")]
    DuplicateFunctionNames,

    /// The directive names a function that was not declared.
    #[error("invalid function_call")]
    InvalidFunctionCall,

    /// The prompt does not fit even the long-context model.
    #[error("message too long: {tokens} tokens exceeds the ceiling of {ceiling}")]
    MessageTooLong {
        /// Estimated prompt cost.
        tokens: usize,
        /// Largest cost accepted.
        ceiling: usize,
    },

    /// HTTP request failed before a response arrived.
    #[error("LLM request failed: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("LLM request timed out")]
    Timeout,

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the body, or the raw body.
        message: String,
    },

    /// The provider's response body did not have the expected shape.
    #[error("failed to decode provider response: {0}")]
    Decode(String),

    /// Every attempt failed at the transport level.
    #[error("could not get a successful response after {attempts} attempts: {last_error}")]
    NoResponse {
        /// Network attempts made.
        attempts: u32,
        /// The final failure.
        last_error: String,
    },

    /// Responses arrived but no function call passed validation.
    #[error("function call rejected after {attempts} attempts: {reason}")]
    RejectedCall {
        /// Network attempts made.
        attempts: u32,
        /// Why the last call was rejected.
        reason: CallRejection,
    },

    /// Error from the core library (tokenizer, configuration, schemas).
    #[error(transparent)]
    Core(#[from] CallwiseError),
}

impl LlmError {
    /// Whether this error was raised before any network I/O.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey
                | Self::InvalidFunctions
                | Self::MissingText
                | Self::DuplicateFunctionNames
                | Self::InvalidFunctionCall
                | Self::MessageTooLong { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else {
            LlmError::Transport(err.to_string())
        }
    }
}
