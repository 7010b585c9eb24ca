//! Error types for the callwise core library.

use thiserror::Error;

/// Top-level error type for core callwise operations.
#[derive(Error, Debug)]
pub enum CallwiseError {
    /// Configuration could not be loaded or a value is malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tokenizer for a model could not be built, or tokens did not decode.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// A prompt template could not be loaded or rendered.
    #[error("Template error: {0}")]
    Template(String),

    /// A function schema violates its own invariants.
    #[error("Invalid function schema `{name}`: {reason}")]
    InvalidSchema {
        /// Name of the offending function.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The function list is neither a schema object nor a non-empty list of them.
    #[error("functions must be a list of functions or a single function")]
    InvalidFunctions,

    /// The function-call directive is neither `auto` nor a usable function name.
    #[error("invalid function_call")]
    InvalidFunctionCall,

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CallwiseError>;
