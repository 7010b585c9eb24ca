//! # callwise core
//!
//! Transport-agnostic building blocks for function-calling chat completions:
//!
//! - **Configuration**: [`CallwiseConfig`], layered from defaults, TOML and the environment
//! - **Function schemas**: [`FunctionSchema`], [`Functions`] and the [`FunctionCallDirective`]
//! - **Argument parsing**: [`parse_arguments`], forgiving of the ways models mangle JSON
//! - **Call validation**: [`validate_function_call`], accepting a call only if it fits its schema
//! - **Tokens**: counting, trimming and chunking through `tiktoken-rs`
//! - **Prompts**: `{{key}}` templating and a TOML-backed [`PromptLibrary`]
//!
//! Nothing in this crate performs network I/O; the request pipeline lives in
//! `callwise-llm`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod arguments;
pub mod config;
pub mod error;
pub mod function;
pub mod log;
pub mod prompt;
pub mod tokens;
pub mod types;
pub mod validate;

pub use arguments::parse_arguments;
pub use config::CallwiseConfig;
pub use error::{CallwiseError, Result};
pub use function::{FunctionCallDirective, FunctionSchema, Functions, PropertySchema, compose_function};
pub use log::{LogKind, init_tracing, log};
pub use prompt::{PromptLibrary, PromptValue, compose_prompt};
pub use tokens::{Tokenizer, chunk_prompt, count_tokens, get_tokens, trim_prompt};
pub use types::*;
pub use validate::{CallRejection, validate_function_call};
