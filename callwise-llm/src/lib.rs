//! # callwise-llm
//!
//! The chat-completion pipeline on top of `callwise-core`:
//!
//! - **[`ModelSelector`]**: estimates token cost and moves long prompts to the
//!   long-context model, rejecting prompts that fit nowhere
//! - **[`CompletionClient`]**: checks preconditions, then retries across two
//!   dimensions (transport failures, and function calls that fail validation)
//! - **[`Transport`]**: the network seam; [`OpenAiTransport`] speaks HTTP via
//!   `reqwest`, tests plug in a recording mock
//!
//! ```text
//! request ──▶ preconditions ──▶ selector ──▶ ┌ round 1..=function_failure_retries ┐
//!                                            │  attempt 1..=model_failure_retries │
//!                                            │  validate function call            │
//!                                            └────────────────────────────────────┘
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod executor;
pub mod request;
pub mod selector;
pub mod wire;

pub use client::{OpenAiTransport, Transport};
pub use error::LlmError;
pub use executor::{CompletionClient, ModelStatus};
pub use request::{CompletionRequest, CompletionResult};
pub use selector::{FIXED_OVERHEAD, ModelSelector, Selection};
pub use wire::{ChatRequest, ChatResponse, ModelInfo};
