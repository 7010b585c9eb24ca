//! Completion executor.
//!
//! Runs one [`CompletionRequest`] through the full pipeline: precondition
//! checks, model selection, then two nested retry loops. The inner loop
//! retries transport failures up to `model_failure_retries` times; the outer
//! loop asks again, up to `function_failure_retries` times, while the
//! returned function call fails validation.

use std::time::Duration;

use callwise_core::tokens::Tokenizer;
use callwise_core::{
    CallRejection, CallwiseConfig, CallwiseError, FunctionCallDirective, Functions, LogKind, log, parse_arguments,
    validate_function_call,
};
use serde::Serialize;
use serde_json::Value;

use crate::client::{OpenAiTransport, Transport};
use crate::error::LlmError;
use crate::request::{CompletionRequest, CompletionResult};
use crate::selector::ModelSelector;
use crate::wire::{ChatRequest, ChatResponse};

/// State carried between retry rounds.
enum Outcome {
    /// No attempt produced a usable response.
    NoResponse { last_error: String },
    /// A response arrived but its function call was rejected.
    Rejected { reason: CallRejection },
    /// A response was accepted.
    Accepted {
        response: ChatResponse,
        arguments: Option<Value>,
    },
}

/// Model and key status reported by [`CompletionClient::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    /// Model identifier as reported by the provider.
    pub model: String,
    /// Owning organisation.
    pub owned_by: Option<String>,
    /// Whether the provider accepted the configured key.
    pub api_key_valid: bool,
}

/// Chat-completion client.
///
/// Stateless between calls: every [`execute`](Self::execute) is an
/// independent, freshly validated request. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct CompletionClient<T = OpenAiTransport> {
    transport: T,
    config: CallwiseConfig,
    selector: ModelSelector,
}

impl CompletionClient<OpenAiTransport> {
    /// A client talking HTTP to the configured endpoint.
    ///
    /// # Errors
    /// Returns `LlmError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: CallwiseConfig) -> Result<Self, LlmError> {
        let transport = OpenAiTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> CompletionClient<T> {
    /// A client over an arbitrary transport.
    #[must_use]
    pub fn with_transport(config: CallwiseConfig, transport: T) -> Self {
        let selector = ModelSelector::from_config(&config);
        Self {
            transport,
            config,
            selector,
        }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &CallwiseConfig {
        &self.config
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a single user message.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn text_completion(&self, text: impl Into<String>) -> Result<CompletionResult, LlmError> {
        self.execute(&CompletionRequest::text(text)).await
    }

    /// Send an explicit conversation.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn chat_completion(
        &self,
        messages: Vec<callwise_core::Message>,
    ) -> Result<CompletionResult, LlmError> {
        self.execute(&CompletionRequest::messages(messages)).await
    }

    /// Send a user message and require a validated function call back.
    ///
    /// # Errors
    /// See [`execute`](Self::execute).
    pub async fn function_completion(
        &self,
        text: impl Into<String>,
        functions: impl Into<Functions>,
    ) -> Result<CompletionResult, LlmError> {
        self.execute(&CompletionRequest::text(text).with_functions(functions)).await
    }

    /// Run a request through the whole pipeline.
    ///
    /// # Errors
    /// Precondition errors (`MissingApiKey`, `InvalidFunctions`,
    /// `MissingText`, `DuplicateFunctionNames`, `InvalidFunctionCall`,
    /// `MessageTooLong`) are returned before any network I/O.
    /// `NoResponse` when every attempt failed at the transport level, and
    /// `RejectedCall` when responses arrived but no function call passed
    /// validation.
    pub async fn execute(&self, request: &CompletionRequest) -> Result<CompletionResult, LlmError> {
        let verbose = self.config.debug;
        let wire = self.prepare(request)?;
        let functions = request.functions.as_ref();
        let directive = wire.function_call.clone().unwrap_or(FunctionCallDirective::Auto);

        log(LogKind::Prompt, verbose, describe_prompt(&wire));

        // A zero budget still makes one attempt, see `CompletionRequest::with_retries`.
        let model_attempts = request.model_failure_retries.max(1);
        let function_rounds = if functions.is_some() {
            request.function_failure_retries.max(1)
        } else {
            1
        };

        let mut attempts = 0;
        let mut outcome = Outcome::NoResponse {
            last_error: "no attempt was made".into(),
        };

        for round in 1..=function_rounds {
            match self.send_with_retries(&wire, model_attempts, &mut attempts).await {
                Err(last_error) => {
                    if !matches!(outcome, Outcome::Rejected { .. }) {
                        outcome = Outcome::NoResponse { last_error };
                    }
                }
                Ok(response) => {
                    let Some(functions) = functions else {
                        outcome = Outcome::Accepted {
                            response,
                            arguments: None,
                        };
                        break;
                    };

                    let call = response
                        .first_choice()
                        .and_then(|choice| choice.message.function_call.as_ref());
                    match validate_function_call(call, functions, &directive, verbose) {
                        Ok(arguments) => {
                            outcome = Outcome::Accepted {
                                response,
                                arguments: Some(arguments),
                            };
                            break;
                        }
                        Err(reason) => {
                            log(
                                LogKind::Warning,
                                verbose,
                                format!("round {round}/{function_rounds}: {reason}"),
                            );
                            outcome = Outcome::Rejected { reason };
                        }
                    }
                }
            }
            if round < function_rounds {
                self.backoff().await;
            }
        }

        match outcome {
            Outcome::Accepted { response, arguments } => Ok(self.finish(response, arguments, wire.model)),
            Outcome::Rejected { reason } => {
                log(
                    LogKind::Critical,
                    true,
                    format!("no valid function call after {attempts} attempts: {reason}"),
                );
                Err(LlmError::RejectedCall { attempts, reason })
            }
            Outcome::NoResponse { last_error } => {
                log(
                    LogKind::Critical,
                    true,
                    format!("could not get a successful response after {attempts} attempts: {last_error}"),
                );
                Err(LlmError::NoResponse { attempts, last_error })
            }
        }
    }

    /// Ask the provider about `model` (the standard model by default).
    ///
    /// # Errors
    /// Returns `LlmError::MissingApiKey` without any I/O when no key is
    /// configured, and the transport's error when the lookup fails.
    pub async fn status(&self, model: Option<&str>) -> Result<ModelStatus, LlmError> {
        if !self.config.has_api_key() {
            return Err(LlmError::MissingApiKey);
        }
        let model = model.unwrap_or(self.config.text_model.as_str());
        let info = self.transport.retrieve_model(model).await?;
        log(LogKind::System, self.config.debug, format!("model {} is available", info.id));
        Ok(ModelStatus {
            model: info.id,
            owned_by: info.owned_by,
            api_key_valid: true,
        })
    }

    // -----------------------------------------------------------------------
    // Pipeline steps
    // -----------------------------------------------------------------------

    /// Check preconditions, select a model and build the wire request.
    fn prepare(&self, request: &CompletionRequest) -> Result<ChatRequest, LlmError> {
        if !self.config.has_api_key() {
            return Err(LlmError::MissingApiKey);
        }
        if let Some(functions) = &request.functions {
            functions.check_shape().map_err(|_| LlmError::InvalidFunctions)?;
            for schema in functions.as_slice() {
                if let Err(e) = schema.validate() {
                    log(LogKind::Error, self.config.debug, &e);
                    return Err(LlmError::InvalidFunctions);
                }
            }
        }
        if !request.has_prompt() {
            return Err(LlmError::MissingText);
        }
        if request.functions.as_ref().is_some_and(|functions| !functions.names_are_unique()) {
            return Err(LlmError::DuplicateFunctionNames);
        }
        let directive = resolve_directive(request)?;

        if let Some(functions) = &request.functions {
            self.warn_if_unmentioned(request, functions);
        }

        let messages = request.assembled_messages();
        let tokenizer = Tokenizer::for_model(self.selector.candidate(request.model.as_deref()))?;
        let prompt_tokens = messages.iter().map(|message| tokenizer.count(&message.content)).sum();
        let function_tokens = match &request.functions {
            Some(functions) => {
                let encoded = serde_json::to_string(functions.as_slice()).map_err(CallwiseError::from)?;
                tokenizer.count(&encoded)
            }
            None => 0,
        };

        let selection = self
            .selector
            .select(prompt_tokens, function_tokens, request.model.as_deref())?;

        Ok(ChatRequest {
            model: selection.model,
            messages,
            functions: request.functions.as_ref().map(|functions| functions.as_slice().to_vec()),
            function_call: directive,
            temperature: request.temperature,
        })
    }

    /// Warn when several functions are offered and the prompt names none of them.
    fn warn_if_unmentioned(&self, request: &CompletionRequest, functions: &Functions) {
        if functions.len() < 2 {
            return;
        }
        let prompt: String = request
            .assembled_messages()
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if !functions.names().any(|name| prompt.contains(name)) {
            log(
                LogKind::Warning,
                self.config.debug,
                "several functions are declared but the prompt mentions none of them by name",
            );
        }
    }

    /// The inner loop: up to `max_attempts` transport attempts.
    ///
    /// Returns the first response with at least one choice, or the last error.
    async fn send_with_retries(
        &self,
        wire: &ChatRequest,
        max_attempts: u32,
        attempts: &mut u32,
    ) -> Result<ChatResponse, String> {
        let verbose = self.config.debug;
        let mut last_error = String::from("no attempt was made");

        for attempt in 1..=max_attempts {
            *attempts += 1;
            match self.transport.chat(wire).await {
                Ok(response) if response.first_choice().is_some() => return Ok(response),
                Ok(_) => {
                    last_error = "no choices in response".into();
                    log(
                        LogKind::Error,
                        verbose,
                        format!("attempt {attempt}/{max_attempts}: no choices in response"),
                    );
                }
                Err(e) => {
                    log(LogKind::Error, verbose, format!("attempt {attempt}/{max_attempts} failed: {e}"));
                    last_error = e.to_string();
                }
            }
            if attempt < max_attempts {
                self.backoff().await;
            }
        }
        Err(last_error)
    }

    async fn backoff(&self) {
        if self.config.retry_backoff_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
        }
    }

    /// Extract the result from an accepted response.
    fn finish(&self, response: ChatResponse, arguments: Option<Value>, model_used: String) -> CompletionResult {
        let usage = response.usage;
        let choice = response.choices.into_iter().next().unwrap_or_default();
        let call = choice.message.function_call;

        let arguments = arguments.or_else(|| call.as_ref().and_then(|call| parse_arguments(&call.arguments)));
        let result = CompletionResult {
            text: choice.message.content,
            function_name: call.map(|call| call.name),
            arguments,
            usage,
            finish_reason: choice.finish_reason,
            model_used,
        };

        log(
            LogKind::Response,
            self.config.debug,
            format!(
                "model: {}, finish reason: {}, function: {}, tokens: {}",
                result.model_used,
                result.finish_reason.as_deref().unwrap_or("none"),
                result.function_name.as_deref().unwrap_or("none"),
                result.usage.total_tokens
            ),
        );
        result
    }
}

/// The directive to send: the caller's, or a default derived from the
/// declared functions. A named directive must refer to a declared function.
fn resolve_directive(request: &CompletionRequest) -> Result<Option<FunctionCallDirective>, LlmError> {
    match (&request.functions, &request.function_call) {
        (None, None | Some(FunctionCallDirective::Auto)) => Ok(None),
        (None, Some(FunctionCallDirective::Named(_))) => Err(LlmError::InvalidFunctionCall),
        (Some(functions), Some(FunctionCallDirective::Named(name))) if functions.get(name).is_none() => {
            Err(LlmError::InvalidFunctionCall)
        }
        (Some(_), Some(directive)) => Ok(Some(directive.clone())),
        (Some(functions), None) => Ok(Some(match functions.as_slice() {
            [only] => FunctionCallDirective::named(only.name.clone()),
            _ => FunctionCallDirective::Auto,
        })),
    }
}

fn describe_prompt(wire: &ChatRequest) -> String {
    let prompt = wire
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    match &wire.functions {
        Some(functions) => format!(
            "prompt:\n{prompt}\n\nfunctions:\n{}",
            serde_json::to_string_pretty(functions).unwrap_or_default()
        ),
        None => format!("prompt:\n{prompt}"),
    }
}

#[cfg(test)]
mod tests {
    use callwise_core::{PropertySchema, compose_function};

    use super::*;

    fn schema(name: &str) -> callwise_core::FunctionSchema {
        compose_function(name, "", [("a", PropertySchema::string("a"))], ["a"]).expect("schema")
    }

    #[test]
    fn single_function_is_forced_by_default() {
        let request = CompletionRequest::text("x").with_functions(schema("only"));
        assert_eq!(
            resolve_directive(&request).expect("directive"),
            Some(FunctionCallDirective::named("only"))
        );
    }

    #[test]
    fn several_functions_default_to_auto() {
        let request = CompletionRequest::text("x").with_functions(vec![schema("a"), schema("b")]);
        assert_eq!(resolve_directive(&request).expect("directive"), Some(FunctionCallDirective::Auto));
    }

    #[test]
    fn named_directive_must_be_declared() {
        let request = CompletionRequest::text("x")
            .with_functions(schema("a"))
            .with_function_call(FunctionCallDirective::named("b"));
        assert!(matches!(resolve_directive(&request), Err(LlmError::InvalidFunctionCall)));

        let request = CompletionRequest::text("x").with_function_call(FunctionCallDirective::named("b"));
        assert!(matches!(resolve_directive(&request), Err(LlmError::InvalidFunctionCall)));
    }

    #[test]
    fn auto_without_functions_is_dropped() {
        let request = CompletionRequest::text("x").with_function_call(FunctionCallDirective::Auto);
        assert_eq!(resolve_directive(&request).expect("directive"), None);
    }
}
