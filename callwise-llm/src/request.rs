//! Completion requests and results.

use callwise_core::{FunctionCallDirective, Functions, Message, Usage};
use serde::Serialize;
use serde_json::Value;

use crate::error::LlmError;

/// Default transport-failure retries per round.
pub const DEFAULT_MODEL_FAILURE_RETRIES: u32 = 5;
/// Default function-call validation rounds.
pub const DEFAULT_FUNCTION_FAILURE_RETRIES: u32 = 10;

/// One completion call: prompt, functions and retry budget.
///
/// Built fresh per call; the executor only reads it.
///
/// ```
/// use callwise_llm::CompletionRequest;
///
/// let request = CompletionRequest::text("Write a song about AI")
///     .with_system("You are a songwriter.")
///     .with_temperature(0.7);
/// assert_eq!(request.assembled_messages().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Trailing user message.
    pub text: Option<String>,
    /// Explicit conversation, sent before `text`.
    pub messages: Vec<Message>,
    /// Leading system message.
    pub system: Option<String>,
    /// Functions the model may call.
    pub functions: Option<Functions>,
    /// How the model should pick a function. Defaults from `functions`.
    pub function_call: Option<FunctionCallDirective>,
    /// Model override; the configured standard model otherwise.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Attempts per round before giving up on transport failures (at least one).
    pub model_failure_retries: u32,
    /// Rounds spent asking for a valid function call (at least one).
    pub function_failure_retries: u32,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            text: None,
            messages: Vec::new(),
            system: None,
            functions: None,
            function_call: None,
            model: None,
            temperature: 0.0,
            model_failure_retries: DEFAULT_MODEL_FAILURE_RETRIES,
            function_failure_retries: DEFAULT_FUNCTION_FAILURE_RETRIES,
        }
    }
}

impl CompletionRequest {
    /// A request carrying a single user message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A request carrying an explicit conversation.
    #[must_use]
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Prefix a system message.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Append conversation messages.
    #[must_use]
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set the trailing user message.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Declare callable functions.
    #[must_use]
    pub fn with_functions(mut self, functions: impl Into<Functions>) -> Self {
        self.functions = Some(functions.into());
        self
    }

    /// Declare callable functions from raw JSON.
    ///
    /// # Errors
    /// Returns `LlmError::InvalidFunctions` unless `functions` is a schema
    /// object or a non-empty array of them.
    pub fn with_functions_json(self, functions: Value) -> Result<Self, LlmError> {
        let functions = Functions::from_value(functions).map_err(|e| match e {
            callwise_core::CallwiseError::InvalidFunctions => LlmError::InvalidFunctions,
            other => LlmError::Core(other),
        })?;
        Ok(self.with_functions(functions))
    }

    /// Set the function-call directive.
    #[must_use]
    pub fn with_function_call(mut self, directive: FunctionCallDirective) -> Self {
        self.function_call = Some(directive);
        self
    }

    /// Set the function-call directive from raw JSON.
    ///
    /// # Errors
    /// Returns `LlmError::InvalidFunctionCall` for anything but `"auto"`, a
    /// name, or `{"name": ...}`.
    pub fn with_function_call_json(self, directive: &Value) -> Result<Self, LlmError> {
        let directive = FunctionCallDirective::from_value(directive).map_err(|_| LlmError::InvalidFunctionCall)?;
        Ok(self.with_function_call(directive))
    }

    /// Override the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set both retry budgets.
    ///
    /// Each budget counts attempts, so `0` behaves like `1`: a request is
    /// always sent at least once, and a function call is always validated at
    /// least once.
    #[must_use]
    pub fn with_retries(mut self, model_failure_retries: u32, function_failure_retries: u32) -> Self {
        self.model_failure_retries = model_failure_retries;
        self.function_failure_retries = function_failure_retries;
        self
    }

    /// Whether there is anything to send.
    #[must_use]
    pub fn has_prompt(&self) -> bool {
        self.text.as_deref().is_some_and(|text| !text.trim().is_empty()) || !self.messages.is_empty()
    }

    /// System message, then explicit messages, then `text` as a user message.
    #[must_use]
    pub fn assembled_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(self.messages.iter().cloned());
        if let Some(text) = self.text.as_deref().filter(|text| !text.is_empty()) {
            messages.push(Message::user(text));
        }
        messages
    }
}

/// Data extracted from an accepted response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    /// Assistant content.
    pub text: Option<String>,
    /// Name of the function the model called.
    pub function_name: Option<String>,
    /// Parsed function-call arguments.
    pub arguments: Option<Value>,
    /// Token accounting.
    pub usage: Usage,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
    /// Model the request was sent to.
    pub model_used: String,
}

#[cfg(test)]
mod tests {
    use callwise_core::{PropertySchema, Role, compose_function};
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults() {
        let request = CompletionRequest::default();
        assert_eq!(request.model_failure_retries, 5);
        assert_eq!(request.function_failure_retries, 10);
        assert!((request.temperature - 0.0).abs() < f32::EPSILON);
        assert!(!request.has_prompt());
    }

    #[test]
    fn message_assembly_order() {
        let request = CompletionRequest::messages(vec![Message::user("first"), Message::assistant("second")])
            .with_system("rules")
            .with_text("third");
        let roles: Vec<Role> = request.assembled_messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(request.assembled_messages()[3].content, "third");
    }

    #[test]
    fn empty_text_is_not_a_message() {
        let request = CompletionRequest::text("");
        assert!(request.assembled_messages().is_empty());
        assert!(!request.has_prompt());
        assert!(!CompletionRequest::text("   ").has_prompt());
    }

    #[test]
    fn functions_from_json() {
        let schema = compose_function(
            "write_song",
            "Write a song",
            [("lyrics", PropertySchema::string("lyrics"))],
            ["lyrics"],
        )
        .expect("schema");
        let request = CompletionRequest::text("x")
            .with_functions_json(json!([schema]))
            .expect("list of schemas");
        assert_eq!(request.functions.map(|f| f.len()), Some(1));

        let err = CompletionRequest::text("x")
            .with_functions_json(json!("write_song"))
            .expect_err("not a schema");
        assert!(matches!(err, LlmError::InvalidFunctions));
    }

    #[test]
    fn directive_from_json() {
        let err = CompletionRequest::text("x")
            .with_function_call_json(&json!(7))
            .expect_err("not a directive");
        assert!(matches!(err, LlmError::InvalidFunctionCall));
        let request = CompletionRequest::text("x")
            .with_function_call_json(&json!({"name": "f"}))
            .expect("named");
        assert_eq!(request.function_call, Some(FunctionCallDirective::named("f")));
    }
}
