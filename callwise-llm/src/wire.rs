//! Chat-completion wire format.

use callwise_core::{FunctionCallDirective, FunctionCallPayload, FunctionSchema, Message, Usage};
use serde::{Deserialize, Serialize};

/// Body of `POST {api_base}/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model to run.
    pub model: String,
    /// Conversation, in order.
    pub messages: Vec<Message>,
    /// Functions the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<FunctionSchema>>,
    /// `"auto"` or `{"name": ...}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDirective>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Response to a chat-completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Candidate completions. Only the first is used.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token accounting.
    #[serde(default)]
    pub usage: Usage,
    /// Model that actually served the request.
    #[serde(default)]
    pub model: Option<String>,
}

impl ChatResponse {
    /// The first choice, if any.
    #[must_use]
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }
}

/// One candidate completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// The assistant's message.
    pub message: AssistantMessage,
    /// Why generation stopped (`stop`, `length`, `function_call`, ...).
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message returned by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Natural-language content.
    #[serde(default)]
    pub content: Option<String>,
    /// Structured function call, if the model made one.
    #[serde(default)]
    pub function_call: Option<FunctionCallPayload>,
}

/// Body of `GET {api_base}/models/{model}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Owning organisation.
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_omits_absent_functions() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo-0613".into(),
            messages: vec![Message::user("hi")],
            functions: None,
            function_call: None,
            temperature: 0.0,
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert!(value.get("functions").is_none());
        assert!(value.get("function_call").is_none());
        assert_eq!(value["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn response_with_function_call() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": {"name": "write_song", "arguments": "{\"lyrics\": \"la\"}"}
                },
                "finish_reason": "function_call"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
            "model": "gpt-3.5-turbo-0613"
        }))
        .expect("deserialize");

        let choice = response.first_choice().expect("one choice");
        assert_eq!(choice.message.content, None);
        assert_eq!(
            choice.message.function_call.as_ref().map(|c| c.name.as_str()),
            Some("write_song")
        );
        assert_eq!(response.usage.total_tokens, 15);
    }

    #[test]
    fn empty_response_has_no_choices() {
        let response: ChatResponse = serde_json::from_value(json!({})).expect("deserialize");
        assert!(response.first_choice().is_none());
    }
}
