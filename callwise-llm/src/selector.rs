//! Token-budget model selection.
//!
//! A request whose estimated cost exceeds the standard budget is moved to the
//! long-context model; one that would not fit even there is rejected before
//! any network I/O.

use callwise_core::config::{DEFAULT_LONG_CONTEXT_MARKER, is_long_context_variant};
use callwise_core::{CallwiseConfig, LogKind, log};

use crate::error::LlmError;

/// Tokens added to every request for role wrapping.
pub const FIXED_OVERHEAD: usize = 3;

/// The model chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Model to send the request to.
    pub model: String,
    /// Estimated cost, including [`FIXED_OVERHEAD`].
    pub total_tokens: usize,
    /// Whether the long-context model replaced the candidate.
    pub switched: bool,
}

/// Picks a model from a request's token cost.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    standard_model: String,
    long_model: String,
    long_marker: String,
    budget_threshold: usize,
    hard_ceiling: usize,
    suppress_warnings: bool,
    verbose: bool,
}

impl ModelSelector {
    /// A selector with explicit limits.
    #[must_use]
    pub fn new(
        standard_model: impl Into<String>,
        long_model: impl Into<String>,
        budget_threshold: usize,
        hard_ceiling: usize,
    ) -> Self {
        Self {
            standard_model: standard_model.into(),
            long_model: long_model.into(),
            long_marker: DEFAULT_LONG_CONTEXT_MARKER.to_string(),
            budget_threshold,
            hard_ceiling,
            suppress_warnings: false,
            verbose: false,
        }
    }

    /// A selector using the configured models and limits.
    #[must_use]
    pub fn from_config(config: &CallwiseConfig) -> Self {
        Self {
            standard_model: config.text_model.clone(),
            long_model: config.long_text_model.clone(),
            long_marker: config.long_context_marker.clone(),
            budget_threshold: config.chunk_length(),
            hard_ceiling: config.hard_ceiling(),
            suppress_warnings: config.suppress_warnings,
            verbose: config.debug,
        }
    }

    /// Replace the substring that marks long-context variants.
    #[must_use]
    pub fn with_long_context_marker(mut self, marker: impl Into<String>) -> Self {
        self.long_marker = marker.into();
        self
    }

    /// Whether `model` already has a long context window.
    #[must_use]
    pub fn is_long_context(&self, model: &str) -> bool {
        is_long_context_variant(model, &self.long_model, &self.long_marker)
    }

    /// The model a request starts from before any switch.
    #[must_use]
    pub fn candidate<'a>(&'a self, declared_model: Option<&'a str>) -> &'a str {
        declared_model.unwrap_or(self.standard_model.as_str())
    }

    /// Token cost above which the long-context model is used.
    #[must_use]
    pub fn budget_threshold(&self) -> usize {
        self.budget_threshold
    }

    /// Largest cost accepted at all.
    #[must_use]
    pub fn hard_ceiling(&self) -> usize {
        self.hard_ceiling
    }

    /// Choose a model for a request.
    ///
    /// # Errors
    /// Returns `LlmError::MessageTooLong` if the total cost exceeds the hard
    /// ceiling.
    pub fn select(
        &self,
        prompt_tokens: usize,
        function_tokens: usize,
        declared_model: Option<&str>,
    ) -> Result<Selection, LlmError> {
        let total_tokens = prompt_tokens + function_tokens + FIXED_OVERHEAD;
        let candidate = self.candidate(declared_model);

        log(
            LogKind::Info,
            self.verbose,
            format!(
                "message tokens: {prompt_tokens}, function tokens: {function_tokens}, total tokens: {total_tokens}"
            ),
        );

        let switched = total_tokens > self.budget_threshold && !self.is_long_context(candidate);
        let model = if switched {
            if !self.suppress_warnings {
                log(
                    LogKind::Warning,
                    self.verbose,
                    format!(
                        "message is long ({total_tokens} tokens), using {} (set SUPPRESS_WARNINGS=1 to hide this)",
                        self.long_model
                    ),
                );
            }
            self.long_model.clone()
        } else {
            candidate.to_string()
        };

        if total_tokens > self.hard_ceiling {
            log(LogKind::Error, self.verbose, format!("message too long: {total_tokens} tokens"));
            return Err(LlmError::MessageTooLong {
                tokens: total_tokens,
                ceiling: self.hard_ceiling,
            });
        }

        Ok(Selection {
            model,
            total_tokens,
            switched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> ModelSelector {
        ModelSelector::from_config(&CallwiseConfig::default())
    }

    #[test]
    fn short_prompt_keeps_standard_model() {
        let selection = selector().select(100, 50, None).expect("fits");
        assert_eq!(selection.model, "gpt-3.5-turbo-0613");
        assert_eq!(selection.total_tokens, 153);
        assert!(!selection.switched);
    }

    #[test]
    fn overhead_counts_toward_threshold() {
        // 3069 + 3 == 3072 stays, 3070 + 3 switches.
        assert!(!selector().select(3069, 0, None).expect("fits").switched);
        assert!(selector().select(3070, 0, None).expect("fits").switched);
    }

    #[test]
    fn long_prompt_switches_to_long_model() {
        let selection = selector().select(5000, 0, None).expect("fits long model");
        assert_eq!(selection.model, "gpt-3.5-turbo-16k");
        assert!(selection.switched);
    }

    #[test]
    fn declared_long_model_is_not_a_switch() {
        let selection = selector().select(5000, 0, Some("gpt-3.5-turbo-16k")).expect("fits");
        assert_eq!(selection.model, "gpt-3.5-turbo-16k");
        assert!(!selection.switched);
    }

    #[test]
    fn declared_long_variant_is_kept() {
        let selection = selector().select(5000, 0, Some("gpt-3.5-turbo-16k-0613")).expect("fits");
        assert_eq!(selection.model, "gpt-3.5-turbo-16k-0613");
        assert!(!selection.switched);
    }

    #[test]
    fn blank_marker_only_trusts_the_long_model() {
        let selector = selector().with_long_context_marker("");
        let selection = selector.select(5000, 0, Some("gpt-3.5-turbo-16k-0613")).expect("fits");
        assert_eq!(selection.model, "gpt-3.5-turbo-16k");
        assert!(selection.switched);
    }

    #[test]
    fn declared_model_is_kept_when_short() {
        let selection = selector().select(10, 0, Some("gpt-4o-mini")).expect("fits");
        assert_eq!(selection.model, "gpt-4o-mini");
    }

    #[test]
    fn over_ceiling_is_rejected() {
        let err = selector().select(13_310, 0, None).expect_err("too long");
        assert!(matches!(err, LlmError::MessageTooLong { tokens: 13_313, ceiling: 13_312 }));
        assert!(selector().select(13_309, 0, None).is_ok());
    }

    #[test]
    fn function_tokens_count() {
        let err = selector().select(13_000, 400, None).expect_err("too long");
        assert!(matches!(err, LlmError::MessageTooLong { .. }));
    }

    #[test]
    fn explicit_limits() {
        let selector = ModelSelector::new("small", "large", 10, 20);
        assert_eq!(selector.select(8, 0, None).expect("fits").model, "large");
        assert_eq!(selector.select(7, 0, None).expect("fits").model, "small");
        assert!(selector.select(18, 0, None).is_err());
    }
}
