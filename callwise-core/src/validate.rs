//! Function-call validation.
//!
//! A call returned by the model is accepted only if it names the expected
//! function, its arguments parse, and every required property is present.
//! Extra keys and missing optional keys are tolerated.

use serde_json::Value;
use thiserror::Error;

use crate::arguments::parse_arguments;
use crate::function::{FunctionCallDirective, Functions};
use crate::log::{LogKind, log};
use crate::types::FunctionCallPayload;

/// Why a function call was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallRejection {
    /// The response carried no function call at all.
    #[error("response contains no function call")]
    Missing,

    /// A specific function was forced and the model called another.
    #[error("expected a call to `{expected}`, got `{actual}`")]
    NameMismatch {
        /// The forced function name.
        expected: String,
        /// The name the model used.
        actual: String,
    },

    /// The argument payload could not be parsed.
    #[error("arguments of `{0}` could not be parsed")]
    UnparseableArguments(String),

    /// No declared schema has this name.
    #[error("no function named `{0}` was declared")]
    UnknownFunction(String),

    /// Required properties absent from the parsed arguments.
    #[error("missing required arguments: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
}

/// Validate a function call against the declared schemas.
///
/// On success returns the parsed arguments.
///
/// # Errors
/// Returns the first [`CallRejection`] that applies, checked in order:
/// missing call, name mismatch, unparseable arguments, unknown function,
/// missing required properties.
pub fn validate_function_call(
    call: Option<&FunctionCallPayload>,
    functions: &Functions,
    directive: &FunctionCallDirective,
    verbose: bool,
) -> Result<Value, CallRejection> {
    let result = check(call, functions, directive);
    match &result {
        Ok(_) => {
            let name = call.map_or("", |c| c.name.as_str());
            log(LogKind::Success, verbose, format!("function call `{name}` validated"));
        }
        Err(rejection) => log(LogKind::Error, verbose, format!("function call rejected: {rejection}")),
    }
    result
}

fn check(
    call: Option<&FunctionCallPayload>,
    functions: &Functions,
    directive: &FunctionCallDirective,
) -> Result<Value, CallRejection> {
    let call = call.ok_or(CallRejection::Missing)?;

    let name = match directive.name() {
        Some(expected) if expected != call.name => {
            return Err(CallRejection::NameMismatch {
                expected: expected.to_string(),
                actual: call.name.clone(),
            });
        }
        Some(expected) => expected,
        None => call.name.as_str(),
    };

    let arguments =
        parse_arguments(&call.arguments).ok_or_else(|| CallRejection::UnparseableArguments(name.to_string()))?;

    let schema = functions
        .get(name)
        .ok_or_else(|| CallRejection::UnknownFunction(name.to_string()))?;

    let missing: Vec<String> = schema
        .required()
        .iter()
        .filter(|key| arguments.get(key.as_str()).is_none())
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(arguments)
    } else {
        Err(CallRejection::MissingRequired(missing))
    }
}
