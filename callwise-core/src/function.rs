//! Function schemas the model may call, and the directive forcing a call.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CallwiseError, Result};

/// One property of a function's parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// JSON type name (`string`, `number`, `array`, ...).
    #[serde(rename = "type")]
    pub property_type: String,
    /// What the model should put here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Any further JSON-schema keywords (`enum`, `items`, ...), passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PropertySchema {
    /// A property of the given type with a description.
    #[must_use]
    pub fn new(property_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            property_type: property_type.into(),
            description: Some(description.into()),
            extra: Map::new(),
        }
    }

    /// Shorthand for a described string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::new("string", description)
    }

    /// Attach an extra JSON-schema keyword.
    #[must_use]
    pub fn with_keyword(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// The `parameters` object of a function schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametersSchema {
    /// Always `object`.
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    /// Declared properties, keyed by name.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Properties every call must supply.
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ParametersSchema {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

fn object_type() -> String {
    "object".to_string()
}

/// A callable unit the model may be asked to invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    /// Unique identifier.
    pub name: String,
    /// What the function does, for the model's benefit.
    #[serde(default)]
    pub description: String,
    /// Parameter object schema.
    pub parameters: ParametersSchema,
}

impl FunctionSchema {
    /// Check that every required property is declared.
    ///
    /// # Errors
    /// Returns `CallwiseError::InvalidSchema` naming the undeclared properties.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CallwiseError::InvalidSchema {
                name: self.name.clone(),
                reason: "function name is empty".into(),
            });
        }

        let undeclared: Vec<&str> = self
            .parameters
            .required
            .iter()
            .filter(|name| !self.parameters.properties.contains_key(*name))
            .map(String::as_str)
            .collect();

        if undeclared.is_empty() {
            Ok(())
        } else {
            Err(CallwiseError::InvalidSchema {
                name: self.name.clone(),
                reason: format!("required properties not declared: {}", undeclared.join(", ")),
            })
        }
    }

    /// Names of the properties every call must supply.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.parameters.required
    }
}

/// Build a function schema from its parts.
///
/// ```
/// use callwise_core::function::{compose_function, PropertySchema};
///
/// let summarize = compose_function(
///     "summarize_text",
///     "Summarize the text. Include the topic, subtopics.",
///     [("summary", PropertySchema::string("Detailed summary of the text."))],
///     ["summary"],
/// )
/// .unwrap();
/// assert_eq!(summarize.required(), ["summary"]);
/// ```
///
/// # Errors
/// Returns `CallwiseError::InvalidSchema` if a required name is not among the properties.
pub fn compose_function<P, K, R>(
    name: impl Into<String>,
    description: impl Into<String>,
    properties: P,
    required: R,
) -> Result<FunctionSchema>
where
    P: IntoIterator<Item = (K, PropertySchema)>,
    K: Into<String>,
    R: IntoIterator,
    R::Item: Into<String>,
{
    let schema = FunctionSchema {
        name: name.into(),
        description: description.into(),
        parameters: ParametersSchema {
            schema_type: object_type(),
            properties: properties
                .into_iter()
                .map(|(key, property)| (key.into(), property))
                .collect(),
            required: required.into_iter().map(Into::into).collect(),
        },
    };
    schema.validate()?;
    Ok(schema)
}

// ---------------------------------------------------------------------------
// Function lists
// ---------------------------------------------------------------------------

/// The functions declared for one request: a single schema or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Functions {
    /// One schema.
    Single(FunctionSchema),
    /// Several schemas. Must not be empty.
    List(Vec<FunctionSchema>),
}

impl Functions {
    /// Interpret raw JSON as a function list.
    ///
    /// Accepts a schema object (with `name` and `parameters`) or an array of them.
    ///
    /// # Errors
    /// Returns `CallwiseError::InvalidFunctions` for any other shape, and
    /// `CallwiseError::InvalidSchema` if a schema breaks its invariants.
    pub fn from_value(value: Value) -> Result<Self> {
        let functions = match value {
            Value::Object(ref object) if object.contains_key("name") && object.contains_key("parameters") => {
                Self::Single(serde_json::from_value(value).map_err(|_| CallwiseError::InvalidFunctions)?)
            }
            Value::Array(_) => {
                Self::List(serde_json::from_value(value).map_err(|_| CallwiseError::InvalidFunctions)?)
            }
            _ => return Err(CallwiseError::InvalidFunctions),
        };
        functions.check_shape()?;
        for schema in functions.as_slice() {
            schema.validate()?;
        }
        Ok(functions)
    }

    /// Reject an empty list.
    ///
    /// # Errors
    /// Returns `CallwiseError::InvalidFunctions` if there are no schemas.
    pub fn check_shape(&self) -> Result<()> {
        if self.as_slice().is_empty() {
            Err(CallwiseError::InvalidFunctions)
        } else {
            Ok(())
        }
    }

    /// The declared schemas as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[FunctionSchema] {
        match self {
            Self::Single(schema) => std::slice::from_ref(schema),
            Self::List(schemas) => schemas,
        }
    }

    /// Look up a schema by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FunctionSchema> {
        self.as_slice().iter().find(|schema| schema.name == name)
    }

    /// Whether every declared name is distinct.
    #[must_use]
    pub fn names_are_unique(&self) -> bool {
        let mut seen = HashSet::new();
        self.as_slice().iter().all(|schema| seen.insert(schema.name.as_str()))
    }

    /// Declared function names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.as_slice().iter().map(|schema| schema.name.as_str())
    }

    /// Number of declared schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether no schemas are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl From<FunctionSchema> for Functions {
    fn from(schema: FunctionSchema) -> Self {
        Self::Single(schema)
    }
}

impl From<Vec<FunctionSchema>> for Functions {
    fn from(schemas: Vec<FunctionSchema>) -> Self {
        Self::List(schemas)
    }
}

// ---------------------------------------------------------------------------
// Function-call directive
// ---------------------------------------------------------------------------

/// How the model should pick a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCallDirective {
    /// The model decides.
    Auto,
    /// The model must call this function.
    Named(String),
}

impl FunctionCallDirective {
    /// Force a specific function.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Interpret raw JSON: `"auto"`, a function name, or `{"name": ...}`.
    ///
    /// # Errors
    /// Returns `CallwiseError::InvalidFunctionCall` for anything without a usable name.
    pub fn from_value(value: &Value) -> Result<Self> {
        let name = match value {
            Value::String(s) if s == "auto" => return Ok(Self::Auto),
            Value::String(s) => s.as_str(),
            Value::Object(object) => object
                .get("name")
                .and_then(Value::as_str)
                .ok_or(CallwiseError::InvalidFunctionCall)?,
            _ => return Err(CallwiseError::InvalidFunctionCall),
        };
        if name.trim().is_empty() {
            return Err(CallwiseError::InvalidFunctionCall);
        }
        Ok(Self::Named(name.to_string()))
    }

    /// The forced function name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Auto => None,
            Self::Named(name) => Some(name),
        }
    }

    /// Wire form: `"auto"` or `{"name": ...}`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Auto => Value::String("auto".into()),
            Self::Named(name) => serde_json::json!({ "name": name }),
        }
    }
}

impl Serialize for FunctionCallDirective {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_wire().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn song_function() -> FunctionSchema {
        compose_function(
            "write_song",
            "Write a song about AI",
            [("lyrics", PropertySchema::string("The lyrics for the song"))],
            ["lyrics"],
        )
        .expect("valid schema")
    }

    #[test]
    fn composed_function_matches_wire_shape() {
        let expected = json!({
            "name": "summarize_text",
            "description": "Summarize the text. Include the topic, subtopics.",
            "parameters": {
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Detailed summary of the text.",
                    },
                },
                "required": ["summary"],
            },
        });
        let composed = compose_function(
            "summarize_text",
            "Summarize the text. Include the topic, subtopics.",
            [("summary", PropertySchema::string("Detailed summary of the text."))],
            ["summary"],
        )
        .expect("valid schema");
        assert_eq!(serde_json::to_value(&composed).expect("serialize"), expected);
    }

    #[test]
    fn undeclared_required_property_is_rejected() {
        let err = compose_function(
            "broken",
            "",
            [("a", PropertySchema::string("a"))],
            ["a", "b"],
        )
        .expect_err("b is not declared");
        assert!(err.to_string().contains("not declared: b"), "{err}");
    }

    #[test]
    fn extra_keywords_round_trip() {
        let property = PropertySchema::string("mood").with_keyword("enum", json!(["happy", "sad"]));
        let value = serde_json::to_value(&property).expect("serialize");
        assert_eq!(value["enum"], json!(["happy", "sad"]));
        let back: PropertySchema = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, property);
    }

    #[test]
    fn single_object_becomes_single() {
        let value = serde_json::to_value(song_function()).expect("serialize");
        let functions = Functions::from_value(value).expect("single schema");
        assert!(matches!(functions, Functions::Single(_)));
        assert_eq!(functions.len(), 1);
    }

    #[test]
    fn array_becomes_list() {
        let value = json!([song_function(), song_function()]);
        let functions = Functions::from_value(value).expect("list");
        assert_eq!(functions.len(), 2);
        assert!(!functions.names_are_unique());
    }

    #[test]
    fn other_shapes_are_invalid_functions() {
        for bad in [json!("write_song"), json!(42), json!({"name": "x"}), json!([]), json!([1, 2])] {
            let err = Functions::from_value(bad).expect_err("not a function list");
            assert!(matches!(err, CallwiseError::InvalidFunctions), "{err}");
        }
    }

    #[test]
    fn empty_list_fails_shape_check() {
        assert!(Functions::List(vec![]).check_shape().is_err());
        assert!(Functions::from(song_function()).check_shape().is_ok());
    }

    #[test]
    fn lookup_by_name() {
        let functions = Functions::from(vec![song_function()]);
        assert!(functions.get("write_song").is_some());
        assert!(functions.get("read_song").is_none());
        assert_eq!(functions.names().collect::<Vec<_>>(), ["write_song"]);
    }

    #[test]
    fn directive_from_json() {
        assert_eq!(FunctionCallDirective::from_value(&json!("auto")).expect("auto"), FunctionCallDirective::Auto);
        assert_eq!(
            FunctionCallDirective::from_value(&json!("write_song")).expect("name"),
            FunctionCallDirective::named("write_song")
        );
        assert_eq!(
            FunctionCallDirective::from_value(&json!({"name": "write_song"})).expect("object"),
            FunctionCallDirective::named("write_song")
        );
        for bad in [json!({"fn": "x"}), json!(""), json!(3), json!({"name": 3})] {
            assert!(FunctionCallDirective::from_value(&bad).is_err());
        }
    }

    #[test]
    fn directive_wire_form() {
        assert_eq!(FunctionCallDirective::Auto.to_wire(), json!("auto"));
        assert_eq!(
            serde_json::to_value(FunctionCallDirective::named("f")).expect("serialize"),
            json!({"name": "f"})
        );
    }
}
