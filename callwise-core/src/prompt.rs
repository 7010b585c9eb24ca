//! Prompt templating.
//!
//! Templates use `{{key}}` placeholders. Parameters are typed as
//! [`PromptValue`]s so each kind of value has one well-defined rendering.
//! Named, versioned templates can be kept as TOML files and loaded into a
//! [`PromptLibrary`].

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CallwiseError, Result};
use crate::log::{LogKind, log};

/// A value that can be substituted into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptValue {
    /// Substituted as is.
    Text(String),
    /// Substituted in decimal form.
    Integer(i64),
    /// Items joined by newlines.
    List(Vec<String>),
    /// One `key::value` line per entry.
    Map(BTreeMap<String, String>),
    /// Substituted as `None`.
    Null,
}

impl PromptValue {
    /// The text that replaces the placeholder.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Integer(n) => n.to_string(),
            Self::List(items) => items.join("\n"),
            Self::Map(entries) => entries
                .iter()
                .map(|(key, value)| format!("{key}::{value}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Null => "None".to_string(),
        }
    }
}

impl From<&str> for PromptValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PromptValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for PromptValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PromptValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<Vec<String>> for PromptValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for PromptValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<BTreeMap<String, String>> for PromptValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<PromptValue>> From<Option<T>> for PromptValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<&Value> for PromptValue {
    type Error = CallwiseError;

    fn try_from(value: &Value) -> Result<Self> {
        let scalar = |item: &Value| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
            other => Err(CallwiseError::Template(format!("cannot substitute nested value {other}"))),
        };

        match value {
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .ok_or_else(|| CallwiseError::Template(format!("only integers can be substituted, got {n}"))),
            Value::Array(items) => items.iter().map(scalar).collect::<Result<_>>().map(Self::List),
            Value::Object(entries) => entries
                .iter()
                .map(|(key, item)| scalar(item).map(|rendered| (key.clone(), rendered)))
                .collect::<Result<_>>()
                .map(Self::Map),
            Value::Null => Ok(Self::Null),
            Value::Bool(b) => Err(CallwiseError::Template(format!("cannot substitute boolean {b}"))),
        }
    }
}

/// Substitute `{{key}}` placeholders in `template`.
///
/// Parameters without a placeholder are skipped; placeholders without a
/// parameter are left in place.
///
/// ```
/// use callwise_core::prompt::compose_prompt;
///
/// assert_eq!(compose_prompt("I am a {{object}}", [("object", "towel")]), "I am a towel");
/// ```
pub fn compose_prompt<I, K, V>(template: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<PromptValue>,
{
    let mut prompt = template.to_string();
    for (key, value) in params {
        let placeholder = format!("{{{{{}}}}}", key.as_ref());
        if prompt.contains(&placeholder) {
            prompt = prompt.replace(&placeholder, &value.into().render());
        }
    }

    log(LogKind::Info, false, format!("composed prompt:\n{prompt}"));
    prompt
}

/// [`compose_prompt`] with parameters taken from a JSON object.
///
/// # Errors
/// Returns `CallwiseError::Template` if `params` is not an object or holds a
/// value with no rendering (floats, booleans, nested structures).
pub fn compose_prompt_json(template: &str, params: &Value) -> Result<String> {
    let Value::Object(entries) = params else {
        return Err(CallwiseError::Template("prompt parameters must be an object".into()));
    };
    let typed = entries
        .iter()
        .map(|(key, value)| PromptValue::try_from(value).map(|v| (key.as_str(), v)))
        .collect::<Result<Vec<_>>>()?;
    Ok(compose_prompt(template, typed))
}

// ---------------------------------------------------------------------------
// PromptLibrary
// ---------------------------------------------------------------------------

/// `[prompt]` section of a template file.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: PromptTemplate,
}

/// A stored, versioned template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptTemplate {
    /// Version string, e.g. `"1.0"`.
    pub version: String,
    /// User-facing template text.
    pub text: String,
    /// Optional system message template.
    #[serde(default)]
    pub system: Option<String>,
    /// Suggested sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// A rendered template, ready to hand to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    /// Composed user text.
    pub text: String,
    /// Composed system message, if the template has one.
    pub system: Option<String>,
    /// Suggested temperature.
    pub temperature: Option<f32>,
}

/// Named prompt templates loaded from TOML.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptLibrary {
    /// Load every `*.toml` file in `dir`; each file's stem names its template.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read, a file does not
    /// parse, or no templates were found.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut templates = HashMap::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let content = fs::read_to_string(&path)?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| CallwiseError::Template(format!("failed to parse {}: {e}", path.display())))?;
            templates.insert(name.to_string(), parsed.prompt);
        }

        if templates.is_empty() {
            return Err(CallwiseError::Template(format!(
                "no prompt templates found in directory: {}",
                dir.display()
            )));
        }
        Ok(Self { templates })
    }

    /// Parse one template document and register it under `name`.
    ///
    /// # Errors
    /// Returns `CallwiseError::Template` if the document does not parse.
    pub fn insert_toml(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let parsed: TomlPromptFile =
            toml::from_str(source).map_err(|e| CallwiseError::Template(format!("failed to parse template: {e}")))?;
        self.templates.insert(name.into(), parsed.prompt);
        Ok(())
    }

    /// A library holding a single template parsed from `source`.
    ///
    /// # Errors
    /// Returns `CallwiseError::Template` if the document does not parse.
    pub fn from_toml_str(name: impl Into<String>, source: &str) -> Result<Self> {
        let mut library = Self::default();
        library.insert_toml(name, source)?;
        Ok(library)
    }

    /// Look up a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Compose the named template's text and system message.
    ///
    /// # Errors
    /// Returns `CallwiseError::Template` if no template has that name.
    pub fn render<I, K, V>(&self, name: &str, params: I) -> Result<RenderedPrompt>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<PromptValue>,
    {
        let template = self
            .get(name)
            .ok_or_else(|| CallwiseError::Template(format!("prompt template '{name}' not loaded")))?;

        let params: Vec<(String, PromptValue)> = params
            .into_iter()
            .map(|(key, value)| (key.as_ref().to_string(), value.into()))
            .collect();

        Ok(RenderedPrompt {
            text: compose_prompt(&template.text, params.iter().cloned()),
            system: template
                .system
                .as_deref()
                .map(|system| compose_prompt(system, params.iter().cloned())),
            temperature: template.temperature,
        })
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Names of all loaded templates, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
