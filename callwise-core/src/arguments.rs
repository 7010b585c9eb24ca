//! Function-call argument parsing.
//!
//! Models are asked for JSON but do not always deliver it. Parsing escalates
//! through progressively more forgiving strategies:
//!
//! 1. already-structured payloads are returned unchanged;
//! 2. strict JSON;
//! 3. a literal parser that accepts single quotes, `True`/`False`/`None`,
//!    tuples and trailing commas;
//! 4. strict JSON again after stripping ellipsis markers, line breaks and
//!    non-ASCII characters;
//! 5. the literal parser on that cleaned text.
//!
//! Nothing here evaluates code: the literal parser only ever builds data.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

static ELLIPSIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.\.\.|…").expect("valid regex"));
static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\r\n]+").expect("valid regex"));
static NON_ASCII_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\x00-\x7F]+").expect("valid regex"));

/// Parse a function-call argument payload.
///
/// Returns `None` when no strategy yields a value; callers treat that as an
/// invalid call.
///
/// ```
/// use callwise_core::arguments::parse_arguments;
/// use serde_json::json;
///
/// let parsed = parse_arguments(&json!(r#"{"key1": "value1", "key2": 2}"#));
/// assert_eq!(parsed, Some(json!({"key1": "value1", "key2": 2})));
/// ```
#[must_use]
pub fn parse_arguments(arguments: &Value) -> Option<Value> {
    match arguments {
        Value::String(raw) => parse_argument_str(raw),
        Value::Null => None,
        structured => Some(structured.clone()),
    }
}

/// Parse an argument payload that arrived as text.
#[must_use]
pub fn parse_argument_str(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(raw) {
        return Some(value);
    }
    if let Some(value) = parse_literal(raw) {
        return Some(value);
    }

    let cleaned = clean_payload(raw);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }
    parse_literal(&cleaned)
}

/// Strip ellipsis markers, line breaks and non-ASCII characters.
#[must_use]
pub fn clean_payload(raw: &str) -> String {
    let without_ellipsis = ELLIPSIS_RE.replace_all(raw, "");
    let single_line = LINE_BREAK_RE.replace_all(&without_ellipsis, "");
    NON_ASCII_RE.replace_all(&single_line, "").into_owned()
}

/// Parse a Python-style literal: dicts, lists, tuples, quoted strings,
/// numbers, `True`, `False` and `None` (JSON spellings are accepted too).
///
/// Returns `None` on anything else, including trailing garbage.
#[must_use]
pub fn parse_literal(input: &str) -> Option<Value> {
    let mut parser = LiteralParser {
        chars: input.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    parser.at_end().then_some(value)
}

/// Deepest container nesting accepted, the same limit `serde_json` applies.
const MAX_DEPTH: usize = 128;

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_whitespace();
        match self.peek()? {
            open @ ('{' | '[' | '(') => self.nested(open),
            '\'' | '"' => self.string().map(Value::String),
            c if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            c if c.is_alphabetic() || c == '_' => self.keyword(),
            _ => None,
        }
    }

    fn nested(&mut self, open: char) -> Option<Value> {
        if self.depth >= MAX_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = match open {
            '{' => self.dict(),
            '[' => self.sequence(']'),
            _ => self.sequence(')'),
        };
        self.depth -= 1;
        value
    }

    fn dict(&mut self) -> Option<Value> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_whitespace();
            if self.peek()? == '}' {
                self.bump();
                return Some(Value::Object(map));
            }

            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };

            self.skip_whitespace();
            if self.bump()? != ':' {
                return None;
            }
            let value = self.value()?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.bump()? {
                ',' => {}
                '}' => return Some(Value::Object(map)),
                _ => return None,
            }
        }
    }

    fn sequence(&mut self, close: char) -> Option<Value> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek()? == close {
                self.bump();
                return Some(Value::Array(items));
            }

            items.push(self.value()?);

            self.skip_whitespace();
            match self.bump()? {
                ',' => {}
                c if c == close => return Some(Value::Array(items)),
                _ => return None,
            }
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => break,
                '\n' | '\r' => return None,
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'u' => out.push(self.unicode_escape()?),
                    // Backslash-newline continues the line.
                    '\n' => {}
                    c @ ('\\' | '\'' | '"' | '/') => out.push(c),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                },
                c => out.push(c),
            }
        }

        // Adjacent literals concatenate: 'a' 'b' == 'ab'.
        let resume = self.pos;
        self.skip_whitespace();
        match self.peek() {
            Some(next) if next == '\'' || next == '"' => {
                let rest = self.string()?;
                out.push_str(&rest);
            }
            _ => self.pos = resume,
        }
        Some(out)
    }

    fn unicode_escape(&mut self) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..4 {
            code = code * 16 + self.bump()?.to_digit(16)?;
        }
        char::from_u32(code)
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        let literal = literal.strip_prefix('+').unwrap_or(&literal);

        if let Ok(int) = literal.parse::<i64>() {
            return Some(Value::Number(int.into()));
        }
        let float = literal.parse::<f64>().ok()?;
        Number::from_f64(float).map(Value::Number)
    }

    fn keyword(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" => Some(Value::Null),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strict_json_string() {
        let parsed = parse_arguments(&json!("{\"key1\": \"value1\", \"key2\": 2}"));
        assert_eq!(parsed, Some(json!({"key1": "value1", "key2": 2})));
    }

    #[test]
    fn structured_payloads_pass_through() {
        let object = json!({"lyrics": "la la"});
        assert_eq!(parse_arguments(&object), Some(object.clone()));
        let array = json!([1, 2, 3]);
        assert_eq!(parse_arguments(&array), Some(array.clone()));
    }

    #[test]
    fn null_payload_is_none() {
        assert_eq!(parse_arguments(&Value::Null), None);
    }

    #[test]
    fn python_style_literal() {
        let parsed = parse_argument_str("{'name': 'towel', 'dry': True, 'stains': None, 'size': (1, 2.5)}");
        assert_eq!(
            parsed,
            Some(json!({"name": "towel", "dry": true, "stains": null, "size": [1, 2.5]}))
        );
    }

    #[test]
    fn trailing_commas_are_tolerated() {
        assert_eq!(parse_argument_str("{'a': [1, 2,],}"), Some(json!({"a": [1, 2]})));
    }

    #[test]
    fn truncated_output_with_ellipsis() {
        let parsed = parse_argument_str("{\"summary\": \"Rust is fast\"...}");
        assert_eq!(parsed, Some(json!({"summary": "Rust is fast"})));
    }

    #[test]
    fn raw_line_breaks_inside_strings() {
        let parsed = parse_argument_str("{\"lyrics\": \"line one\nline two\"}");
        assert_eq!(parsed, Some(json!({"lyrics": "line oneline two"})));
    }

    #[test]
    fn non_ascii_noise_is_stripped() {
        let parsed = parse_argument_str("{\"a\":\u{200b} 1}");
        assert_eq!(parsed, Some(json!({"a": 1})));
    }

    #[test]
    fn escapes_in_single_quoted_strings() {
        assert_eq!(parse_literal(r"'it\'s A'"), Some(json!("it's A")));
    }

    #[test]
    fn adjacent_strings_concatenate() {
        assert_eq!(parse_literal("{'a': 'foo' 'bar'}"), Some(json!({"a": "foobar"})));
    }

    #[test]
    fn code_is_not_evaluated() {
        assert_eq!(parse_argument_str("__import__('os').system('true')"), None);
        assert_eq!(parse_argument_str("{'a': 1 + 1}"), None);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_argument_str("not even close"), None);
        assert_eq!(parse_argument_str("{'a': 1"), None);
        assert_eq!(parse_argument_str(""), None);
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_literal("-3"), Some(json!(-3)));
        assert_eq!(parse_literal("1_000"), Some(json!(1000)));
        assert_eq!(parse_literal("2.5e1"), Some(json!(25.0)));
        assert_eq!(parse_literal("1.2.3"), None);
    }

    #[test]
    fn clean_payload_strips_everything_at_once() {
        assert_eq!(clean_payload("a...b…c\r\nd\u{e9}"), "abcd");
    }

    #[test]
    fn deep_nesting_is_rejected_not_overflowed() {
        let depth = 10_000;
        let payload = "[".repeat(depth) + &"]".repeat(depth);
        assert_eq!(parse_arguments(&json!(payload)), None);
        assert_eq!(parse_literal(&"{'a': ".repeat(depth)), None);
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let tuples = "(".repeat(MAX_DEPTH) + &")".repeat(MAX_DEPTH);
        assert!(parse_literal(&tuples).is_some());

        let too_deep = "(".repeat(MAX_DEPTH + 1) + &")".repeat(MAX_DEPTH + 1);
        assert_eq!(parse_literal(&too_deep), None);
    }
}
