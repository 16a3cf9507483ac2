//! Tolerant parsing of model responses into JSON records.
//!
//! Models are asked to answer with a single JSON object, but in practice the
//! object arrives wrapped in prose or markdown fences, with raw line breaks
//! inside string values, trailing commas, LaTeX backslashes that are not valid
//! JSON escapes, or cut off mid-way by a token limit. [`parse_response`]
//! repairs what it can in a fixed sequence of passes:
//!
//! 1. Already-structured input is returned unchanged.
//! 2. The candidate is the span from the first `{` to the last `}`.
//! 3. Raw line breaks inside string literals are escaped.
//! 4. Trailing commas before `}` or `]` are removed.
//! 5. Backslashes that do not start a valid JSON escape are doubled.
//! 6. The result is decoded with `serde_json`; it must be an object.
//! 7. If decoding fails and the candidate has a `"questions"` key, every
//!    complete `"question": "..."` field is salvaged.
//!
//! # Example
//!
//! ```
//! use question_forge::utils::response_parser::parse_response;
//!
//! let raw = "Sure! Here you go:\n```json\n{\"tags\": [\"math\",], \"question_type\": \"proof\"}\n```";
//! let record = parse_response(raw).unwrap();
//! assert_eq!(record["question_type"], "proof");
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// A decoded JSON object.
pub type Record = Map<String, Value>;

/// Escape characters that may legally follow a backslash in a JSON string.
const VALID_ESCAPES: [char; 9] = ['"', '\\', '/', 'b', 'f', 'n', 'r', 't', 'u'];

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid"));

static QUESTION_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""question"\s*:\s*"((?:[^"\\\n]|\\.)*)""#).expect("question field pattern is valid")
});

/// Model output that could not be turned into a record.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("unable to parse model response: {reason}")]
pub struct ParseError {
    /// The response text exactly as received.
    pub raw: String,
    /// Why the last decoding attempt failed.
    pub reason: String,
}

/// Input accepted by [`parse_response`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// Free-form model text.
    Text(String),
    /// A value that is already structured.
    Record(Record),
}

impl From<String> for RawResponse {
    fn from(text: String) -> Self {
        RawResponse::Text(text)
    }
}

impl From<&str> for RawResponse {
    fn from(text: &str) -> Self {
        RawResponse::Text(text.to_string())
    }
}

impl From<Record> for RawResponse {
    fn from(record: Record) -> Self {
        RawResponse::Record(record)
    }
}

/// Parses a model response into a JSON object, repairing common defects.
///
/// # Errors
///
/// Returns [`ParseError`] carrying the raw text when no pass produces an
/// object and nothing could be salvaged.
pub fn parse_response(raw: impl Into<RawResponse>) -> Result<Record, ParseError> {
    let text = match raw.into() {
        RawResponse::Record(record) => return Ok(record),
        RawResponse::Text(text) => text,
    };

    let candidate = extract_candidate(&text);
    let cleaned = repair_invalid_escapes(&strip_trailing_commas(&sanitize_strings(candidate)));

    let reason = match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(record)) => return Ok(record),
        Ok(other) => format!("expected a JSON object, found {}", value_kind(&other)),
        Err(e) => e.to_string(),
    };

    if candidate.contains("\"questions\"") {
        let questions = salvage_questions(&cleaned);
        if !questions.is_empty() {
            warn!(
                recovered = questions.len(),
                reason = %reason,
                "Salvaged questions from malformed model response"
            );
            let mut record = Record::new();
            record.insert(
                "questions".to_string(),
                Value::Array(questions.into_iter().map(Value::String).collect()),
            );
            return Ok(record);
        }
    }

    Err(ParseError { raw: text, reason })
}

/// Returns the span from the first `{` to the last `}` inclusive.
///
/// Falls back to the whole input when either brace is missing or they are
/// out of order.
pub fn extract_candidate(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Escapes raw line breaks that appear inside JSON string literals.
///
/// A single left-to-right scan tracks whether the cursor is inside a quoted
/// string. Inside a string a literal newline becomes the two characters `\n`
/// and a literal carriage return is dropped; a backslash carries the next
/// character along with it so an escaped quote never closes the string.
/// Text outside strings is copied verbatim.
pub fn sanitize_strings(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len());
    let mut in_string = false;
    let mut chars = candidate.chars();

    while let Some(c) = chars.next() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        match c {
            '\\' => {
                out.push('\\');
                match chars.next() {
                    // backslash-newline is a line continuation; keep it as an escape
                    Some('\n') => out.push('n'),
                    Some(next) => out.push(next),
                    None => {}
                }
            }
            '"' => {
                in_string = false;
                out.push('"');
            }
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }

    out
}

/// Removes commas that are immediately followed (ignoring whitespace) by a
/// closing brace or bracket.
pub fn strip_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").into_owned()
}

/// Doubles every backslash that does not begin a valid JSON escape.
///
/// Valid pairs are consumed as a unit, so `\\` followed by a letter stays a
/// literal backslash and is never re-split into a new escape. `\u` counts as
/// an escape only when four hex digits follow, so LaTeX such as `\underline`
/// or `\uparrow` keeps its backslash.
pub fn repair_invalid_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }

        match chars.get(i + 1) {
            Some('u') if is_unicode_escape(&chars[i + 2..]) => {
                out.push_str("\\u");
                i += 2;
            }
            Some(&next) if next != 'u' && VALID_ESCAPES.contains(&next) => {
                out.push('\\');
                out.push(next);
                i += 2;
            }
            _ => {
                out.push_str("\\\\");
                i += 1;
            }
        }
    }

    out
}

fn is_unicode_escape(rest: &[char]) -> bool {
    rest.len() >= 4 && rest[..4].iter().all(char::is_ascii_hexdigit)
}

/// Extracts every complete `"question": "<text>"` field from damaged JSON.
///
/// Fields whose string never closes (a truncated tail) are skipped. Escape
/// sequences inside a captured value are decoded.
pub fn salvage_questions(text: &str) -> Vec<String> {
    QUESTION_FIELD
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let body = m.as_str();
            serde_json::from_str::<String>(&format!("\"{}\"", body))
                .unwrap_or_else(|_| body.to_string())
        })
        .filter(|question| !question.trim().is_empty())
        .collect()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
