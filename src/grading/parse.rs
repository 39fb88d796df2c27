use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::rubrics::{CRITERIA, ENHANCED_FIELD, FEEDBACK_FIELD, TOTAL_FIELD};

/// How much structure could be recovered from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// The whole (unfenced) reply was a JSON object.
    Strict(Map<String, Value>),
    /// A JSON object was found embedded in surrounding prose.
    Recovered(Map<String, Value>),
    /// Nothing parseable; carries the unfenced reply text.
    Unparsed(String),
}

/// Untrusted values pulled out of a reply, before clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFields {
    pub total: f64,
    /// Goal, Context, Source, Expectation, in `CRITERIA` order.
    pub criteria: [f64; 4],
    pub feedback: String,
    pub enhanced: Option<String>,
}

fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is valid"))
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("number pattern is valid"))
}

fn leading_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?")
            .expect("leading number pattern is valid")
    })
}

/// Removes a surrounding Markdown code fence (with or without a language tag).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        let rest = match rest.find('\n') {
            Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[nl + 1..]
            }
            _ => rest.strip_prefix("json").unwrap_or(rest),
        };
        text = rest.trim();
    }

    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim();
    }

    text
}

/// Tries a strict parse first, then the greedy `{...}` span.
pub fn parse_response(text: &str) -> ParsedResponse {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return ParsedResponse::Strict(map);
    }

    match object_pattern().find(text) {
        Some(m) => match serde_json::from_str::<Value>(m.as_str()) {
            Ok(Value::Object(map)) => return ParsedResponse::Recovered(map),
            Ok(_) => warn!("Embedded JSON in model response is not an object"),
            Err(e) => warn!("Failed to parse JSON from model response: {}", e),
        },
        None => warn!("No JSON object found in model response"),
    }

    debug!("Unparsed model response: {}", text);
    ParsedResponse::Unparsed(text.to_string())
}

/// All numeric substrings of `text`, in order of appearance.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    number_pattern()
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Numbers pass through, numeric strings parse by their leading number,
/// everything else is 0.
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => leading_number_pattern()
            .find(s.trim_start())
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Empty, null, false and zero count as absent.
pub fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Newlines become spaces; result is at most `max_chars` characters.
pub fn flatten_feedback(text: &str, max_chars: usize) -> String {
    text.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .take(max_chars)
        .collect()
}

impl ParsedResponse {
    pub fn is_unparsed(&self) -> bool {
        matches!(self, ParsedResponse::Unparsed(_))
    }

    /// Reduces every variant to the same field set.
    pub fn into_fields(self, feedback_max_chars: usize) -> ResponseFields {
        match self {
            ParsedResponse::Strict(map) | ParsedResponse::Recovered(map) => ResponseFields {
                total: coerce_number(map.get(TOTAL_FIELD)),
                criteria: CRITERIA.map(|c| coerce_number(map.get(c.field))),
                feedback: coerce_text(map.get(FEEDBACK_FIELD)).unwrap_or_default(),
                enhanced: coerce_text(map.get(ENHANCED_FIELD)),
            },
            ParsedResponse::Unparsed(text) => {
                let numbers = extract_numbers(&text);
                let nth = |i: usize| numbers.get(i).copied().unwrap_or(0.0);
                ResponseFields {
                    total: nth(0),
                    criteria: [nth(1), nth(2), nth(3), nth(4)],
                    feedback: flatten_feedback(&text, feedback_max_chars),
                    enhanced: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BODY: &str = r#"{"score": 15, "goal_score": 4, "context_score": 4, "source_score": 3, "expectation_score": 4, "feedback": "solid", "enhanced_prompt": "better"}"#;

    #[test]
    fn strips_json_fence() {
        let fenced = format!("```json\n{}\n```", BODY);
        assert_eq!(strip_code_fences(&fenced), BODY);
    }

    #[test]
    fn strips_bare_and_inline_fences() {
        assert_eq!(strip_code_fences(&format!("```\n{}\n```", BODY)), BODY);
        assert_eq!(strip_code_fences(&format!("  ```json{}```  ", BODY)), BODY);
    }

    #[test]
    fn unfenced_text_is_only_trimmed() {
        assert_eq!(strip_code_fences("  hello\n"), "hello");
    }

    #[test]
    fn fenced_and_plain_parse_identically() {
        let fenced = format!("```json\n{}\n```", BODY);
        let a = parse_response(strip_code_fences(&fenced));
        let b = parse_response(strip_code_fences(BODY));
        assert_eq!(a, b);
        assert!(matches!(a, ParsedResponse::Strict(_)));
    }

    #[test]
    fn recovers_object_embedded_in_prose() {
        let text = format!("Here is my evaluation: {} Thanks!", BODY);
        match parse_response(&text) {
            ParsedResponse::Recovered(map) => assert_eq!(map["score"], json!(15)),
            other => panic!("expected Recovered, got {:?}", other),
        }
    }

    #[test]
    fn top_level_scalar_is_not_an_object() {
        assert!(parse_response("14").is_unparsed());
    }

    #[test]
    fn broken_braces_fall_through() {
        let parsed = parse_response("score {14, context 3}");
        assert_eq!(parsed, ParsedResponse::Unparsed("score {14, context 3}".to_string()));
    }

    #[test]
    fn coerces_numeric_strings_like_parse_float() {
        assert_eq!(coerce_number(Some(&json!("14"))), 14.0);
        assert_eq!(coerce_number(Some(&json!(" 3.5/5"))), 3.5);
        assert_eq!(coerce_number(Some(&json!("-2"))), -2.0);
        assert_eq!(coerce_number(Some(&json!("four"))), 0.0);
        assert_eq!(coerce_number(Some(&json!(true))), 0.0);
        assert_eq!(coerce_number(Some(&Value::Null)), 0.0);
        assert_eq!(coerce_number(None), 0.0);
    }

    #[test]
    fn coerce_text_treats_falsy_values_as_absent() {
        assert_eq!(coerce_text(Some(&json!(""))), None);
        assert_eq!(coerce_text(Some(&json!(false))), None);
        assert_eq!(coerce_text(Some(&json!(0))), None);
        assert_eq!(coerce_text(Some(&json!("ok"))), Some("ok".to_string()));
        assert_eq!(coerce_text(Some(&json!(7))), Some("7".to_string()));
    }

    #[test]
    fn extracts_numbers_in_order() {
        assert_eq!(
            extract_numbers("This prompt scores around 14 out of 20, context 3.5"),
            vec![14.0, 20.0, 3.5]
        );
        assert!(extract_numbers("no digits here").is_empty());
    }

    #[test]
    fn only_ascii_digits_count_as_numbers() {
        assert_eq!(extract_numbers("score 1\u{0663} then 4"), vec![1.0, 4.0]);
        let fields = ParsedResponse::Unparsed("score 1\u{0663} then 4".into()).into_fields(2000);
        assert_eq!(fields.total, 1.0);
        assert_eq!(fields.criteria[0], 4.0);
        assert_eq!(coerce_number(Some(&json!("\u{0663}"))), 0.0);
    }

    #[test]
    fn flatten_feedback_removes_newlines_and_truncates() {
        let text = "line one\r\nline two\n".repeat(500);
        let flat = flatten_feedback(&text, 2000);
        assert_eq!(flat.chars().count(), 2000);
        assert!(!flat.contains('\n') && !flat.contains('\r'));
    }

    #[test]
    fn flatten_feedback_counts_characters_not_bytes() {
        let flat = flatten_feedback(&"é".repeat(10), 4);
        assert_eq!(flat, "éééé");
    }

    #[test]
    fn unparsed_fields_are_positional() {
        let fields = ParsedResponse::Unparsed("scores 14 out of 20, context 3".into()).into_fields(2000);
        assert_eq!(fields.total, 14.0);
        assert_eq!(fields.criteria, [20.0, 3.0, 0.0, 0.0]);
        assert_eq!(fields.feedback, "scores 14 out of 20, context 3");
        assert_eq!(fields.enhanced, None);
    }

    #[test]
    fn object_fields_read_by_name() {
        let fields = parse_response(BODY).into_fields(2000);
        assert_eq!(fields.total, 15.0);
        assert_eq!(fields.criteria, [4.0, 4.0, 3.0, 4.0]);
        assert_eq!(fields.feedback, "solid");
        assert_eq!(fields.enhanced.as_deref(), Some("better"));
    }
}
