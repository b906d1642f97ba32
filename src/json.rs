//! Reading JSON objects out of free-form generator output

use crate::chat::{CompletionRequest, Message};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;

/// A parsed JSON object
pub type Object = Map<String, Value>;

/// Outcome of a single extraction attempt
pub type ParseResult<T> = std::result::Result<T, ParseFailure>;

/// Follow-up message sent when a reply could not be parsed
pub const CORRECTIVE_PROMPT: &str = "The previous output could not be parsed as JSON. \
Reply with exactly one JSON object: no Markdown, no code fences, no commentary.";

/// Why a reply did not yield a JSON object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Reply was empty or whitespace
    Empty,
    /// No `{ ... }` span in the reply
    NoObject,
    /// The span was found but is not valid JSON
    Invalid(String),
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty output"),
            Self::NoObject => write!(f, "no JSON object found in output"),
            Self::Invalid(e) => write!(f, "invalid JSON: {}", e),
        }
    }
}

/// Extract the outermost `{ ... }` span (first `{` to last `}`) and parse it
pub fn extract_json_object(text: &str) -> ParseResult<Object> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => return Err(ParseFailure::NoObject),
    };

    serde_json::from_str::<Object>(&text[start..=end]).map_err(|e| ParseFailure::Invalid(e.to_string()))
}

/// A parsed reply together with the raw text it came from
#[derive(Debug, Clone)]
pub struct JsonReply {
    /// Parsed object
    pub object: Object,
    /// Raw text of the reply that parsed
    pub raw: String,
    /// Number of generation calls made
    pub attempts: usize,
}

/// Run `call` and parse its reply, re-prompting up to `corrective_retries`
/// times with [`CORRECTIVE_PROMPT`] appended to the conversation.
///
/// Errors from `call` itself propagate unchanged; only parse failures are
/// retried here.
pub async fn with_corrective_retry<F, Fut>(
    mut request: CompletionRequest,
    corrective_retries: usize,
    mut call: F,
) -> Result<JsonReply>
where
    F: FnMut(CompletionRequest) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let label = request.label.clone().unwrap_or_else(|| "generation".to_string());
    let mut attempts = 0;

    loop {
        attempts += 1;
        let raw = call(request.clone()).await?;

        match extract_json_object(&raw) {
            Ok(object) => return Ok(JsonReply { object, raw, attempts }),
            Err(failure) if attempts <= corrective_retries => {
                tracing::warn!("{}: {}; sending corrective prompt", label, failure);
                request.push(Message::user(CORRECTIVE_PROMPT));
            }
            Err(failure) => return Err(Error::json_extraction(label, failure.to_string())),
        }
    }
}

/// Treat a scalar as a one-element list and `null`/missing as empty
pub fn list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

/// Read a value as trimmed text; `null`/missing reads as empty
pub fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

/// Read an integer from a JSON number or a numeric string
pub fn int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Collapse runs of whitespace into single spaces
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read a list of non-empty strings
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    list(value)
        .into_iter()
        .map(|v| text(Some(v)))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_extracts_object_from_fenced_reply() {
        let obj = extract_json_object("Sure!\n```json\n{\"a\": {\"b\": 1}}\n```\nDone.").unwrap();
        assert_eq!(obj["a"]["b"], 1);
    }

    #[test]
    fn test_extraction_failures() {
        assert_eq!(extract_json_object("   "), Err(ParseFailure::Empty));
        assert_eq!(extract_json_object("no braces here"), Err(ParseFailure::NoObject));
        assert_eq!(extract_json_object("} backwards {"), Err(ParseFailure::NoObject));
        assert!(matches!(
            extract_json_object("{\"a\": }"),
            Err(ParseFailure::Invalid(_))
        ));
    }

    #[test]
    fn test_lenient_readers() {
        let v = json!({"one": "x", "many": ["a", " ", "b"], "none": null, "n": "25", "f": -25.0});
        assert_eq!(list(v.get("one")).len(), 1);
        assert!(list(v.get("none")).is_empty());
        assert!(list(v.get("missing")).is_empty());
        assert_eq!(string_list(v.get("many")), vec!["a", "b"]);
        assert_eq!(int(v.get("n")), Some(25));
        assert_eq!(int(v.get("f")), Some(-25));
        assert_eq!(int(v.get("one")), None);
        assert_eq!(normalize_ws("  what   about\n\twages? "), "what about wages?");
    }

    #[tokio::test]
    async fn test_corrective_retry_recovers() {
        let seen = Mutex::new(Vec::new());
        let replies = Mutex::new(vec!["{\"ok\": true}", "not json at all"]);
        let request =
            CompletionRequest::new("m", vec![Message::user("go")]).with_label("meeting_vote");

        let reply = with_corrective_retry(request, 1, |req| {
            seen.lock().unwrap().push(req.messages.len());
            let next = replies.lock().unwrap().pop().unwrap_or_default().to_string();
            async move { Ok(next) }
        })
        .await
        .unwrap();

        assert_eq!(reply.attempts, 2);
        assert_eq!(reply.object["ok"], true);
        // second call carries the corrective prompt
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_corrective_retry_gives_up_after_one_retry() {
        let calls = Mutex::new(0);
        let request =
            CompletionRequest::new("m", vec![Message::user("go")]).with_label("meeting_vote");

        let err = with_corrective_retry(request, 1, |_| {
            *calls.lock().unwrap() += 1;
            async { Ok("still not json".to_string()) }
        })
        .await
        .unwrap_err();

        assert_eq!(*calls.lock().unwrap(), 2);
        assert!(matches!(err, Error::JsonExtraction { ref prompt, .. } if prompt == "meeting_vote"));
    }

    #[tokio::test]
    async fn test_generation_errors_are_not_reprompted() {
        let calls = Mutex::new(0);
        let request = CompletionRequest::new("m", vec![Message::user("go")]);

        let err = with_corrective_retry(request, 1, |_| {
            *calls.lock().unwrap() += 1;
            async { Err(Error::api(401, "unauthorized")) }
        })
        .await
        .unwrap_err();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(matches!(err, Error::Api { status: 401, .. }));
    }
}
