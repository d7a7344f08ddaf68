//! Wire-shape extractors for backend responses.
//!
//! Each [`ResponseShape`] is a pure `raw JSON → text` function that checks
//! presence and type at every required path and names the first offending
//! field on failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GuardError, GuardResult};

/// The three response shapes the guard understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// `output[]` message items carrying `content[].text` parts.
    Responses,
    /// `candidates[0].content.parts[0].text`.
    Candidates,
    /// `choices[0].message.content`.
    Choices,
}

impl ResponseShape {
    /// Extract generated text, labelling errors with `provider`.
    pub fn extract(self, provider: &str, raw: &Value) -> GuardResult<String> {
        let text = match self {
            ResponseShape::Responses => extract_responses(raw),
            ResponseShape::Candidates => extract_candidates(raw),
            ResponseShape::Choices => extract_choices(raw),
        }
        .map_err(|(field, reason)| GuardError::Schema {
            provider: provider.to_string(),
            field,
            reason,
        })?;

        if text.trim().is_empty() {
            return Err(GuardError::Schema {
                provider: provider.to_string(),
                field: self.text_path().to_string(),
                reason: "text is empty".to_string(),
            });
        }
        Ok(text)
    }

    fn text_path(self) -> &'static str {
        match self {
            ResponseShape::Responses => "output[].content[].text",
            ResponseShape::Candidates => "candidates[0].content.parts[0].text",
            ResponseShape::Choices => "choices[0].message.content",
        }
    }
}

type FieldResult<T> = Result<T, (String, String)>;

fn missing(field: &str) -> (String, String) {
    (field.to_string(), "missing".to_string())
}

fn wrong_type(field: &str, expected: &str) -> (String, String) {
    (field.to_string(), format!("expected {}", expected))
}

fn field<'a>(value: &'a Value, key: &str, path: &str) -> FieldResult<&'a Value> {
    match value.get(key) {
        Some(Value::Null) | None => Err(missing(path)),
        Some(v) => Ok(v),
    }
}

fn array<'a>(value: &'a Value, key: &str, path: &str) -> FieldResult<&'a Vec<Value>> {
    field(value, key, path)?
        .as_array()
        .ok_or_else(|| wrong_type(path, "array"))
}

fn first<'a>(items: &'a [Value], path: &str) -> FieldResult<&'a Value> {
    items.first().ok_or_else(|| (path.to_string(), "empty array".to_string()))
}

fn string<'a>(value: &'a Value, key: &str, path: &str) -> FieldResult<&'a str> {
    field(value, key, path)?
        .as_str()
        .ok_or_else(|| wrong_type(path, "string"))
}

fn extract_responses(raw: &Value) -> FieldResult<String> {
    let output = array(raw, "output", "output")?;
    let mut text = String::new();
    let mut messages = 0;

    for (i, item) in output.iter().enumerate() {
        if item.get("type").and_then(Value::as_str) != Some("message") {
            continue;
        }
        messages += 1;
        let content_path = format!("output[{}].content", i);
        let content = array(item, "content", &content_path)?;
        for (j, part) in content.iter().enumerate() {
            let text_path = format!("output[{}].content[{}].text", i, j);
            // Refusal parts and other non-text parts carry no text field.
            if part.get("type").and_then(Value::as_str).is_some_and(|t| t != "output_text") {
                continue;
            }
            text.push_str(string(part, "text", &text_path)?);
        }
    }

    if messages == 0 {
        return Err(("output".to_string(), "no message items".to_string()));
    }
    Ok(text)
}

fn extract_candidates(raw: &Value) -> FieldResult<String> {
    let candidates = array(raw, "candidates", "candidates")?;
    let candidate = first(candidates, "candidates")?;
    let content = field(candidate, "content", "candidates[0].content")?;
    if !content.is_object() {
        return Err(wrong_type("candidates[0].content", "object"));
    }
    let parts = array(content, "parts", "candidates[0].content.parts")?;
    let head = first(parts, "candidates[0].content.parts")?;

    let mut text = string(head, "text", "candidates[0].content.parts[0].text")?.to_string();
    for part in parts.iter().skip(1) {
        if let Some(more) = part.get("text").and_then(Value::as_str) {
            text.push_str(more);
        }
    }
    Ok(text)
}

fn extract_choices(raw: &Value) -> FieldResult<String> {
    let choices = array(raw, "choices", "choices")?;
    let choice = first(choices, "choices")?;
    let message = field(choice, "message", "choices[0].message")?;
    if !message.is_object() {
        return Err(wrong_type("choices[0].message", "object"));
    }
    Ok(string(message, "content", "choices[0].message.content")?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_field(err: GuardError) -> String {
        match err {
            GuardError::Schema { field, .. } => field,
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_responses_concatenates_parts() {
        let raw = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Q1?\n"},
                    {"type": "output_text", "text": "- [x] A"}
                ]}
            ]
        });
        let text = ResponseShape::Responses.extract("openai", &raw).unwrap();
        assert_eq!(text, "Q1?\n- [x] A");
    }

    #[test]
    fn test_responses_errors() {
        let err = ResponseShape::Responses.extract("openai", &json!({})).unwrap_err();
        assert_eq!(schema_field(err), "output");

        let err = ResponseShape::Responses
            .extract("openai", &json!({"output": "text"}))
            .unwrap_err();
        assert_eq!(schema_field(err), "output");

        let raw = json!({"output": [{"type": "message", "content": [{"type": "output_text", "text": 5}]}]});
        let err = ResponseShape::Responses.extract("openai", &raw).unwrap_err();
        assert_eq!(schema_field(err), "output[0].content[0].text");

        let raw = json!({"output": [{"type": "message"}]});
        let err = ResponseShape::Responses.extract("openai", &raw).unwrap_err();
        assert_eq!(schema_field(err), "output[0].content");
    }

    #[test]
    fn test_candidates() {
        let raw = json!({"candidates": [{"content": {"parts": [{"text": "Hello"}, {"text": " world"}]}}]});
        assert_eq!(
            ResponseShape::Candidates.extract("gemini", &raw).unwrap(),
            "Hello world"
        );

        let err = ResponseShape::Candidates
            .extract("gemini", &json!({"candidates": []}))
            .unwrap_err();
        assert_eq!(schema_field(err), "candidates");

        let err = ResponseShape::Candidates
            .extract("gemini", &json!({"candidates": [{"finishReason": "SAFETY"}]}))
            .unwrap_err();
        assert_eq!(schema_field(err), "candidates[0].content");

        let err = ResponseShape::Candidates
            .extract("gemini", &json!({"candidates": [{"content": {"parts": [{}]}}]}))
            .unwrap_err();
        assert_eq!(schema_field(err), "candidates[0].content.parts[0].text");
    }

    #[test]
    fn test_choices() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "Quiz"}}]});
        assert_eq!(ResponseShape::Choices.extract("openrouter", &raw).unwrap(), "Quiz");

        let raw = json!({"choices": [{"message": {"content": null}}]});
        let err = ResponseShape::Choices.extract("openrouter", &raw).unwrap_err();
        assert_eq!(schema_field(err), "choices[0].message.content");
    }

    #[test]
    fn test_empty_text_rejected() {
        let raw = json!({"choices": [{"message": {"content": "   \n"}}]});
        let err = ResponseShape::Choices.extract("openrouter", &raw).unwrap_err();
        assert!(err.to_string().contains("text is empty"));
        assert!(err.to_string().starts_with("openrouter"));
    }
}
