//! Breaker-guarded, signed and validated provider calls.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GuardError, GuardResult};
use crate::observability::metrics;
use crate::pipeline::GuardContext;
use crate::provider::prompt::PromptTemplate;
use crate::provider::transport::{Transport, TransportRequest, TransportResponse};
use crate::provider::types::{Difficulty, ProviderSettings, QuestionCount};
use crate::provider::{Backend, Provider};
use crate::resilience::CircuitBreaker;
use crate::security::signing::{redact, REQUEST_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::security::RequestSigner;
use crate::validation::{check_content_safety, strip_code_fences, validate_markdown_quiz_format};

/// Longest slice of a non-JSON error body kept in diagnostics.
const MAX_ERROR_BODY: usize = 200;

/// Where in the call a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Transport,
    Schema,
    Safety,
    Format,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Transport => "transport",
            Stage::Schema => "schema",
            Stage::Safety => "safety",
            Stage::Format => "format",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend wrapped in the full guard pipeline.
pub struct GuardedProvider<B> {
    backend: B,
    api_key: String,
    signing_secret: String,
    template: PromptTemplate,
    breaker: Arc<CircuitBreaker>,
    signer: RequestSigner,
    transport: Arc<dyn Transport>,
}

impl<B: Backend> GuardedProvider<B> {
    pub fn new(backend: B, settings: &ProviderSettings, context: &GuardContext, transport: Arc<dyn Transport>) -> Self {
        Self {
            backend,
            api_key: settings.api_key.clone(),
            signing_secret: settings.signing_secret().to_string(),
            template: PromptTemplate::from_config(&settings.prompt),
            breaker: Arc::clone(&context.breaker),
            signer: context.signer.clone(),
            transport,
        }
    }

    fn service(&self) -> &'static str {
        self.backend.kind().as_str()
    }

    fn build_request(&self, prompt: &str) -> TransportRequest {
        let body = self.backend.request_body(prompt);

        let mut metadata = self.signer.create_request_metadata(self.service());
        self.signer.sign_metadata(&mut metadata, &body, &self.signing_secret);

        let mut headers = vec![
            self.backend.auth_header(&self.api_key),
            (REQUEST_ID_HEADER.to_string(), metadata.request_id.to_string()),
            (TIMESTAMP_HEADER.to_string(), metadata.timestamp.to_string()),
        ];
        if let Some(signature) = &metadata.signature {
            headers.push((SIGNATURE_HEADER.to_string(), signature.to_string()));
        }

        tracing::debug!(
            provider = self.service(),
            request_id = %metadata.request_id,
            "Sending generation request"
        );

        TransportRequest {
            service: self.service().to_string(),
            url: self.backend.endpoint(),
            headers,
            body,
        }
    }

    async fn call(&self, content: &str, difficulty: Difficulty, count: QuestionCount) -> Result<String, (Stage, GuardError)> {
        let prompt = self.template.render(content, difficulty, count);
        let request = self.build_request(&prompt);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| (Stage::Transport, self.scrub(e)))?;

        if !response.is_success() {
            return Err((Stage::Transport, self.status_error(&response)));
        }

        let raw: Value = serde_json::from_str(&response.body).map_err(|e| {
            (
                Stage::Schema,
                GuardError::Schema {
                    provider: self.service().to_string(),
                    field: "$".to_string(),
                    reason: format!("body is not JSON: {}", e),
                },
            )
        })?;

        let text = self
            .backend
            .kind()
            .response_shape()
            .extract(self.service(), &raw)
            .map_err(|e| (Stage::Schema, e))?;

        check_content_safety(&text).map_err(|e| (Stage::Safety, e))?;

        let cleaned = strip_code_fences(&text);
        let quiz = validate_markdown_quiz_format(&cleaned).map_err(|e| (Stage::Format, e))?;
        tracing::debug!(provider = self.service(), questions = quiz.len(), "Quiz validated");

        Ok(cleaned)
    }

    /// Map a non-2xx reply to an error, keeping secrets out of the message.
    fn status_error(&self, response: &TransportResponse) -> GuardError {
        let message = self.scrub_text(&error_message(&response.body));
        let service = self.service();
        match response.status {
            401 | 403 => GuardError::Configuration(format!(
                "{} rejected the credentials (status {}): {}",
                service, response.status, message
            )),
            404 if message.to_ascii_lowercase().contains("model") => GuardError::Configuration(format!(
                "{} does not recognise model '{}': {}",
                service,
                self.backend.model(),
                message
            )),
            status => GuardError::Transport {
                provider: service.to_string(),
                status: Some(status),
                message,
            },
        }
    }

    fn scrub_text(&self, text: &str) -> String {
        redact(text, &[self.api_key.as_str(), self.signing_secret.as_str()])
    }

    fn scrub(&self, error: GuardError) -> GuardError {
        match error {
            GuardError::Transport { provider, status, message } => GuardError::Transport {
                provider,
                status,
                message: self.scrub_text(&message),
            },
            GuardError::Configuration(message) => GuardError::Configuration(self.scrub_text(&message)),
            other => other,
        }
    }
}

#[async_trait]
impl<B: Backend> Provider for GuardedProvider<B> {
    fn name(&self) -> &'static str {
        self.service()
    }

    async fn generate(&self, content: &str, difficulty: Difficulty, count: QuestionCount) -> GuardResult<String> {
        let service = self.service();
        let permit = self.breaker.admit(service)?;

        let start = Instant::now();
        match self.call(content, difficulty, count).await {
            Ok(markdown) => {
                permit.success();
                metrics::record_provider_call(service, "success", start);
                tracing::info!(
                    provider = service,
                    difficulty = %difficulty,
                    count = count.get(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Quiz generated"
                );
                Ok(markdown)
            }
            Err((stage, error)) => {
                permit.failure();
                metrics::record_provider_call(service, stage.as_str(), start);
                tracing::warn!(
                    provider = service,
                    stage = %stage,
                    error = %error,
                    "Provider call failed"
                );
                Err(error)
            }
        }
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let found = match json.get("error") {
            Some(Value::Object(err)) => err.get("message").and_then(Value::as_str),
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
        .or_else(|| json.get("message").and_then(Value::as_str));
        if let Some(message) = found {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::config::GuardConfig;
    use crate::provider::openai::OpenAiBackend;
    use crate::provider::tests::settings;
    use crate::provider::types::BackendKind;
    use crate::resilience::BreakerState;

    const QUIZ: &str = "What is 2 + 2?\n- [x] 4\n- [ ] 3\n- [ ] 5\n- [ ] 22";

    struct Scripted {
        reply: TransportResponse,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl Scripted {
        fn new(status: u16, body: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: TransportResponse {
                    status,
                    body: body.into(),
                },
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: TransportRequest) -> GuardResult<TransportResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    fn provider(transport: Arc<Scripted>) -> (GuardedProvider<OpenAiBackend>, GuardContext) {
        let context = GuardContext::from_config(&GuardConfig::default());
        let s = settings(BackendKind::OpenAi);
        let provider = GuardedProvider::new(OpenAiBackend::new(&s), &s, &context, transport);
        (provider, context)
    }

    fn responses_body(text: &str) -> String {
        json!({"output": [{"type": "message", "content": [{"type": "output_text", "text": text}]}]}).to_string()
    }

    fn count(n: u32) -> QuestionCount {
        QuestionCount::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_success_strips_fences() {
        let transport = Scripted::new(200, responses_body(&format!("```markdown\n{}\n```", QUIZ)));
        let (provider, context) = provider(Arc::clone(&transport));

        let markdown = provider.generate("arithmetic", Difficulty::Easy, count(1)).await.unwrap();
        assert_eq!(markdown, QUIZ);
        assert_eq!(context.breaker.status()["openai"].failure_count, 0);
    }

    #[tokio::test]
    async fn test_request_is_signed() {
        let transport = Scripted::new(200, responses_body(QUIZ));
        let (provider, context) = provider(Arc::clone(&transport));
        provider.generate("arithmetic", Difficulty::Easy, count(1)).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.url, "https://api.openai.com/v1/responses");
        let header = |name: &str| {
            request
                .headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(header("Authorization"), "Bearer sk-test");
        let signature = header(SIGNATURE_HEADER);
        assert!(context
            .signer
            .verify_signature("openai", &request.body, &signature, "sk-test")
            .is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_is_configuration_and_redacted() {
        let body = json!({"error": {"message": "Incorrect API key provided: sk-test"}}).to_string();
        let (provider, context) = provider(Scripted::new(401, body));

        let err = provider.generate("x", Difficulty::Easy, count(1)).await.unwrap_err();
        let text = err.to_string();
        assert!(matches!(err, GuardError::Configuration(_)));
        assert!(!text.contains("sk-test"));
        assert!(text.contains("[REDACTED]"));
        assert_eq!(context.breaker.status()["openai"].failure_count, 1);
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let body = json!({"error": "The model `gpt-9` does not exist"}).to_string();
        let (provider, _context) = provider(Scripted::new(404, body));
        let err = provider.generate("x", Difficulty::Easy, count(1)).await.unwrap_err();
        assert!(matches!(err, GuardError::Configuration(ref m) if m.contains("gpt-4o-mini")));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let (provider, _context) = provider(Scripted::new(503, "upstream overloaded"));
        let err = provider.generate("x", Difficulty::Easy, count(1)).await.unwrap_err();
        match err {
            GuardError::Transport { status, message, .. } => {
                assert_eq!(status, Some(503));
                assert_eq!(message, "upstream overloaded");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_schema_failure() {
        let (provider, context) = provider(Scripted::new(200, "<html>oops</html>"));
        let err = provider.generate("x", Difficulty::Easy, count(1)).await.unwrap_err();
        assert!(matches!(err, GuardError::Schema { ref field, .. } if field == "$"));
        assert_eq!(context.breaker.status()["openai"].failure_count, 1);
    }

    #[tokio::test]
    async fn test_unsafe_content_counts_as_failure() {
        let (provider, context) = provider(Scripted::new(200, responses_body("Q?\n<script>x</script>")));
        let err = provider.generate("x", Difficulty::Easy, count(1)).await.unwrap_err();
        assert!(matches!(err, GuardError::ContentSafety(_)));
        assert_eq!(context.breaker.status()["openai"].failure_count, 1);
        assert_eq!(context.breaker.state("openai"), BreakerState::Closed);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error":{"message":"bad key"}}"#), "bad key");
        assert_eq!(error_message(r#"{"error":"quota"}"#), "quota");
        assert_eq!(error_message(r#"{"message":"top level"}"#), "top level");
        assert_eq!(error_message(""), "empty response body");
        assert_eq!(error_message(&"x".repeat(500)).len(), MAX_ERROR_BODY);
    }
}
