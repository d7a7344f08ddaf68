//! AI provider abstraction.
//!
//! # Responsibilities
//! - Speak each backend's wire format (`openai`, `gemini`, `openrouter`)
//! - Wrap every call in breaker checks, signing and response validation
//! - Build the configured provider from settings
//!
//! # Data Flow
//! ```text
//! generate(content, difficulty, count)
//!     → breaker.admit (permit held for the call)
//!     → prompt render → sign → transport
//!     → schema → safety → strip fences → quiz format
//!     → permit.success / permit.failure (once; failure if dropped)
//! ```

pub mod gemini;
pub mod guarded;
pub mod openai;
pub mod openrouter;
pub mod prompt;
pub mod transport;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{GuardError, GuardResult};
use crate::pipeline::GuardContext;

pub use guarded::GuardedProvider;
pub use prompt::PromptTemplate;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
pub use types::{BackendKind, Difficulty, ProviderSettings, QuestionCount};

/// Uniform quiz generation contract.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Service name used for breaker records and logs.
    fn name(&self) -> &'static str;

    /// Generate validated quiz markdown from `content`.
    async fn generate(&self, content: &str, difficulty: Difficulty, count: QuestionCount) -> GuardResult<String>;
}

/// Wire-format details of one backend.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn model(&self) -> &str;

    /// Full URL of the generation endpoint.
    fn endpoint(&self) -> String;

    /// Header carrying the API key.
    fn auth_header(&self, api_key: &str) -> (String, String);

    fn request_body(&self, prompt: &str) -> Value;
}

/// Build the configured provider.
///
/// Fails with a configuration error before any breaker interaction when the
/// API key or model is missing.
pub fn create_provider(
    settings: &ProviderSettings,
    context: &GuardContext,
    transport: Arc<dyn Transport>,
) -> GuardResult<Box<dyn Provider>> {
    if settings.api_key.trim().is_empty() {
        return Err(GuardError::Configuration(format!(
            "no API key configured for {}; set `{}`",
            settings.backend,
            settings.backend.api_key_setting()
        )));
    }
    if settings.model.trim().is_empty() {
        return Err(GuardError::Configuration(format!(
            "no model configured for {}",
            settings.backend
        )));
    }

    tracing::info!(provider = %settings.backend, model = %settings.model, "Creating provider");

    let provider: Box<dyn Provider> = match settings.backend {
        BackendKind::OpenAi => Box::new(GuardedProvider::new(
            openai::OpenAiBackend::new(settings),
            settings,
            context,
            transport,
        )),
        BackendKind::Gemini => Box::new(GuardedProvider::new(
            gemini::GeminiBackend::new(settings),
            settings,
            context,
            transport,
        )),
        BackendKind::OpenRouter => Box::new(GuardedProvider::new(
            openrouter::OpenRouterBackend::new(settings),
            settings,
            context,
            transport,
        )),
    };
    Ok(provider)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{GuardConfig, PromptConfig};

    pub(crate) fn settings(backend: BackendKind) -> ProviderSettings {
        ProviderSettings {
            backend,
            model: "gpt-4o-mini".into(),
            base_url: None,
            temperature: 0.7,
            api_key: "sk-test".into(),
            signing_secret: None,
            prompt: PromptConfig::default(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(180),
            https_only: true,
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _request: TransportRequest) -> GuardResult<TransportResponse> {
            panic!("transport must not be called");
        }
    }

    #[test]
    fn test_create_provider_rejects_missing_key() {
        let context = GuardContext::from_config(&GuardConfig::default());
        let mut s = settings(BackendKind::Gemini);
        s.api_key = "  ".into();
        let err = create_provider(&s, &context, Arc::new(Unreachable)).err().unwrap();
        assert!(matches!(err, GuardError::Configuration(ref m) if m.contains("gemini_api_key")));
        assert!(context.breaker.status().is_empty());
    }

    #[test]
    fn test_create_provider_rejects_empty_model() {
        let context = GuardContext::from_config(&GuardConfig::default());
        let mut s = settings(BackendKind::OpenAi);
        s.model = String::new();
        assert!(matches!(
            create_provider(&s, &context, Arc::new(Unreachable)),
            Err(GuardError::Configuration(_))
        ));
    }

    #[test]
    fn test_create_provider_names() {
        let context = GuardContext::from_config(&GuardConfig::default());
        for kind in [BackendKind::OpenAi, BackendKind::Gemini, BackendKind::OpenRouter] {
            let provider = create_provider(&settings(kind), &context, Arc::new(Unreachable)).unwrap();
            assert_eq!(provider.name(), kind.as_str());
        }
    }
}
