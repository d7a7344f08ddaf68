//! OpenAI Responses API.

use serde_json::{json, Value};

use crate::provider::types::{BackendKind, ProviderSettings};
use crate::provider::Backend;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }
}

impl Backend for OpenAiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self, api_key: &str) -> (String, String) {
        ("Authorization".to_string(), format!("Bearer {}", api_key))
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "input": prompt,
            "temperature": self.temperature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::tests::settings;

    #[test]
    fn test_request_shape() {
        let backend = OpenAiBackend::new(&settings(BackendKind::OpenAi));
        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/responses");
        assert_eq!(backend.auth_header("sk-1").1, "Bearer sk-1");
        let body = backend.request_body("hello");
        assert_eq!(body["input"], "hello");
        assert_eq!(body["model"], "gpt-4o-mini");
    }
}
