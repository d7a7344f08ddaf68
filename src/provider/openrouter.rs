//! OpenAI-compatible chat completions (OpenRouter and similar gateways).

use serde_json::{json, Value};

use crate::provider::types::{BackendKind, ProviderSettings};
use crate::provider::Backend;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct OpenRouterBackend {
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenRouterBackend {
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

impl Backend for OpenRouterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenRouter
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self, api_key: &str) -> (String, String) {
        ("Authorization".to_string(), format!("Bearer {}", api_key))
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        })
    }
}
