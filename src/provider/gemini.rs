//! Google Gemini `generateContent`.

use serde_json::{json, Value};

use crate::provider::types::{BackendKind, ProviderSettings};
use crate::provider::Backend;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    base_url: String,
    model: String,
    temperature: f32,
}

impl GeminiBackend {
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

impl Backend for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    /// The key travels in a header, never in the query string.
    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    fn auth_header(&self, api_key: &str) -> (String, String) {
        ("x-goog-api-key".to_string(), api_key.to_string())
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "temperature": self.temperature,
            },
        })
    }
}
