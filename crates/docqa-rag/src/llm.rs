//! Text generation through a local Ollama server.
use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use tracing::debug;

use docqa_core::config::GenerationSettings;
use docqa_core::traits::Generator;

pub struct OllamaGenerator {
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
    max_tokens: usize,
    client: Client,
}

impl OllamaGenerator {
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        // no request timeout
        let client = Client::builder().timeout(None::<std::time::Duration>).build()?;
        Ok(Self {
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "top_p": self.top_p,
                "num_predict": self.max_tokens,
            }
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        debug!("POST {} (model={})", url, self.model);
        let resp = self.client.post(&url).json(&self.request_body(prompt)).send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let txt = resp.text().unwrap_or_default();
            return Err(anyhow!("Ollama error {}: {}", status, txt));
        }
        let json: serde_json::Value = resp.json()?;
        json["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Ollama response has no message content"))
    }
}
