//! Generative language model gateway.
//!
//! The core hands a fully rendered prompt to a [`LanguageModel`] and gets
//! text back. Timeouts live here, at the boundary; the synthesizers never
//! retry a failed generation on their own.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Generate a completion for `prompt`.
    ///
    /// Any transport failure or blank completion is
    /// [`RagError::GenerationUnavailable`].
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Always fails; used when `generation.provider = "disabled"`.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::generation(
            "generation provider is disabled; set [generation] provider in config",
        ))
    }
}

/// Language model served by Ollama's `POST /api/generate`, non-streaming.
pub struct OllamaModel {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "generation request");

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::generation(format!("request to {} timed out", self.url))
                } else {
                    RagError::generation(format!(
                        "cannot reach Ollama at {} ({})",
                        self.url, e
                    ))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::generation(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RagError::generation(format!("invalid response: {}", e)))?;
        parse_generate_response(&json)
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        return Err(RagError::generation(err.to_string()));
    }
    let text = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| RagError::generation("invalid Ollama response: missing response field"))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(RagError::generation("model returned an empty completion"));
    }
    Ok(text.to_string())
}

/// Create the configured [`LanguageModel`].
pub fn create_model(config: &GenerationConfig) -> anyhow::Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "ollama" => Ok(Box::new(OllamaModel::new(config)?)),
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let json = serde_json::json!({ "response": "  The answer.\n", "done": true });
        assert_eq!(parse_generate_response(&json).unwrap(), "The answer.");
    }

    #[test]
    fn test_blank_completion_is_unavailable() {
        let json = serde_json::json!({ "response": "   " });
        assert!(matches!(
            parse_generate_response(&json),
            Err(RagError::GenerationUnavailable { .. })
        ));
    }

    #[test]
    fn test_error_payload() {
        let json = serde_json::json!({ "error": "model 'llama2' not found" });
        let err = parse_generate_response(&json).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_disabled_model() {
        let err = DisabledModel.generate("hi").await.unwrap_err();
        assert!(matches!(err, RagError::GenerationUnavailable { .. }));
    }
}
