//! Gemini-backed summarization engine.
//!
//! Thin client over the `generateContent` REST endpoint. All failure modes
//! (transport, timeout, API error payloads, blocked prompts, blank
//! candidates) surface as [`EngineError`] variants so callers never have to
//! inspect summary text for error markers.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EngineError, SummaryRequest, Summarizer};

/// Shorter responses than this are treated as unusable output.
const MIN_SUMMARY_CHARS: usize = 8;

/// Configuration for the Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Model name, e.g. `gemini-2.5-flash`.
    pub model: String,
    /// API base, overridable for tests.
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout,
        }
    }
}

/// Summarization engine backed by the Gemini REST API.
pub struct GeminiEngine {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiEngine {
    pub fn new(config: GeminiConfig) -> std::result::Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }
}

#[async_trait]
impl Summarizer for GeminiEngine {
    async fn summarize(&self, request: SummaryRequest) -> std::result::Result<String, EngineError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.transcript,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 1024,
            },
        };

        debug!(tier = %request.tier, model = %self.config.model, "Requesting summary");

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(self.config.timeout)
                } else {
                    EngineError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if let Some(err) = payload.error {
            return Err(EngineError::Flagged(format!(
                "{} ({})",
                err.message, err.status
            )));
        }
        if !status.is_success() {
            return Err(EngineError::Transport(format!("HTTP {}", status)));
        }
        if let Some(feedback) = &payload.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Err(EngineError::Flagged(format!("prompt blocked: {}", reason)));
            }
        }

        let text = payload
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim().to_string();

        if text.len() < MIN_SUMMARY_CHARS {
            return Err(EngineError::Empty);
        }

        Ok(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_model() {
        let engine = GeminiEngine::new(GeminiConfig::new(
            "key",
            "gemini-2.5-flash",
            Duration::from_secs(30),
        ))
        .unwrap();

        assert_eq!(
            engine.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_response_parsing_error_payload() {
        let payload: GenerateResponse = serde_json::from_str(
            r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#,
        )
        .unwrap();

        let err = payload.error.unwrap();
        assert_eq!(err.status, "INVALID_ARGUMENT");
        assert!(payload.candidates.is_empty());
    }

    #[test]
    fn test_response_parsing_candidates() {
        let payload: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "A quiet evening in chat."}]}}]}"#,
        )
        .unwrap();

        assert_eq!(payload.candidates.len(), 1);
        assert_eq!(
            payload.candidates[0].content.parts[0].text,
            "A quiet evening in chat."
        );
    }
}
