//! Gemini-backed proposition extraction
//!
//! Calls the generateContent endpoint, asking the model to answer with a
//! JSON array of strings. The reply is parsed defensively: models wrap
//! JSON in code fences often enough that we strip them before parsing.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use quiver_core::{ExtractorConfig, QuiverError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const EXTRACTION_PROMPT: &str = "Decompose the following text into simple, self-contained \
propositions. Each proposition must be a single short factual statement that stands on its \
own, with pronouns resolved to the entities they refer to. Respond with a JSON array of \
strings and nothing else.\n\nText:\n";

/// Gemini API proposition extractor
pub struct GeminiExtractor {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiExtractor {
    /// Create a new Gemini extractor
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| QuiverError::Extraction(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Create from config
    pub fn from_config(config: &ExtractorConfig) -> Result<Self> {
        let api_key = config
            .google_api_key
            .as_ref()
            .ok_or_else(|| QuiverError::Config("GOOGLE_API_KEY required for gemini".to_string()))?;

        Self::new(api_key.clone(), config.gemini_model.clone(), config.timeout_secs)
    }

    /// Set a custom base URL (for compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl super::PropositionExtractor for GeminiExtractor {
    async fn extract(&self, paragraph: &str) -> Result<Vec<String>> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!("{EXTRACTION_PROMPT}{paragraph}"),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QuiverError::Timeout("proposition extraction".to_string())
                } else {
                    QuiverError::Extraction(format!("Gemini request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => QuiverError::Authentication(format!("Gemini: {body}")),
                _ => QuiverError::Extraction(format!("Gemini error: HTTP {status}: {body}")),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| QuiverError::Extraction(format!("failed to read Gemini body: {e}")))?;

        let result: GenerateResponse =
            serde_json::from_str(&body).map_err(|_| QuiverError::MalformedResponse {
                context: "gemini generateContent".to_string(),
                payload: body,
            })?;

        let text = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| QuiverError::Extraction("no candidates returned".to_string()))?;

        parse_proposition_list(&text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Parse the model's reply as a JSON array of statements.
fn parse_proposition_list(text: &str) -> Result<Vec<String>> {
    let stripped = strip_code_fence(text);

    let sentences: Vec<String> =
        serde_json::from_str(stripped).map_err(|_| QuiverError::MalformedResponse {
            context: "gemini proposition list".to_string(),
            payload: text.to_string(),
        })?;

    Ok(sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) up to the first newline.
    let inner = inner.split_once('\n').map_or("", |(_, rest)| rest);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json_array() {
        let props = parse_proposition_list(r#"["The sky is blue.", "Water boils at 100C."]"#)
            .unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props[0], "The sky is blue.");
    }

    #[test]
    fn test_parse_fenced_json_array() {
        let reply = "```json\n[\"The sky is blue.\"]\n```";
        let props = parse_proposition_list(reply).unwrap();
        assert_eq!(props, vec!["The sky is blue."]);
    }

    #[test]
    fn test_parse_trims_and_drops_empty_entries() {
        let props = parse_proposition_list(r#"["  padded  ", "", "kept"]"#).unwrap();
        assert_eq!(props, vec!["padded", "kept"]);
    }

    #[test]
    fn test_non_json_reply_is_malformed_response_with_payload() {
        let err = parse_proposition_list("Sure! Here are the propositions:").unwrap_err();
        match err {
            QuiverError::MalformedResponse { payload, .. } => {
                assert!(payload.contains("Sure!"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "prompt".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: 0.0,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "[\"a\"]"}], "role": "model"}}
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        let text = parsed.candidates[0]
            .content
            .as_ref()
            .map(|c| c.parts[0].text.clone())
            .unwrap();
        assert_eq!(text, r#"["a"]"#);
    }
}
