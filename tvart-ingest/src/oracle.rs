//! External mat color suggestion service
//!
//! The oracle is best effort. A client makes exactly one request per call;
//! retrying malformed replies is up to the caller (see the color engine).

use crate::models::MatColor;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Instruction sent with every preview
pub const MAT_PROMPT: &str = "You are a museum framer choosing a mat for a painting shown on a \
self-illuminated television. The mat must look darker and less saturated than the artwork so it \
never competes with it. Look at the image and pick one mat color. Reply with JSON only, in the \
form {\"mat_color\": {\"RGB\": [r, g, b], \"RGB_HEX\": \"#RRGGBB\", \"LAB\": [l, a, b]}, \
\"reason\": \"one sentence\"}.";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Malformed oracle reply: {0}")]
    Malformed(String),

    #[error("Oracle reply is missing {0}")]
    MissingKey(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),
}

impl OracleError {
    /// Bad output is worth asking again; transport or API failures are not
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::Malformed(_) | OracleError::MissingKey(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleSuggestion {
    pub color: MatColor,
    pub reason: String,
}

#[async_trait]
pub trait ColorOracle: Send + Sync {
    /// Suggest a mat color for a PNG preview
    async fn suggest(&self, preview_png: &[u8]) -> Result<OracleSuggestion, OracleError>;
}

/// Parse the strict reply contract `{mat_color: {RGB_HEX}, reason}`
pub fn parse_reply(text: &str) -> Result<OracleSuggestion, OracleError> {
    let value: serde_json::Value =
        serde_json::from_str(text.trim()).map_err(|e| OracleError::Malformed(e.to_string()))?;

    let hex = value
        .get("mat_color")
        .ok_or(OracleError::MissingKey("mat_color"))?
        .get("RGB_HEX")
        .and_then(|v| v.as_str())
        .ok_or(OracleError::MissingKey("mat_color.RGB_HEX"))?;
    let reason = value
        .get("reason")
        .and_then(|v| v.as_str())
        .ok_or(OracleError::MissingKey("reason"))?;

    let color: MatColor = hex
        .parse()
        .map_err(|e: crate::models::mat_color::ParseColorError| {
            OracleError::Malformed(e.to_string())
        })?;

    Ok(OracleSuggestion {
        color,
        reason: reason.trim().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions backed oracle
pub struct OpenAiColorOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiColorOracle {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
            endpoint: CHAT_COMPLETIONS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, preview_png: &[u8]) -> serde_json::Value {
        let encoded = base64::engine::general_purpose::STANDARD.encode(preview_png);
        json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": "You answer with a single JSON object."},
                {
                    "role": "user",
                    "content": [
                        {"type": "text", "text": MAT_PROMPT},
                        {
                            "type": "image_url",
                            "image_url": {"url": format!("data:image/png;base64,{}", encoded)}
                        }
                    ]
                }
            ]
        })
    }
}

#[async_trait]
impl ColorOracle for OpenAiColorOracle {
    async fn suggest(&self, preview_png: &[u8]) -> Result<OracleSuggestion, OracleError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(60))
            .json(&self.request_body(preview_png))
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(OracleError::MissingKey("choices[0].message.content"))?;

        parse_reply(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_ok() {
        let reply = r##"{"mat_color": {"RGB": [40, 35, 30], "RGB_HEX": "#28231E", "LAB": [14, 1, 4]},
                        "reason": "Warm umber echoes the shadows."}"##;
        let suggestion = parse_reply(reply).unwrap();
        assert_eq!(suggestion.color, MatColor::from_rgb(0x28, 0x23, 0x1e));
        assert_eq!(suggestion.reason, "Warm umber echoes the shadows.");
    }

    #[test]
    fn test_parse_reply_errors_are_retryable() {
        for bad in [
            "not json",
            r#"{"reason": "x"}"#,
            r#"{"mat_color": {"RGB": [1,2,3]}, "reason": "x"}"#,
            r##"{"mat_color": {"RGB_HEX": "#12345"}, "reason": "x"}"##,
            r##"{"mat_color": {"RGB_HEX": "#123456"}}"##,
        ] {
            let err = parse_reply(bad).unwrap_err();
            assert!(err.is_retryable(), "{bad}: {err}");
        }
    }

    #[test]
    fn test_transport_errors_not_retryable() {
        assert!(!OracleError::Network("down".into()).is_retryable());
        assert!(!OracleError::Api(401, "bad key".into()).is_retryable());
    }

    #[test]
    fn test_request_body_embeds_preview() {
        let oracle = OpenAiColorOracle::new(reqwest::Client::new(), "k".into(), "gpt-4o".into());
        let body = oracle.request_body(b"png");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        let url = body["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert_eq!(url, "data:image/png;base64,cG5n");
    }
}
