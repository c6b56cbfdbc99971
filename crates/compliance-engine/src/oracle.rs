//! Reasoning oracle seam and its HTTP implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::request::DeliberationRequest;

/// External model that turns a deliberation request into a JSON judgment
///
/// Trusted for content, not for structure: whatever it returns is validated
/// before it becomes a verdict.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    fn model_id(&self) -> &str;

    /// Return the raw JSON document produced for `request`
    async fn structured_judge(&self, request: &DeliberationRequest) -> Result<String, OracleError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client in JSON mode
pub struct HttpReasoningOracle {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    seed: Option<u64>,
}

impl HttpReasoningOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        // Slightly above the orchestrator's own timeout so that one fires first
        let client = reqwest::Client::builder()
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| OracleError::Transient(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            seed: config.seed,
        })
    }
}

#[async_trait]
impl ReasoningOracle for HttpReasoningOracle {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn structured_judge(&self, request: &DeliberationRequest) -> Result<String, OracleError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt(),
                },
            ],
            temperature: self.temperature,
            seed: self.seed,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut call = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call
            .send()
            .await
            .map_err(|e| OracleError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("chat response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OracleError::Malformed("no message content".to_string()))?;

        extract_json_object(&content)
            .map(str::to_string)
            .ok_or_else(|| OracleError::Malformed(truncate(&content, 200)))
    }
}

pub(crate) fn classify_status(status: StatusCode, detail: &str) -> OracleError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(detail.trim(), 500));
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        OracleError::Transient(message)
    } else {
        OracleError::Rejected(message)
    }
}

/// The JSON object in a message, tolerating a surrounding markdown fence
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            OracleError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            OracleError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            OracleError::Rejected(_)
        ));
    }

    #[test]
    fn test_json_extraction() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
        assert_eq!(
            extract_json_object("```json\n{\"a\":1}\n```"),
            Some("{\"a\":1}")
        );
        assert_eq!(extract_json_object("I cannot answer that."), None);
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "gpt-4o",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0.0,
            seed: None,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][1]["role"], "user");
        assert!(value.get("seed").is_none());
    }
}
