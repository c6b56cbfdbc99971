//! Embedding capability
//!
//! The pipeline never computes embeddings itself; it asks an external
//! service through [`EmbeddingProvider`]. [`HttpEmbeddingProvider`] talks to
//! any OpenAI-compatible `/embeddings` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

/// Text in, fixed-dimension vector out
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Version identifier of the embedding model.
    ///
    /// Vectors produced under different identifiers must never be compared.
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))
            .and_then(validate_vector)
    }
}

/// Map a non-success HTTP status onto the error taxonomy
pub(crate) fn classify_status(status: StatusCode, detail: &str) -> EmbeddingError {
    let message = format!("HTTP {}: {}", status.as_u16(), detail.trim());
    if status == StatusCode::TOO_MANY_REQUESTS {
        EmbeddingError::RateLimited(message)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        EmbeddingError::Unavailable(message)
    } else {
        EmbeddingError::Rejected(message)
    }
}

fn validate_vector(datum: EmbeddingDatum) -> Result<Vec<f32>, EmbeddingError> {
    if datum.embedding.is_empty() {
        return Err(EmbeddingError::InvalidResponse("empty embedding".to_string()));
    }
    if datum.embedding.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::InvalidResponse(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(datum.embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            EmbeddingError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            EmbeddingError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "input too long"),
            EmbeddingError::Rejected(_)
        ));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,-0.2,0.3]}],"model":"text-embedding-3-small"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        let vector = validate_vector(parsed.data.into_iter().next().unwrap()).unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[test]
    fn test_empty_vector_is_invalid() {
        let err = validate_vector(EmbeddingDatum { embedding: vec![] }).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[test]
    fn test_url_built_from_endpoint() {
        let config = EmbeddingConfig {
            endpoint: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        };
        let provider = HttpEmbeddingProvider::new(&config).unwrap();
        assert_eq!(provider.url, "http://localhost:8080/v1/embeddings");
        assert_eq!(provider.model_id(), "text-embedding-3-small");
    }
}
