//! LLM client for OpenAI-compatible chat completion endpoints.
//!
//! Works against OpenAI itself, aggregators (OpenRouter, Together, Groq) and
//! on-prem servers (vLLM, Ollama, llama.cpp) that expose `/chat/completions`.
//!
//! Epistemic foundation:
//! - K_i: Every supported endpoint speaks the chat completions schema
//! - B_i: Endpoint honors `response_format` (might not, so it can be disabled)
//! - B_i: Response body is valid JSON (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::client::{
    CompletionRequest, CompletionResponse, CompletionService, Message, ResponseFormat, Usage,
};
use crate::models::{DynaschemaError, Result, ServiceConfig, ServiceError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a ResponseFormat>,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP implementation of `CompletionService`.
///
/// Features:
/// - Bearer authentication (optional for local endpoints)
/// - Per-request timeout
/// - Transport retries with exponential backoff for network errors, 429s and 5xx
/// - `response_format` forwarding for structured outputs
pub struct LLMClient {
    client: reqwest::Client,
    /// API key (None for local endpoints without auth)
    api_key: Option<String>,
    /// Base URL for the API
    base_url: String,
    /// Request timeout
    timeout: Duration,
    /// Extra attempts for retryable transport failures
    transport_retries: u32,
    /// Whether to forward `response_format` to the endpoint
    structured_outputs: bool,
}

impl LLMClient {
    /// Create a new LLM client.
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
        transport_retries: u32,
        structured_outputs: bool,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServiceError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            transport_retries,
            structured_outputs,
        })
    }

    /// Create a client from the `[service]` section and a resolved API key.
    pub fn from_config(config: &ServiceConfig, api_key: Option<String>) -> Result<Self> {
        Self::new(
            api_key,
            config.base_url.clone(),
            config.timeout_secs,
            config.transport_retries,
            config.structured_outputs,
        )
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build headers for a request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                DynaschemaError::InvalidInput("API key is not a valid header value".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send one HTTP request and classify the outcome.
    async fn send_once(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &ChatCompletionRequest<'_>,
    ) -> std::result::Result<ChatCompletionResponse, ServiceError> {
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.timeout)
                } else {
                    ServiceError::Network(e)
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(1.0);
            return Err(ServiceError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .map(|e| e.error.message)
                .unwrap_or(error_body);
            return Err(match status {
                401 => ServiceError::AuthenticationFailed,
                404 => ServiceError::ModelNotFound(body.model.to_string()),
                _ => ServiceError::Api { status, message },
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl CompletionService for LLMClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let start = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: request
                .response_format
                .as_ref()
                .filter(|_| self.structured_outputs),
        };

        let mut attempt = 0;
        let reply = loop {
            match self.send_once(&url, self.headers()?, &payload).await {
                Ok(reply) => break reply,
                Err(e) if e.is_retryable() && attempt < self.transport_retries => {
                    let backoff = e
                        .retry_after()
                        .map(Duration::from_secs_f64)
                        .unwrap_or_else(|| Duration::from_secs(2u64.pow(attempt)));
                    debug!(
                        model = %request.model,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying after transport error"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| ServiceError::InvalidResponse("No choices in response".to_string()))?;

        let usage = reply
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            model: reply.model.unwrap_or(request.model),
            usage,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_payload_shape() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let format = ResponseFormat::json_schema("PersonRecord", json!({"type": "object"}));
        let body = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: None,
            temperature: Some(0.0),
            response_format: Some(&format),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["temperature"], 0.0);
        assert!(value.get("max_tokens").is_none());
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "PersonRecord");
    }

    #[test]
    fn test_response_parsing_tolerates_missing_usage() {
        let raw = r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.usage.is_none());
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{}"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LLMClient::new(None, "http://localhost:11434/v1/", 30, 0, true).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434/v1");
    }
}
