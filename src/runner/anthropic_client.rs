//! @ai:module:intent Anthropic messages API client
//! @ai:module:layer infrastructure
//! @ai:module:public_api AnthropicClient
//! @ai:module:stateless true

use crate::config::ProviderSpec;
use crate::error::ProviderError;
use crate::runner::client::{
    classify_status, classify_transport, parse_retry_after, ApiKey, ProviderClient,
    ProviderRequest, RawResponse, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// @ai:intent Calls the Anthropic messages endpoint
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<ApiKey>,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, api_key: Option<ApiKey>) -> Self {
        Self { http, api_key }
    }

    /// @ai:intent Join text blocks of a decoded response
    /// @ai:effects pure
    fn normalize(body: &str, latency_ms: u64) -> Result<RawResponse, ProviderError> {
        let api_response: ApiResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::malformed(format!("Failed to parse Anthropic response: {}", e)))?;

        let text = api_response
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(RawResponse {
            text,
            token_usage: api_response.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            latency_ms,
        })
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    /// @ai:intent Send a message to Claude and normalize the reply
    /// @ai:effects network
    async fn invoke(
        &self,
        spec: &ProviderSpec,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<RawResponse, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::auth_failed(format!("no credential configured for provider {}", spec.id))
        })?;

        let body = ApiRequest {
            model: &spec.model,
            max_tokens: request
                .max_tokens
                .or(spec.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature.or(spec.temperature),
            system: request.system.as_deref(),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let start = Instant::now();
        let response = self
            .http
            .post(spec.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT))
            .header("x-api-key", api_key.expose())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.map_err(|e| classify_transport(&e))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(classify_status(status, retry_after, &text));
        }

        Self::normalize(&text, latency_ms)
    }
}
