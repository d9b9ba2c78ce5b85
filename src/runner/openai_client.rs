//! @ai:module:intent OpenAI chat completions client
//! @ai:module:layer infrastructure
//! @ai:module:public_api OpenAiClient
//! @ai:module:stateless true

use crate::config::ProviderSpec;
use crate::error::ProviderError;
use crate::runner::client::{
    classify_status, classify_transport, parse_retry_after, ApiKey, ProviderClient,
    ProviderRequest, RawResponse, TokenUsage,
};
use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, Instant};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// @ai:intent Calls an OpenAI-compatible chat completions endpoint
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<ApiKey>,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, api_key: Option<ApiKey>) -> Self {
        Self { http, api_key }
    }

    /// @ai:intent Build the request body; system prompt becomes a leading system message
    /// @ai:effects pure
    fn build_body(spec: &ProviderSpec, request: &ProviderRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": spec.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens.or(spec.max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature.or(spec.temperature) {
            body["temperature"] = json!(temperature);
        }
        body
    }

    fn normalize(body: &str, latency_ms: u64) -> Result<RawResponse, ProviderError> {
        let json: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ProviderError::malformed(format!("Failed to parse OpenAI response: {}", e)))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::malformed("OpenAI response has no choices[0].message.content"))?
            .to_string();

        let usage = &json["usage"];
        let token_usage = match (usage["prompt_tokens"].as_u64(), usage["completion_tokens"].as_u64()) {
            (Some(input), Some(output)) => Some(TokenUsage {
                input_tokens: input as u32,
                output_tokens: output as u32,
            }),
            _ => None,
        };

        Ok(RawResponse {
            text,
            token_usage,
            latency_ms,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
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

        let start = Instant::now();
        let response = self
            .http
            .post(spec.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT))
            .bearer_auth(api_key.expose())
            .timeout(timeout)
            .json(&Self::build_body(spec, request))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::error::ProviderErrorKind;

    fn spec() -> ProviderSpec {
        let mut spec = ProviderSpec::echo("mini");
        spec.kind = ProviderKind::OpenAi;
        spec.model = "gpt-4o-mini".to_string();
        spec.temperature = Some(0.0);
        spec
    }

    #[test]
    fn test_build_body_with_system_prompt() {
        let request = ProviderRequest::new("What is 2+2?").with_system(Some("Be terse".to_string()));
        let body = OpenAiClient::build_body(&spec(), &request);

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is 2+2?");
        assert_eq!(body["temperature"], 0.0);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_normalize_chat_completion() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "4"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10}
        }"#;
        let response = OpenAiClient::normalize(body, 7).unwrap();
        assert_eq!(response.text, "4");
        assert_eq!(response.token_usage.unwrap().input_tokens, 9);
    }

    #[test]
    fn test_normalize_missing_content_is_malformed() {
        let err = OpenAiClient::normalize(r#"{"choices": []}"#, 1).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Malformed);
    }
}
