//! @ai:module:intent In-process provider used for dry runs and offline configs
//! @ai:module:layer infrastructure
//! @ai:module:public_api MockProviderClient

use crate::config::ProviderSpec;
use crate::error::ProviderError;
use crate::runner::client::{ProviderClient, ProviderRequest, RawResponse, TokenUsage};
use async_trait::async_trait;
use std::time::Duration;

/// @ai:intent Returns a fixed reply, or echoes the prompt when none is configured
pub struct MockProviderClient {
    response: Option<String>,
}

impl MockProviderClient {
    pub fn new(response: Option<String>) -> Self {
        Self { response }
    }

    pub fn echo() -> Self {
        Self { response: None }
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    /// @ai:effects pure
    async fn invoke(
        &self,
        _spec: &ProviderSpec,
        request: &ProviderRequest,
        _timeout: Duration,
    ) -> Result<RawResponse, ProviderError> {
        let text = self
            .response
            .clone()
            .unwrap_or_else(|| request.prompt.clone());

        Ok(RawResponse {
            token_usage: Some(TokenUsage {
                input_tokens: request.prompt.split_whitespace().count() as u32,
                output_tokens: text.split_whitespace().count() as u32,
            }),
            text,
            latency_ms: 0,
        })
    }
}
