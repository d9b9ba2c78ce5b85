//! @ai:module:intent Provider invocation contract, credentials and id-based routing
//! @ai:module:layer infrastructure
//! @ai:module:public_api ProviderClient, ProviderRequest, RawResponse, TokenUsage, ApiKey, Credentials, ProviderRouter
//! @ai:module:stateless false

use crate::config::{ProviderKind, ProviderRegistry, ProviderSpec};
use crate::error::{ProviderError, ProviderErrorKind};
use crate::runner::anthropic_client::AnthropicClient;
use crate::runner::mock_client::MockProviderClient;
use crate::runner::openai_client::OpenAiClient;
use crate::runner::rate_limiter::{RateLimiter, RateLimiterTrait};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// @ai:intent Provider-neutral request
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ProviderRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// @ai:intent Normalized response shared by every provider
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub text: String,
    pub token_usage: Option<TokenUsage>,
    pub latency_ms: u64,
}

/// @ai:intent Capability implemented once per provider kind
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// @ai:intent Send one rendered prompt and normalize the reply
    /// @ai:post errors are classified so the runner can decide on retries
    async fn invoke(
        &self,
        spec: &ProviderSpec,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<RawResponse, ProviderError>;
}

/// @ai:intent Secret value whose Debug output is redacted
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(***)")
    }
}

/// @ai:intent Credentials resolved once at startup, keyed by provider id
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<String, ApiKey>,
}

impl Credentials {
    /// @ai:intent Resolve every provider's credential from its named environment variable
    /// @ai:effects env
    pub fn from_env(providers: &ProviderRegistry) -> Self {
        let mut credentials = Self::default();

        for spec in providers.list() {
            let Some(var) = spec.credential_env() else {
                continue;
            };
            match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => credentials.insert(&spec.id, ApiKey::new(value)),
                _ => tracing::warn!(
                    "Provider {} has no credential ({} is not set); its cells will fail with auth_failed",
                    spec.id,
                    var
                ),
            }
        }

        credentials
    }

    pub fn insert(&mut self, provider_id: &str, key: ApiKey) {
        self.keys.insert(provider_id.to_string(), key);
    }

    pub fn get(&self, provider_id: &str) -> Option<&ApiKey> {
        self.keys.get(provider_id)
    }
}

struct Route {
    spec: ProviderSpec,
    client: Arc<dyn ProviderClient>,
    limiter: Option<RateLimiter>,
}

/// @ai:intent Selects a client by explicit provider id and applies rate limit and timeout
#[derive(Default)]
pub struct ProviderRouter {
    routes: HashMap<String, Route>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// @ai:intent Register a client for a provider, replacing any previous one
    /// @ai:effects state:write
    pub fn register(&mut self, spec: ProviderSpec, client: Arc<dyn ProviderClient>) {
        let limiter = spec.rate_limit.as_ref().map(RateLimiter::from_policy);
        self.routes.insert(
            spec.id.clone(),
            Route {
                spec,
                client,
                limiter,
            },
        );
    }

    /// @ai:intent Build one concrete client per provider kind
    /// @ai:effects pure
    pub fn from_specs(providers: &ProviderRegistry, credentials: &Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        let mut router = Self::new();

        for spec in providers.list() {
            let key = credentials.get(&spec.id).cloned();
            let client: Arc<dyn ProviderClient> = match spec.kind {
                ProviderKind::Anthropic => Arc::new(AnthropicClient::new(http.clone(), key)),
                ProviderKind::OpenAi => Arc::new(OpenAiClient::new(http.clone(), key)),
                ProviderKind::Mock => Arc::new(MockProviderClient::new(spec.mock_response.clone())),
            };
            router.register(spec.clone(), client);
        }

        Ok(router)
    }

    /// @ai:intent Route every provider to the echo mock, no network access
    /// @ai:effects pure
    pub fn dry_run(providers: &ProviderRegistry) -> Self {
        let mut router = Self::new();
        for spec in providers.list() {
            router.register(spec.clone(), Arc::new(MockProviderClient::echo()));
        }
        router
    }

    /// @ai:intent Invoke a provider once, bounded by `timeout`
    /// @ai:post rate-limit waiting is not counted against the timeout
    /// @ai:effects network, time
    pub async fn invoke(
        &self,
        provider_id: &str,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<RawResponse, ProviderError> {
        let route = self.routes.get(provider_id).ok_or_else(|| {
            ProviderError::unknown(format!("no client registered for provider {}", provider_id))
        })?;

        if let Some(limiter) = &route.limiter {
            limiter.wait().await;
        }

        match tokio::time::timeout(timeout, route.client.invoke(&route.spec, request, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!(
                "no response from {} within {}ms",
                provider_id,
                timeout.as_millis()
            ))),
        }
    }
}

/// Longest server-requested wait honoured; larger hints are clamped
const MAX_RETRY_AFTER_SECS: f64 = 3600.0;

/// @ai:intent Parse a `retry-after` header given in seconds
/// @ai:post never panics; hints above one hour are clamped to one hour
/// @ai:effects pure
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs.min(MAX_RETRY_AFTER_SECS)).ok())
}

/// @ai:intent Map a non-success HTTP status onto the provider error taxonomy
/// @ai:effects pure
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ProviderError {
    let kind = match status.as_u16() {
        429 | 503 | 529 => ProviderErrorKind::RateLimited,
        401 | 403 => ProviderErrorKind::AuthFailed,
        408 | 504 => ProviderErrorKind::Timeout,
        _ => ProviderErrorKind::Unknown,
    };

    ProviderError::new(kind, format!("HTTP {}: {}", status, truncate(body, 500)))
        .with_retry_after(retry_after)
}

/// @ai:intent Map a transport-level reqwest failure
/// @ai:effects pure
pub fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(err.to_string())
    } else if err.is_decode() {
        ProviderError::malformed(err.to_string())
    } else {
        ProviderError::unknown(err.to_string())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
