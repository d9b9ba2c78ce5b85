//! @ai:module:intent Matrix execution, provider clients and retry handling
//! @ai:module:layer infrastructure
//! @ai:module:public_api Runner, RunHandle, ProviderRouter, ProviderClient, RetryPolicy, RateLimiter

pub mod anthropic_client;
pub mod cell;
pub mod client;
pub mod executor;
pub mod mock_client;
pub mod openai_client;
pub mod rate_limiter;
pub mod retry;

pub use anthropic_client::AnthropicClient;
pub use cell::{
    CellFailure, CellKey, CellState, CellStatus, CellTracker, FailureKind, InvocationResult,
    ScoredResult,
};
pub use client::{
    ApiKey, Credentials, ProviderClient, ProviderRequest, ProviderRouter, RawResponse, TokenUsage,
};
pub use executor::{extract_output_field, RunHandle, RunOutcome, RunPlan, RunSettings, Runner};
pub use mock_client::MockProviderClient;
pub use openai_client::OpenAiClient;
pub use rate_limiter::{RateLimiter, RateLimiterTrait};
pub use retry::{run_with_retry, RetryFailure, RetryOutcome, RetryPolicy};
