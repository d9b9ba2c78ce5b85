//! @ai:module:intent Matrix cell identity, lifecycle state machine and per-cell results
//! @ai:module:layer domain
//! @ai:module:public_api CellKey, CellState, CellTracker, CellStatus, FailureKind, CellFailure, InvocationResult, ScoredResult
//! @ai:module:stateless false

use crate::error::{ProviderError, ProviderErrorKind};
use crate::evaluator::Verdict;
use crate::runner::client::TokenUsage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// @ai:intent One (variant, provider, case) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub variant: String,
    pub provider: String,
    pub case: String,
}

impl CellKey {
    pub fn new(variant: &str, provider: &str, case: &str) -> Self {
        Self {
            variant: variant.to_string(),
            provider: provider.to_string(),
            case: case.to_string(),
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.variant, self.provider, self.case)
    }
}

/// @ai:intent Lifecycle of a matrix cell
/// @ai:example Pending -> Dispatched -> Retrying -> Dispatched -> Succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Pending,
    Dispatched,
    Retrying,
    Succeeded,
    Failed,
}

impl CellState {
    /// @ai:intent Check whether `next` is a legal successor of this state
    /// @ai:effects pure
    pub fn can_transition_to(self, next: CellState) -> bool {
        use CellState::*;
        matches!(
            (self, next),
            (Pending, Dispatched)
                | (Dispatched, Succeeded)
                | (Dispatched, Retrying)
                | (Dispatched, Failed)
                | (Retrying, Dispatched)
                | (Retrying, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CellState::Succeeded | CellState::Failed)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cell {key}: illegal transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub key: CellKey,
    pub from: CellState,
    pub to: CellState,
}

/// @ai:intent Tracks the state of one cell while a worker owns it
#[derive(Debug, Clone)]
pub struct CellTracker {
    key: CellKey,
    state: CellState,
    history: Vec<CellState>,
}

impl CellTracker {
    pub fn new(key: CellKey) -> Self {
        Self {
            key,
            state: CellState::Pending,
            history: vec![CellState::Pending],
        }
    }

    /// @ai:intent Move to the next state, rejecting illegal transitions
    /// @ai:effects state:write
    pub fn advance(&mut self, next: CellState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                key: self.key.clone(),
                from: self.state,
                to: next,
            });
        }

        tracing::trace!("Cell {}: {:?} -> {:?}", self.key, self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn history(&self) -> &[CellState] {
        &self.history
    }
}

/// @ai:intent Terminal status of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Succeeded,
    Failed,
}

/// @ai:intent Why a cell failed; provider kinds plus harness-side causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    AuthFailed,
    Timeout,
    Malformed,
    Unknown,
    /// Template referenced an input the case does not provide
    Template,
    /// Cancellation arrived while the cell was waiting to retry
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::AuthFailed => "auth_failed",
            FailureKind::Timeout => "timeout",
            FailureKind::Malformed => "malformed",
            FailureKind::Unknown => "unknown",
            FailureKind::Template => "template",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::RateLimited => FailureKind::RateLimited,
            ProviderErrorKind::AuthFailed => FailureKind::AuthFailed,
            ProviderErrorKind::Timeout => FailureKind::Timeout,
            ProviderErrorKind::Malformed => FailureKind::Malformed,
            ProviderErrorKind::Unknown => FailureKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProviderError> for CellFailure {
    fn from(err: &ProviderError) -> Self {
        Self {
            kind: err.kind.into(),
            message: err.message.clone(),
        }
    }
}

/// @ai:intent Raw outcome of invoking one cell (final attempt when retried)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub key: CellKey,
    pub output: String,
    pub latency_ms: u64,
    pub token_usage: Option<TokenUsage>,
    pub attempts: u32,
    pub status: CellStatus,
    pub error: Option<CellFailure>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.status == CellStatus::Succeeded
    }
}

/// @ai:intent Invocation result plus the scorer's verdict; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredResult {
    pub key: CellKey,
    pub status: CellStatus,
    /// Absent when the invocation itself failed
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub output: String,
    pub attempts: u32,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CellFailure>,
}

impl ScoredResult {
    /// @ai:intent Combine an invocation with its verdict
    /// @ai:effects pure
    pub fn new(
        invocation: InvocationResult,
        verdict: Option<Verdict>,
        rationale: Option<String>,
    ) -> Self {
        Self {
            key: invocation.key,
            status: invocation.status,
            verdict,
            rationale,
            output: invocation.output,
            attempts: invocation.attempts,
            latency_ms: invocation.latency_ms,
            token_usage: invocation.token_usage,
            error: invocation.error,
        }
    }
}
