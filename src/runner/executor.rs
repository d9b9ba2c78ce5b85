//! @ai:module:intent Execute the variant x provider x case matrix on a bounded worker pool
//! @ai:module:layer application
//! @ai:module:public_api Runner, RunHandle, RunPlan, RunSettings, RunOutcome
//! @ai:module:stateless false

use crate::config::{ProviderRegistry, ProviderSpec};
use crate::corpus::case::value_to_text;
use crate::corpus::{CaseStore, PromptVariant, TestCase, VariantRegistry};
use crate::evaluator::{Scorer, ScoringStrategy};
use crate::runner::cell::{
    CellFailure, CellKey, CellState, CellStatus, CellTracker, FailureKind, InvocationResult,
    ScoredResult,
};
use crate::runner::client::{ProviderRequest, ProviderRouter};
use crate::runner::retry::{run_with_retry, RetryFailure, RetryPolicy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// @ai:intent Immutable inputs of a run, shared by every worker
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub variants: VariantRegistry,
    pub providers: ProviderRegistry,
    pub cases: CaseStore,
    /// Strategies applied to cases that declare none
    pub default_scoring: Vec<ScoringStrategy>,
}

impl RunPlan {
    /// @ai:intent Providers that take part in the matrix; judge-only providers are excluded
    /// @ai:effects pure
    pub fn matrix_providers(&self) -> Vec<&ProviderSpec> {
        self.providers.list().iter().filter(|p| !p.judge_only).collect()
    }

    pub fn cell_count(&self) -> usize {
        self.variants.len() * self.matrix_providers().len() * self.cases.len()
    }

    /// @ai:intent Every cell of the matrix, variant-major
    /// @ai:post one entry per (variant, provider, case), no duplicates
    /// @ai:effects pure
    fn cells(&self) -> VecDeque<CellRef> {
        let providers: Vec<usize> = self
            .providers
            .list()
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.judge_only)
            .map(|(i, _)| i)
            .collect();

        let mut cells = VecDeque::with_capacity(self.cell_count());
        for variant in 0..self.variants.len() {
            for &provider in &providers {
                for case in 0..self.cases.len() {
                    cells.push_back(CellRef {
                        variant,
                        provider,
                        case,
                    });
                }
            }
        }
        cells
    }
}

/// Positions into the plan's registries
#[derive(Debug, Clone, Copy)]
struct CellRef {
    variant: usize,
    provider: usize,
    case: usize,
}

/// @ai:intent Execution knobs, derived from the config or overridden on the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub concurrency_limit: usize,
    pub retry_policy: RetryPolicy,
    /// Per-invocation timeout
    pub timeout: Duration,
}

/// @ai:intent Final counts reported once the pool has drained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub total: usize,
    pub dispatched: usize,
    pub undispatched: usize,
    pub cancelled: bool,
}

/// @ai:intent Owns the router and scorer and starts runs
pub struct Runner {
    router: Arc<ProviderRouter>,
    scorer: Arc<Scorer>,
}

impl Runner {
    pub fn new(router: Arc<ProviderRouter>, scorer: Arc<Scorer>) -> Self {
        Self { router, scorer }
    }

    /// @ai:intent Start a run and return a handle streaming its results
    /// @ai:pre called inside a tokio runtime; settings.concurrency_limit > 0
    /// @ai:post each cell is emitted at most once; undispatched cells are never emitted
    /// @ai:effects spawns workers, network
    pub fn run(&self, plan: Arc<RunPlan>, settings: RunSettings, cancel: CancellationToken) -> RunHandle {
        let cells = plan.cells();
        let total = cells.len();
        let workers = settings.concurrency_limit.max(1).min(total.max(1));

        tracing::info!(
            "Running {} cells ({} variants x {} providers x {} cases) with {} workers",
            total,
            plan.variants.len(),
            plan.matrix_providers().len(),
            plan.cases.len(),
            workers
        );

        let queue = Arc::new(Mutex::new(cells));
        let dispatched = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel(workers * 2);
        let mut pool = JoinSet::new();

        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                plan: Arc::clone(&plan),
                settings,
                router: Arc::clone(&self.router),
                scorer: Arc::clone(&self.scorer),
                queue: Arc::clone(&queue),
                dispatched: Arc::clone(&dispatched),
                cancel: cancel.clone(),
            };
            pool.spawn(worker.run(tx.clone()));
        }
        drop(tx);

        RunHandle {
            results: rx,
            pool,
            dispatched,
            total,
            cancel,
        }
    }
}

/// @ai:intent Lazy, finite, non-restartable stream of scored results
pub struct RunHandle {
    results: mpsc::Receiver<ScoredResult>,
    pool: JoinSet<()>,
    dispatched: Arc<AtomicUsize>,
    total: usize,
    cancel: CancellationToken,
}

impl RunHandle {
    /// @ai:intent Next completed cell, in completion order; None once every worker has stopped
    /// @ai:effects io
    pub async fn next(&mut self) -> Option<ScoredResult> {
        self.results.recv().await
    }

    /// @ai:intent Drain every remaining result
    /// @ai:effects io
    pub async fn collect_all(&mut self) -> Vec<ScoredResult> {
        let mut results = Vec::with_capacity(self.total);
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// @ai:intent Stop accepting results, wait for workers and report counts
    /// @ai:pre results should be drained first; anything still buffered is discarded
    /// @ai:effects io
    pub async fn finish(mut self) -> RunOutcome {
        self.results.close();
        while self.results.recv().await.is_some() {}

        while let Some(joined) = self.pool.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        let dispatched = self.dispatched.load(Ordering::SeqCst);
        RunOutcome {
            total: self.total,
            dispatched,
            undispatched: self.total.saturating_sub(dispatched),
            cancelled: self.cancel.is_cancelled(),
        }
    }
}

struct Worker {
    id: usize,
    plan: Arc<RunPlan>,
    settings: RunSettings,
    router: Arc<ProviderRouter>,
    scorer: Arc<Scorer>,
    queue: Arc<Mutex<VecDeque<CellRef>>>,
    dispatched: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl Worker {
    /// @ai:intent Pull cells until the queue is empty, the run is cancelled or the consumer is gone
    /// @ai:effects network, io
    async fn run(self, tx: mpsc::Sender<ScoredResult>) {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!("Worker {} stopping: run cancelled", self.id);
                break;
            }

            let next = self
                .queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .pop_front();
            let Some(cell) = next else {
                break;
            };
            self.dispatched.fetch_add(1, Ordering::SeqCst);

            let result = self.process(cell).await;
            if tx.send(result).await.is_err() {
                tracing::debug!("Worker {} stopping: result consumer dropped", self.id);
                break;
            }
        }
    }

    /// @ai:intent Render, invoke with retries, then score one cell
    /// @ai:post never fails; every failure is recorded in the result
    /// @ai:effects network
    async fn process(&self, cell: CellRef) -> ScoredResult {
        let variant = &self.plan.variants.list()[cell.variant];
        let provider = &self.plan.providers.list()[cell.provider];
        let case = &self.plan.cases.list()[cell.case];
        let key = CellKey::new(&variant.id, &provider.id, &case.id);

        let mut tracker = CellTracker::new(key.clone());
        step(&mut tracker, CellState::Dispatched);
        let started = Instant::now();

        let prompt = match variant.render(case) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!("Cell {} not sent: {}", key, e);
                step(&mut tracker, CellState::Failed);
                let failure = CellFailure {
                    kind: FailureKind::Template,
                    message: e.to_string(),
                };
                return ScoredResult::new(failed(key, failure, 0, started), None, None);
            }
        };

        let request = ProviderRequest::new(prompt).with_system(variant.system.clone());
        let router = &self.router;
        let timeout = self.settings.timeout;

        let outcome = run_with_retry(
            &self.settings.retry_policy,
            &self.cancel,
            |state| step(&mut tracker, state),
            |attempt| {
                tracing::debug!("Cell {} attempt {}", key, attempt);
                router.invoke(&provider.id, &request, timeout)
            },
        )
        .await;

        let invocation = match outcome.result {
            Ok(response) => {
                step(&mut tracker, CellState::Succeeded);
                InvocationResult {
                    key,
                    output: extract_output_field(&response.text, variant.output_field.as_deref()),
                    latency_ms: response.latency_ms,
                    token_usage: response.token_usage,
                    attempts: outcome.attempts,
                    status: CellStatus::Succeeded,
                    error: None,
                }
            }
            Err(RetryFailure::Failed(e)) => {
                tracing::warn!("Cell {} failed after {} attempt(s): {}", key, outcome.attempts, e);
                step(&mut tracker, CellState::Failed);
                return ScoredResult::new(failed(key, CellFailure::from(&e), outcome.attempts, started), None, None);
            }
            Err(RetryFailure::Cancelled(e)) => {
                tracing::info!("Cell {} cancelled while waiting to retry", key);
                step(&mut tracker, CellState::Failed);
                let failure = CellFailure {
                    kind: FailureKind::Cancelled,
                    message: format!("run cancelled during backoff after {}", e),
                };
                return ScoredResult::new(failed(key, failure, outcome.attempts, started), None, None);
            }
        };

        self.score(case, variant, invocation).await
    }

    async fn score(&self, case: &TestCase, variant: &PromptVariant, invocation: InvocationResult) -> ScoredResult {
        let assessment = self.scorer.score(case, &invocation).await;
        tracing::debug!(
            "Cell {} ({} origin) scored {:?}",
            invocation.key,
            variant.origin,
            assessment.verdict
        );
        ScoredResult::new(invocation, Some(assessment.verdict), assessment.rationale)
    }
}

fn step(tracker: &mut CellTracker, next: CellState) {
    if let Err(e) = tracker.advance(next) {
        tracing::error!("{}", e);
    }
}

fn failed(key: CellKey, failure: CellFailure, attempts: u32, started: Instant) -> InvocationResult {
    InvocationResult {
        key,
        output: String::new(),
        latency_ms: started.elapsed().as_millis() as u64,
        token_usage: None,
        attempts,
        status: CellStatus::Failed,
        error: Some(failure),
    }
}

/// @ai:intent Pull `field` out of a JSON object reply, falling back to the raw text
/// @ai:effects pure
pub fn extract_output_field(text: &str, field: Option<&str>) -> String {
    let Some(field) = field else {
        return text.to_string();
    };

    let trimmed = text.trim();
    let object = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    };

    match serde_json::from_str::<serde_json::Value>(object) {
        Ok(value) => match value.get(field) {
            Some(extracted) => value_to_text(extracted),
            None => {
                tracing::debug!("Response has no `{}` field, scoring raw text", field);
                text.to_string()
            }
        },
        Err(_) => text.to_string(),
    }
}
