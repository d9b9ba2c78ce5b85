//! @ai:module:intent Prompt-variant evaluation harness library
//! @ai:module:layer application
//! @ai:module:public_api config, corpus, error, evaluator, metrics, report, runner

pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod report;
pub mod runner;

pub use config::EvalConfig;
pub use corpus::{CaseStore, PromptVariant, TestCase, VariantRegistry};
pub use error::{ConfigError, ProviderError, ProviderErrorKind, ScoringError};
pub use evaluator::{Scorer, ScoringStrategy, Verdict};
pub use metrics::{ResultAggregator, ResultAggregatorTrait, SummaryReport};
pub use report::{ReportGenerator, RunReport};
pub use runner::{ProviderRouter, RunHandle, RunPlan, RunSettings, Runner, ScoredResult};
