//! @ai:module:intent Scoring strategies and the combined scorer
//! @ai:module:layer application
//! @ai:module:public_api Scorer, ScoringStrategy, RubricRule, Verdict, Assessment

pub mod exact_match;
pub mod model_graded;
pub mod rubric;

pub use exact_match::ExactMatchScorer;
pub use model_graded::{default_judge_prompt, JudgeReply, ModelGradedScorer};
pub use rubric::RubricScorer;

use crate::corpus::TestCase;
use crate::error::ScoringError;
use crate::runner::{InvocationResult, ProviderRouter, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// @ai:intent Declarative grading rule attached to a case or used as default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ScoringStrategy {
    ExactMatch {
        #[serde(default)]
        case_sensitive: bool,
    },
    /// An empty rule list means "output contains the expected text"
    Rubric {
        #[serde(default = "default_rubric_threshold")]
        threshold: f64,
        #[serde(default)]
        rules: Vec<RubricRule>,
    },
    ModelGraded {
        judge: String,
        #[serde(default = "default_judge_threshold")]
        threshold: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rubric: Option<String>,
    },
}

fn default_rubric_threshold() -> f64 {
    1.0
}

fn default_judge_threshold() -> f64 {
    0.5
}

impl ScoringStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ScoringStrategy::ExactMatch { .. } => "exact_match",
            ScoringStrategy::Rubric { .. } => "rubric",
            ScoringStrategy::ModelGraded { .. } => "model_graded",
        }
    }
}

/// @ai:intent One rubric check; `{{expected}}` inside the text is replaced by the case's expected output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RubricRule {
    Contains(String),
    NotContains(String),
    Regex(String),
}

/// @ai:intent Outcome of scoring one cell; scores are in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    Pass { score: f64 },
    Fail { score: f64 },
    Inconclusive,
}

impl Verdict {
    /// @ai:intent Pass iff score >= threshold
    /// @ai:effects pure
    pub fn from_score(score: f64, threshold: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        if score >= threshold {
            Verdict::Pass { score }
        } else {
            Verdict::Fail { score }
        }
    }

    pub fn from_bool(passed: bool) -> Self {
        if passed {
            Verdict::Pass { score: 1.0 }
        } else {
            Verdict::Fail { score: 0.0 }
        }
    }

    pub fn passed(&self) -> Option<bool> {
        match self {
            Verdict::Pass { .. } => Some(true),
            Verdict::Fail { .. } => Some(false),
            Verdict::Inconclusive => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        match self {
            Verdict::Pass { score } | Verdict::Fail { score } => Some(*score),
            Verdict::Inconclusive => None,
        }
    }

    pub fn is_decisive(&self) -> bool {
        !matches!(self, Verdict::Inconclusive)
    }
}

/// @ai:intent Verdict plus optional explanation
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: Verdict,
    pub rationale: Option<String>,
}

impl Assessment {
    pub fn new(verdict: Verdict, rationale: Option<String>) -> Self {
        Self { verdict, rationale }
    }

    pub fn inconclusive(error: &ScoringError) -> Self {
        Self {
            verdict: Verdict::Inconclusive,
            rationale: Some(error.to_string()),
        }
    }
}

impl From<Result<Assessment, ScoringError>> for Assessment {
    fn from(result: Result<Assessment, ScoringError>) -> Self {
        result.unwrap_or_else(|e| Assessment::inconclusive(&e))
    }
}

/// @ai:intent Applies the strategies that govern a case and combines their verdicts
pub struct Scorer {
    defaults: Vec<ScoringStrategy>,
    exact: ExactMatchScorer,
    rubric: RubricScorer,
    judge: Option<ModelGradedScorer>,
}

impl Scorer {
    /// @ai:intent Scorer without a judge; model-graded strategies become Inconclusive
    /// @ai:effects pure
    pub fn new(defaults: Vec<ScoringStrategy>) -> Self {
        Self {
            defaults,
            exact: ExactMatchScorer,
            rubric: RubricScorer,
            judge: None,
        }
    }

    /// @ai:intent Enable model-graded scoring through the shared router
    /// @ai:effects pure
    pub fn with_judge(mut self, router: Arc<ProviderRouter>, retry: RetryPolicy, timeout: Duration) -> Self {
        self.judge = Some(ModelGradedScorer::new(router, retry, timeout));
        self
    }

    /// @ai:intent Resolve precedence: case strategies, then config defaults, then exact match
    /// @ai:effects pure
    pub fn strategies_for<'a>(&'a self, case: &'a TestCase) -> Vec<&'a ScoringStrategy> {
        static FALLBACK: ScoringStrategy = ScoringStrategy::ExactMatch {
            case_sensitive: false,
        };

        if !case.scoring.is_empty() {
            case.scoring.iter().collect()
        } else if !self.defaults.is_empty() {
            self.defaults.iter().collect()
        } else {
            vec![&FALLBACK]
        }
    }

    /// @ai:intent Score a successful invocation
    /// @ai:post never fails; strategy errors and failed invocations become Inconclusive
    /// @ai:effects network (model-graded only)
    pub async fn score(&self, case: &TestCase, invocation: &InvocationResult) -> Assessment {
        if !invocation.is_success() {
            return Assessment::new(
                Verdict::Inconclusive,
                Some(format!("cell {} produced no output to score", invocation.key)),
            );
        }

        let mut assessments = Vec::new();

        for strategy in self.strategies_for(case) {
            let assessment: Assessment = match strategy {
                ScoringStrategy::ExactMatch { case_sensitive } => self
                    .exact
                    .score(case, &invocation.output, *case_sensitive)
                    .into(),
                ScoringStrategy::Rubric { rules, threshold } => self
                    .rubric
                    .score(case, &invocation.output, rules, *threshold)
                    .into(),
                ScoringStrategy::ModelGraded {
                    judge,
                    rubric,
                    threshold,
                } => match &self.judge {
                    Some(grader) => grader
                        .score(case, &invocation.output, judge, rubric.as_deref(), *threshold)
                        .await
                        .into(),
                    None => Assessment::new(
                        Verdict::Inconclusive,
                        Some("model-graded scoring is not enabled".to_string()),
                    ),
                },
            };

            tracing::debug!(
                "Cell {} strategy {} -> {:?}",
                invocation.key,
                strategy.name(),
                assessment.verdict
            );
            assessments.push(assessment);
        }

        combine(assessments)
    }
}

/// @ai:intent Pass iff every decisive verdict passes; score is the mean of decisive scores
/// @ai:effects pure
pub fn combine(assessments: Vec<Assessment>) -> Assessment {
    let rationale = assessments
        .iter()
        .filter_map(|a| a.rationale.as_deref())
        .collect::<Vec<_>>()
        .join("; ");
    let rationale = (!rationale.is_empty()).then_some(rationale);

    let decisive: Vec<_> = assessments.iter().filter(|a| a.verdict.is_decisive()).collect();
    if decisive.is_empty() {
        return Assessment::new(Verdict::Inconclusive, rationale);
    }

    let passed = decisive.iter().all(|a| a.verdict.passed() == Some(true));
    let score = decisive.iter().filter_map(|a| a.verdict.score()).sum::<f64>() / decisive.len() as f64;

    let verdict = if passed {
        Verdict::Pass { score }
    } else {
        Verdict::Fail { score }
    };

    Assessment::new(verdict, rationale)
}
