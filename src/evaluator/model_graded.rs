//! @ai:module:intent Delegate grading to a judge provider and parse its JSON verdict
//! @ai:module:layer application
//! @ai:module:public_api ModelGradedScorer, JudgeReply, default_judge_prompt
//! @ai:module:stateless true

use crate::corpus::{case::value_to_text, TestCase};
use crate::error::ScoringError;
use crate::evaluator::{Assessment, Verdict};
use crate::runner::retry::{run_with_retry, RetryFailure};
use crate::runner::{ProviderRequest, ProviderRouter, RetryPolicy};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const JUDGE_SYSTEM: &str = "You are a strict evaluator. Respond only with JSON.";

fn judge_placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{(INPUT|EXPECTED|RUBRIC|OUTPUT)\}\}").expect("judge placeholder regex is valid")
    })
}

/// @ai:intent Shape of the judge's answer; either `score` or `pass` must be present
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JudgeReply {
    #[serde(default)]
    pub pass: Option<bool>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl JudgeReply {
    /// @ai:intent Score governs the verdict; `pass` is used only when no score is given
    /// @ai:effects pure
    pub fn verdict(&self, threshold: f64) -> Result<Verdict, ScoringError> {
        match (self.score, self.pass) {
            (Some(score), _) if score.is_finite() => Ok(Verdict::from_score(score, threshold)),
            (Some(score), _) => Err(ScoringError::Unparseable(format!("judge score {}", score))),
            (None, Some(pass)) => Ok(Verdict::from_bool(pass)),
            (None, None) => Err(ScoringError::Unparseable(
                "judge reply has neither score nor pass".to_string(),
            )),
        }
    }
}

/// @ai:intent Sends the candidate output to a judge provider through the shared router
pub struct ModelGradedScorer {
    router: Arc<ProviderRouter>,
    retry: RetryPolicy,
    timeout: Duration,
    prompt_template: String,
}

impl ModelGradedScorer {
    /// @ai:effects pure
    pub fn new(router: Arc<ProviderRouter>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            router,
            retry,
            timeout,
            prompt_template: default_judge_prompt(),
        }
    }

    /// @ai:intent Build the judge prompt from case inputs, expected answer and candidate output
    /// @ai:post single pass; placeholder text inside substituted values is left as-is
    /// @ai:effects pure
    fn build_prompt(&self, case: &TestCase, output: &str, rubric: Option<&str>) -> String {
        let input = case
            .input
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value_to_text(value)))
            .collect::<Vec<_>>()
            .join("\n");
        let expected = case.expected.as_deref().unwrap_or("(none provided)");
        let rubric = rubric.unwrap_or("The output correctly and completely answers the input.");

        judge_placeholder_regex()
            .replace_all(&self.prompt_template, |cap: &regex::Captures<'_>| match &cap[1] {
                "INPUT" => input.clone(),
                "EXPECTED" => expected.to_string(),
                "RUBRIC" => rubric.to_string(),
                _ => output.to_string(),
            })
            .into_owned()
    }

    /// @ai:intent Ask `judge_id` to grade `output`; judge failures are scoring errors
    /// @ai:post retryable judge errors are retried with the run's policy
    /// @ai:effects network, time
    pub async fn score(
        &self,
        case: &TestCase,
        output: &str,
        judge_id: &str,
        rubric: Option<&str>,
        threshold: f64,
    ) -> Result<Assessment, ScoringError> {
        let request = ProviderRequest::new(self.build_prompt(case, output, rubric))
            .with_system(Some(JUDGE_SYSTEM.to_string()));

        // In-flight cells run to completion, so the judge call is never cancelled.
        let never = CancellationToken::new();
        let outcome = run_with_retry(&self.retry, &never, |_| {}, |_| {
            self.router.invoke(judge_id, &request, self.timeout)
        })
        .await;

        let response = match outcome.result {
            Ok(response) => response,
            Err(RetryFailure::Failed(e)) | Err(RetryFailure::Cancelled(e)) => {
                return Err(ScoringError::Judge(e));
            }
        };
        tracing::debug!("Judge {} response: {}", judge_id, response.text);

        let reply = parse_reply(&response.text)?;
        let verdict = reply.verdict(threshold)?;
        Ok(Assessment::new(verdict, reply.reason))
    }
}

/// @ai:intent Default judge prompt template
/// @ai:effects pure
pub fn default_judge_prompt() -> String {
    r#"Grade a model response against the criteria below.

## Input
{{INPUT}}

## Expected Answer
{{EXPECTED}}

## Criteria
{{RUBRIC}}

## Response To Grade
{{OUTPUT}}

## Required Output Format
Respond ONLY with valid JSON in this exact format:
{"pass": <true|false>, "score": <0.0-1.0>, "reason": "<one sentence>"}"#
        .to_string()
}

/// @ai:intent Parse the judge's JSON, tolerating surrounding prose
/// @ai:effects pure
fn parse_reply(response: &str) -> Result<JudgeReply, ScoringError> {
    let json = extract_json(response)?;
    serde_json::from_str(json)
        .map_err(|e| ScoringError::Unparseable(format!("invalid judge JSON: {}", e)))
}

/// @ai:intent Extract the outermost JSON object from a response that may contain extra text
/// @ai:effects pure
fn extract_json(response: &str) -> Result<&str, ScoringError> {
    let start = response
        .find('{')
        .ok_or_else(|| ScoringError::Unparseable("no JSON object in judge reply".to_string()))?;
    let end = response
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ScoringError::Unparseable("unterminated JSON object in judge reply".to_string()))?;

    Ok(&response[start..=end])
}
