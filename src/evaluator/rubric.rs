//! @ai:module:intent Rubric scoring with substring and regex rules
//! @ai:module:layer application
//! @ai:module:public_api RubricScorer
//! @ai:module:stateless true

use crate::corpus::TestCase;
use crate::error::ScoringError;
use crate::evaluator::{Assessment, RubricRule, Verdict};
use regex::Regex;

const EXPECTED_PLACEHOLDER: &str = "{{expected}}";

pub struct RubricScorer;

impl RubricScorer {
    /// @ai:intent Score = fraction of satisfied rules; pass when score >= threshold
    /// @ai:post empty rules behave like a single `contains {{expected}}` rule
    /// @ai:effects pure
    pub fn score(
        &self,
        case: &TestCase,
        output: &str,
        rules: &[RubricRule],
        threshold: f64,
    ) -> Result<Assessment, ScoringError> {
        let implicit = [RubricRule::Contains(EXPECTED_PLACEHOLDER.to_string())];
        let rules = if rules.is_empty() { &implicit[..] } else { rules };

        let mut failed = Vec::new();
        for rule in rules {
            if !Self::check(case, output, rule)? {
                failed.push(describe(rule));
            }
        }

        let satisfied = rules.len() - failed.len();
        let score = satisfied as f64 / rules.len() as f64;
        let rationale = (!failed.is_empty()).then(|| format!("unmet: {}", failed.join(", ")));

        Ok(Assessment::new(Verdict::from_score(score, threshold), rationale))
    }

    /// @ai:intent Evaluate one rule; substring rules ignore case
    /// @ai:effects pure
    fn check(case: &TestCase, output: &str, rule: &RubricRule) -> Result<bool, ScoringError> {
        let haystack = output.to_lowercase();

        Ok(match rule {
            RubricRule::Contains(needle) => haystack.contains(&resolve(case, needle, false)?.to_lowercase()),
            RubricRule::NotContains(needle) => {
                !haystack.contains(&resolve(case, needle, false)?.to_lowercase())
            }
            RubricRule::Regex(pattern) => {
                let pattern = resolve(case, pattern, true)?;
                // Patterns are validated at load time; `{{expected}}` substitution can still break them.
                let re = Regex::new(&pattern)
                    .map_err(|e| ScoringError::Unparseable(format!("regex `{}`: {}", pattern, e)))?;
                re.is_match(output)
            }
        })
    }
}

/// @ai:intent Substitute the case's expected output into rule text
/// @ai:post with `literal`, the expected text is regex-escaped and matches only itself
/// @ai:effects pure
fn resolve(case: &TestCase, text: &str, literal: bool) -> Result<String, ScoringError> {
    if !text.contains(EXPECTED_PLACEHOLDER) {
        return Ok(text.to_string());
    }

    let expected = case
        .expected
        .as_deref()
        .ok_or_else(|| ScoringError::MissingExpected(case.id.clone()))?;
    if literal {
        Ok(text.replace(EXPECTED_PLACEHOLDER, &regex::escape(expected)))
    } else {
        Ok(text.replace(EXPECTED_PLACEHOLDER, expected))
    }
}

fn describe(rule: &RubricRule) -> String {
    match rule {
        RubricRule::Contains(s) => format!("contains `{}`", s),
        RubricRule::NotContains(s) => format!("not_contains `{}`", s),
        RubricRule::Regex(s) => format!("regex `{}`", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn case(expected: Option<&str>) -> TestCase {
        TestCase {
            id: "c".to_string(),
            description: None,
            expected: expected.map(str::to_string),
            tags: vec![],
            input: BTreeMap::new(),
            scoring: vec![],
        }
    }

    #[test]
    fn test_empty_rules_check_expected_substring() {
        let result = RubricScorer
            .score(&case(Some("Shakespeare")), "William Shakespeare wrote it", &[], 1.0)
            .unwrap();
        assert_eq!(result.verdict, Verdict::Pass { score: 1.0 });
    }

    #[test]
    fn test_partial_rules_below_threshold() {
        let rules = vec![
            RubricRule::Contains("paris".to_string()),
            RubricRule::NotContains("london".to_string()),
            RubricRule::Regex(r"\d{4}".to_string()),
        ];
        let result = RubricScorer
            .score(&case(None), "Paris, not London", &rules, 1.0)
            .unwrap();

        match result.verdict {
            Verdict::Fail { score } => assert!((score - 1.0 / 3.0).abs() < 1e-9),
            other => panic!("unexpected verdict {:?}", other),
        }
        let rationale = result.rationale.unwrap();
        assert!(rationale.contains("not_contains `london`"));
        assert!(rationale.contains(r"regex `\d{4}`"));
    }

    #[test]
    fn test_threshold_allows_partial_pass() {
        let rules = vec![
            RubricRule::Contains("paris".to_string()),
            RubricRule::Contains("eiffel".to_string()),
        ];
        let result = RubricScorer.score(&case(None), "Paris", &rules, 0.5).unwrap();
        assert_eq!(result.verdict, Verdict::Pass { score: 0.5 });
    }

    #[test]
    fn test_expected_placeholder_requires_expected() {
        let err = RubricScorer.score(&case(None), "Paris", &[], 1.0).unwrap_err();
        assert!(matches!(err, ScoringError::MissingExpected(_)));
    }

    #[test]
    fn test_regex_with_expected_placeholder() {
        let rules = vec![RubricRule::Regex(r"(?i)^\s*{{expected}}\.?$".to_string())];
        let result = RubricScorer.score(&case(Some("Paris")), " paris.", &rules, 1.0).unwrap();
        assert!(result.verdict.passed().unwrap());
    }

    #[test]
    fn test_expected_is_literal_inside_regex() {
        let rules = vec![RubricRule::Regex("^{{expected}}$".to_string())];

        let cpp = RubricScorer.score(&case(Some("C++")), "C++", &rules, 1.0).unwrap();
        assert_eq!(cpp.verdict, Verdict::Pass { score: 1.0 });

        let pi = RubricScorer.score(&case(Some("3.14")), "3x14", &rules, 1.0).unwrap();
        assert_eq!(pi.verdict, Verdict::Fail { score: 0.0 });
    }

    #[test]
    fn test_expected_is_not_escaped_for_substring_rules() {
        let rules = vec![RubricRule::Contains("{{expected}}".to_string())];
        let result = RubricScorer.score(&case(Some("a.b")), "see a.b here", &rules, 1.0).unwrap();
        assert_eq!(result.verdict, Verdict::Pass { score: 1.0 });
    }
}
