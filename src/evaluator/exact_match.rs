//! @ai:module:intent Exact comparison of output against the expected answer
//! @ai:module:layer application
//! @ai:module:public_api ExactMatchScorer
//! @ai:module:stateless true

use crate::corpus::TestCase;
use crate::error::ScoringError;
use crate::evaluator::{Assessment, Verdict};

pub struct ExactMatchScorer;

impl ExactMatchScorer {
    /// @ai:intent Compare trimmed output and expected text
    /// @ai:pre case.expected is set
    /// @ai:effects pure
    pub fn score(
        &self,
        case: &TestCase,
        output: &str,
        case_sensitive: bool,
    ) -> Result<Assessment, ScoringError> {
        let expected = case
            .expected
            .as_deref()
            .ok_or_else(|| ScoringError::MissingExpected(case.id.clone()))?;

        let (output, expected) = (output.trim(), expected.trim());
        let matched = if case_sensitive {
            output == expected
        } else {
            output.to_lowercase() == expected.to_lowercase()
        };

        let rationale = (!matched).then(|| format!("expected `{}`", expected));
        Ok(Assessment::new(Verdict::from_bool(matched), rationale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn case(expected: &str) -> TestCase {
        TestCase {
            id: "c".to_string(),
            description: None,
            expected: Some(expected.to_string()),
            tags: vec![],
            input: BTreeMap::new(),
            scoring: vec![],
        }
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let result = ExactMatchScorer.score(&case("Paris"), "PARIS\n", false).unwrap();
        assert_eq!(result.verdict, Verdict::Pass { score: 1.0 });
        assert!(result.rationale.is_none());
    }

    #[test]
    fn test_case_sensitive_mismatch() {
        let result = ExactMatchScorer.score(&case("Paris"), "paris", true).unwrap();
        assert_eq!(result.verdict, Verdict::Fail { score: 0.0 });
        assert_eq!(result.rationale.as_deref(), Some("expected `Paris`"));
    }

    #[test]
    fn test_substring_is_not_a_match() {
        let result = ExactMatchScorer.score(&case("Paris"), "It is Paris", false).unwrap();
        assert_eq!(result.verdict.passed(), Some(false));
    }
}
