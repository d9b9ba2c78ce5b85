//! @ai:module:intent Test case definitions and the case store
//! @ai:module:layer domain
//! @ai:module:public_api TestCase, CaseStore
//! @ai:module:stateless true

use crate::corpus::registry::{Keyed, Registry};
use crate::evaluator::ScoringStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// @ai:intent One input/expected-output pair under evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Template variables, keyed by placeholder name
    #[serde(default)]
    pub input: BTreeMap<String, serde_json::Value>,
    /// Grading hints; when present they replace the config-level default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scoring: Vec<ScoringStrategy>,
}

impl TestCase {
    /// @ai:intent Render an input value as prompt text
    /// @ai:effects pure
    pub fn input_text(&self, name: &str) -> Option<String> {
        self.input.get(name).map(value_to_text)
    }
}

/// @ai:intent Strings are used verbatim, everything else as compact JSON
/// @ai:effects pure
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Keyed for TestCase {
    const REGISTRY: &'static str = "case";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type CaseStore = Registry<TestCase>;
