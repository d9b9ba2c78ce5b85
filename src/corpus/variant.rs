//! @ai:module:intent Prompt variant definitions, template rendering and the variant registry
//! @ai:module:layer domain
//! @ai:module:public_api PromptVariant, VariantRegistry, TemplateError
//! @ai:module:stateless true

use crate::corpus::case::TestCase;
use crate::corpus::registry::{Keyed, Registry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

pub const ORIGIN_BASELINE: &str = "baseline";
pub const ORIGIN_OPTIMIZED: &str = "optimized";

/// @ai:intent A candidate prompt template, hand-written or produced by an optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVariant {
    pub id: String,
    pub template: String,
    /// Either "baseline" or "optimized"; other tags are kept as-is
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Provider this variant was written or optimized for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Field to pull out of a JSON response object, e.g. "answer"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_field: Option<String>,
}

fn default_origin() -> String {
    ORIGIN_BASELINE.to_string()
}

/// @ai:intent Placeholder referenced by a template but absent from the case input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("variant {variant} references `{{{{{placeholder}}}}}` which case {case} does not define")]
pub struct TemplateError {
    pub variant: String,
    pub case: String,
    pub placeholder: String,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_\.-]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

impl PromptVariant {
    /// @ai:intent Names of all placeholders used by the template, in order of appearance
    /// @ai:effects pure
    pub fn placeholders(&self) -> Vec<String> {
        placeholder_regex()
            .captures_iter(&self.template)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    /// @ai:intent Substitute case inputs into the template
    /// @ai:pre every placeholder exists in case.input
    /// @ai:post placeholder-free templates get the input appended as `name: value` lines
    /// @ai:effects pure
    pub fn render(&self, case: &TestCase) -> Result<String, TemplateError> {
        if !placeholder_regex().is_match(&self.template) {
            return Ok(append_inputs(&self.template, case));
        }

        if let Some(missing) = self
            .placeholders()
            .into_iter()
            .find(|name| !case.input.contains_key(name))
        {
            return Err(TemplateError {
                variant: self.id.clone(),
                case: case.id.clone(),
                placeholder: missing,
            });
        }

        let rendered = placeholder_regex().replace_all(&self.template, |cap: &regex::Captures<'_>| {
            case.input_text(&cap[1]).unwrap_or_default()
        });

        Ok(rendered.into_owned())
    }
}

fn append_inputs(template: &str, case: &TestCase) -> String {
    if case.input.is_empty() {
        return template.to_string();
    }

    let inputs = case
        .input
        .iter()
        .map(|(name, value)| format!("{}: {}", name, crate::corpus::case::value_to_text(value)))
        .collect::<Vec<_>>()
        .join("\n");

    if template.trim().is_empty() {
        inputs
    } else {
        format!("{}\n\n{}", template.trim_end(), inputs)
    }
}

impl Keyed for PromptVariant {
    const REGISTRY: &'static str = "variant";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type VariantRegistry = Registry<PromptVariant>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn variant(template: &str) -> PromptVariant {
        PromptVariant {
            id: "v".to_string(),
            template: template.to_string(),
            origin: ORIGIN_BASELINE.to_string(),
            provider: None,
            system: None,
            output_field: None,
        }
    }

    fn case_with(pairs: &[(&str, serde_json::Value)]) -> TestCase {
        TestCase {
            id: "c".to_string(),
            description: None,
            input: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            expected: None,
            scoring: vec![],
            tags: vec![],
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let v = variant("Q: {{question}} (in {{ lang }})");
        let case = case_with(&[
            ("question", serde_json::json!("Capital of France?")),
            ("lang", serde_json::json!("English")),
        ]);
        assert_eq!(v.render(&case).unwrap(), "Q: Capital of France? (in English)");
    }

    #[test]
    fn test_render_missing_placeholder_fails() {
        let v = variant("Q: {{question}} {{context}}");
        let case = case_with(&[("question", serde_json::json!("hi"))]);
        let err = v.render(&case).unwrap_err();
        assert_eq!(err.placeholder, "context");
        assert_eq!(err.case, "c");
    }

    #[test]
    fn test_render_without_placeholders_appends_inputs() {
        let v = variant("Answer the question.");
        let case = case_with(&[("question", serde_json::json!("Who wrote Hamlet?"))]);
        assert_eq!(
            v.render(&case).unwrap(),
            "Answer the question.\n\nquestion: Who wrote Hamlet?"
        );
    }

    #[test]
    fn test_non_string_inputs_render_as_json() {
        let v = variant("n={{n}}");
        let case = case_with(&[("n", serde_json::json!(3))]);
        assert_eq!(v.render(&case).unwrap(), "n=3");
    }

    #[test]
    fn test_origin_defaults_to_baseline() {
        let v: PromptVariant = toml::from_str("id = \"a\"\ntemplate = \"t\"").unwrap();
        assert_eq!(v.origin, ORIGIN_BASELINE);
        assert_eq!(v.provider, None);
    }
}
