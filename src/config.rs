//! @ai:module:intent Evaluation configuration: loading, validation and run-plan construction
//! @ai:module:layer infrastructure
//! @ai:module:public_api EvalConfig, ProviderSpec, ProviderKind, RateLimitPolicy, ConfigFormat, ProviderRegistry
//! @ai:module:stateless true

use crate::corpus::{CaseDirLoader, CaseStore, Keyed, PromptVariant, Registry, TestCase, VariantRegistry};
use crate::error::ConfigError;
use crate::evaluator::{RubricRule, ScoringStrategy};
use crate::runner::{RetryPolicy, RunPlan, RunSettings};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// @ai:intent On-disk format of a configuration or case file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// @ai:intent Pick the format from the file extension
    /// @ai:effects pure
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(if other.is_empty() {
                path.display().to_string()
            } else {
                other.to_string()
            })),
        }
    }

    /// @ai:intent Deserialize content in this format
    /// @ai:effects pure
    pub fn parse<T: DeserializeOwned>(&self, content: &str, path: &Path) -> Result<T, ConfigError> {
        let parsed = match self {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        };

        parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// @ai:intent Which client implementation serves a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(alias = "open_ai")]
    OpenAi,
    /// In-process stand-in, no network
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Mock => "mock",
        }
    }

    /// @ai:intent Environment variable consulted when `apiKeyEnv` is not set
    /// @ai:effects pure
    pub fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::Mock => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// @ai:intent Requests-per-minute budget for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub requests_per_minute: u32,
}

/// @ai:intent Connection parameters for a model endpoint; holds a credential *name*, never a secret
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    pub id: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Only used as a model-graded judge, not part of the matrix
    #[serde(default)]
    pub judge_only: bool,
    /// Fixed reply for mock providers; absent means echo the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<String>,
}

impl ProviderSpec {
    /// @ai:intent Name of the environment variable holding this provider's credential
    /// @ai:effects pure
    pub fn credential_env(&self) -> Option<&str> {
        self.api_key_env
            .as_deref()
            .or_else(|| self.kind.default_api_key_env())
    }

    /// @ai:intent Mock provider that echoes prompts back
    /// @ai:effects pure
    pub fn echo(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: ProviderKind::Mock,
            model: "echo".to_string(),
            endpoint: None,
            api_key_env: None,
            max_tokens: None,
            temperature: None,
            rate_limit: None,
            judge_only: false,
            mock_response: None,
        }
    }
}

impl Keyed for ProviderSpec {
    const REGISTRY: &'static str = "provider";

    fn id(&self) -> &str {
        &self.id
    }
}

pub type ProviderRegistry = Registry<ProviderSpec>;

/// @ai:intent Top-level evaluation document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalConfig {
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Per-attempt timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cases_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Default strategies for cases that declare none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scoring: Vec<ScoringStrategy>,
    pub providers: Vec<ProviderSpec>,
    pub variants: Vec<PromptVariant>,
    #[serde(default)]
    pub cases: Vec<TestCase>,
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl EvalConfig {
    /// @ai:intent Load, merge `casesDir`, and validate a configuration file
    /// @ai:pre path exists and is readable
    /// @ai:post returned config builds a RunPlan without error
    /// @ai:effects fs:read
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = ConfigFormat::from_path(path)?.parse(&content, path)?;

        if let Some(dir) = config.cases_dir.clone() {
            let dir = if dir.is_relative() {
                path.parent().unwrap_or_else(|| Path::new(".")).join(dir)
            } else {
                dir
            };
            let extra = CaseDirLoader::load(&dir)?;
            tracing::info!("Loaded {} cases from {}", extra.len(), dir.display());
            config.cases.extend(extra);
        }

        config.validate()?;
        Ok(config)
    }

    /// @ai:intent Save configuration as TOML
    /// @ai:effects fs:write
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_plan().map(|_| ())
    }

    /// @ai:intent Build immutable registries and check every cross-reference
    /// @ai:effects pure
    pub fn build_plan(&self) -> Result<RunPlan, ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrencyLimit",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retryPolicy.maxAttempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeoutMs",
                message: "must be positive".to_string(),
            });
        }

        let providers = ProviderRegistry::new(self.providers.clone())?;
        let variants = VariantRegistry::new(self.variants.clone())?;
        let cases = CaseStore::new(self.cases.clone())?;

        for provider in providers.list() {
            validate_provider(provider)?;
        }

        if !providers.list().iter().any(|p| !p.judge_only) {
            return Err(ConfigError::InvalidValue {
                field: "providers",
                message: "at least one non-judge provider is required".to_string(),
            });
        }
        if variants.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "variants",
                message: "at least one variant is required".to_string(),
            });
        }
        if cases.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cases",
                message: "at least one case is required".to_string(),
            });
        }

        for variant in variants.list() {
            if variant.template.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    registry: "variant",
                    field: "template",
                });
            }
            if let Some(affinity) = &variant.provider {
                if !providers.contains(affinity) {
                    return Err(ConfigError::UnknownProvider {
                        referenced_by: format!("variant {}", variant.id),
                        provider: affinity.clone(),
                    });
                }
            }
        }

        for strategy in &self.scoring {
            validate_strategy(strategy, "default scoring", &providers)?;
        }
        for case in cases.list() {
            for strategy in &case.scoring {
                validate_strategy(strategy, &case.id, &providers)?;
            }
        }

        Ok(RunPlan {
            variants,
            providers,
            cases,
            default_scoring: self.scoring.clone(),
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            concurrency_limit: self.concurrency_limit,
            retry_policy: self.retry_policy,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// @ai:intent Runnable example comparing a baseline and an optimized prompt offline
    /// @ai:effects pure
    pub fn sample() -> Self {
        let case = |id: &str, question: &str, expected: &str| TestCase {
            id: id.to_string(),
            description: None,
            input: [(
                "question".to_string(),
                serde_json::Value::String(question.to_string()),
            )]
            .into_iter()
            .collect(),
            expected: Some(expected.to_string()),
            scoring: vec![ScoringStrategy::Rubric {
                rules: vec![RubricRule::Contains(expected.to_string())],
                threshold: 1.0,
            }],
            tags: vec!["qa".to_string()],
        };

        Self {
            concurrency_limit: default_concurrency_limit(),
            timeout_ms: default_timeout_ms(),
            cases_dir: None,
            retry_policy: RetryPolicy::default(),
            scoring: vec![],
            providers: vec![ProviderSpec::echo("echo")],
            variants: vec![
                PromptVariant {
                    id: "baseline-qa".to_string(),
                    template: "Answer the question: {{question}}".to_string(),
                    origin: crate::corpus::ORIGIN_BASELINE.to_string(),
                    provider: None,
                    system: None,
                    output_field: None,
                },
                PromptVariant {
                    id: "optimized-qa".to_string(),
                    template: "Question: {{question}}\nThink briefly, then reply with the answer only."
                        .to_string(),
                    origin: crate::corpus::ORIGIN_OPTIMIZED.to_string(),
                    provider: None,
                    system: Some("You are a precise assistant.".to_string()),
                    output_field: None,
                },
            ],
            cases: vec![
                case("capital-france", "What is the capital of France?", "Paris"),
                case("romeo-author", "Who wrote Romeo and Juliet?", "Shakespeare"),
            ],
        }
    }
}

fn validate_provider(provider: &ProviderSpec) -> Result<(), ConfigError> {
    if provider.kind != ProviderKind::Mock && provider.model.trim().is_empty() {
        return Err(ConfigError::MissingField {
            registry: "provider",
            field: "model",
        });
    }
    if let Some(limit) = provider.rate_limit {
        if limit.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rateLimit.requestsPerMinute",
                message: format!("provider {} must allow at least 1 request", provider.id),
            });
        }
    }
    Ok(())
}

/// @ai:intent Check judge references, regexes and thresholds of one strategy
/// @ai:effects pure
fn validate_strategy(
    strategy: &ScoringStrategy,
    owner: &str,
    providers: &ProviderRegistry,
) -> Result<(), ConfigError> {
    match strategy {
        ScoringStrategy::ExactMatch { .. } => Ok(()),
        ScoringStrategy::Rubric { rules, threshold } => {
            check_threshold(*threshold)?;
            for rule in rules {
                if let RubricRule::Regex(pattern) = rule {
                    regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                        case_id: owner.to_string(),
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?;
                }
            }
            Ok(())
        }
        ScoringStrategy::ModelGraded {
            judge, threshold, ..
        } => {
            check_threshold(*threshold)?;
            if !providers.contains(judge) {
                return Err(ConfigError::UnknownProvider {
                    referenced_by: format!("model_graded scoring in {}", owner),
                    provider: judge.clone(),
                });
            }
            Ok(())
        }
    }
}

fn check_threshold(threshold: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ConfigError::InvalidValue {
            field: "threshold",
            message: format!("{} is outside [0, 1]", threshold),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
concurrencyLimit = 2

[retryPolicy]
maxAttempts = 5
baseDelayMs = 100

[[providers]]
id = "mini"
kind = "openai"
model = "gpt-4o-mini"
rateLimit = { requestsPerMinute = 30 }

[[variants]]
id = "baseline"
template = "{{question}}"

[[cases]]
id = "c1"
expected = "Paris"
input = { question = "Capital of France?" }
"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_toml_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = write(temp.path(), "eval.toml", MINIMAL);

        let config = EvalConfig::load(&path).unwrap();
        assert_eq!(config.concurrency_limit, 2);
        assert_eq!(config.retry_policy.max_attempts, 5);
        assert_eq!(config.retry_policy.base_delay_ms, 100);
        assert_eq!(config.retry_policy.max_delay_ms, 10_000);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.providers[0].credential_env(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_load_json_and_yaml() {
        let temp = TempDir::new().unwrap();
        let json = r#"{
            "providers": [{"id": "m", "kind": "mock"}],
            "variants": [{"id": "v", "template": "hi {{name}}", "origin": "optimized"}],
            "cases": [{"id": "c", "input": {"name": "Ada"}}]
        }"#;
        let yaml = "providers:\n  - id: m\n    kind: mock\nvariants:\n  - id: v\n    template: hi\ncases:\n  - id: c\n";

        let from_json = EvalConfig::load(&write(temp.path(), "eval.json", json)).unwrap();
        let from_yaml = EvalConfig::load(&write(temp.path(), "eval.yml", yaml)).unwrap();
        assert_eq!(from_json.variants[0].origin, "optimized");
        assert_eq!(from_yaml.concurrency_limit, 4);
    }

    #[test]
    fn test_duplicate_case_ids_rejected() {
        let temp = TempDir::new().unwrap();
        let content = format!("{}\n[[cases]]\nid = \"c1\"\n", MINIMAL);
        let err = EvalConfig::load(&write(temp.path(), "eval.toml", &content)).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateId { registry: "case", .. }));
    }

    #[test]
    fn test_missing_required_field_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let content = "[[providers]]\nid = \"m\"\nkind = \"mock\"\n[[variants]]\nid = \"v\"\n";
        let err = EvalConfig::load(&write(temp.path(), "eval.toml", content)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_affinity_rejected() {
        let mut config = EvalConfig::sample();
        config.variants[0].provider = Some("nowhere".to_string());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider { provider, .. } if provider == "nowhere"));
    }

    #[test]
    fn test_unknown_judge_rejected() {
        let mut config = EvalConfig::sample();
        config.scoring = vec![ScoringStrategy::ModelGraded {
            judge: "ghost".to_string(),
            rubric: None,
            threshold: 0.5,
        }];
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::UnknownProvider { .. }
        ));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut config = EvalConfig::sample();
        config.cases[0].scoring = vec![ScoringStrategy::Rubric {
            rules: vec![RubricRule::Regex("(unclosed".to_string())],
            threshold: 1.0,
        }];
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidRegex { .. }
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = EvalConfig::sample();
        config.concurrency_limit = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { field: "concurrencyLimit", .. }
        ));
    }

    #[test]
    fn test_judge_only_providers_do_not_count_for_matrix() {
        let mut config = EvalConfig::sample();
        config.providers[0].judge_only = true;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::InvalidValue { field: "providers", .. }
        ));
    }

    #[test]
    fn test_cases_dir_is_merged() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("cases")).unwrap();
        write(
            &temp.path().join("cases"),
            "more.toml",
            "[[cases]]\nid = \"c2\"\nexpected = \"Shakespeare\"\n",
        );
        let content = format!("casesDir = \"cases\"\n{}", MINIMAL);
        let config = EvalConfig::load(&write(temp.path(), "eval.toml", &content)).unwrap();

        let ids: Vec<_> = config.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn test_sample_roundtrips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.toml");
        EvalConfig::sample().save(&path).unwrap();

        let loaded = EvalConfig::load(&path).unwrap();
        assert_eq!(loaded.variants.len(), 2);
        assert_eq!(loaded.cases.len(), 2);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            ConfigFormat::from_path(Path::new("eval.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
