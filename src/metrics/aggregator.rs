//! @ai:module:intent Deterministic aggregation of scored cells into a summary
//! @ai:module:layer application
//! @ai:module:public_api ResultAggregator, ResultAggregatorTrait
//! @ai:module:stateless true

use crate::corpus::{VariantRegistry, ORIGIN_BASELINE, ORIGIN_OPTIMIZED};
use crate::evaluator::Verdict;
use crate::metrics::types::{
    FailureEntry, GroupStats, GroupSummary, OriginComparison, SummaryReport, VariantInfo,
    VariantSummary,
};
use crate::runner::{CellStatus, FailureKind, RunPlan, ScoredResult};
use std::collections::{BTreeMap, BTreeSet};

/// @ai:intent Trait for result aggregation
pub trait ResultAggregatorTrait: Send + Sync {
    /// @ai:intent Reduce scored cells into per-group statistics
    /// @ai:post identical input (in any order) yields an identical report
    fn aggregate(&self, results: &[ScoredResult]) -> SummaryReport;
}

/// @ai:intent Aggregates scored results; knows variant origins, affinities and the matrix providers
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    variants: BTreeMap<String, VariantInfo>,
    /// Every (known variant, provider) pair gets a group, even with no results
    providers: Vec<String>,
}

impl ResultAggregator {
    /// @ai:intent Aggregator without variant information; the origin comparison stays empty
    /// @ai:effects pure
    pub fn new() -> Self {
        Self::default()
    }

    /// @ai:effects pure
    pub fn with_variants(variants: BTreeMap<String, VariantInfo>) -> Self {
        Self {
            variants,
            providers: Vec::new(),
        }
    }

    /// @ai:effects pure
    pub fn with_providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers;
        self.providers.sort();
        self.providers.dedup();
        self
    }

    /// @ai:intent Aggregator covering every variant and matrix provider of a plan
    /// @ai:effects pure
    pub fn from_plan(plan: &RunPlan) -> Self {
        Self::from_variants(&plan.variants).with_providers(
            plan.matrix_providers()
                .into_iter()
                .map(|p| p.id.clone())
                .collect(),
        )
    }

    /// @ai:effects pure
    pub fn from_variants(variants: &VariantRegistry) -> Self {
        Self::with_variants(
            variants
                .list()
                .iter()
                .map(|v| {
                    let info = VariantInfo {
                        origin: v.origin.clone(),
                        provider: v.provider.clone(),
                    };
                    (v.id.clone(), info)
                })
                .collect(),
        )
    }

    pub fn variants(&self) -> &BTreeMap<String, VariantInfo> {
        &self.variants
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    fn origin(&self, variant: &str) -> Option<&str> {
        self.variants.get(variant).map(|info| info.origin.as_str())
    }

    fn has_affinity(&self, variant: &str, provider: &str) -> bool {
        self.variants
            .get(variant)
            .is_some_and(|info| info.has_affinity(provider))
    }

    /// @ai:intent Statistics for a set of cells
    /// @ai:pre members are sorted by key so float sums are reproducible
    /// @ai:effects pure
    fn calculate_stats(members: &[&ScoredResult]) -> GroupStats {
        let mut stats = GroupStats {
            count: members.len() as u32,
            ..Default::default()
        };
        let mut scores = Vec::new();
        let mut latencies = Vec::new();

        for result in members {
            if result.status == CellStatus::Failed {
                stats.failure_count += 1;
                continue;
            }

            stats.succeeded += 1;
            latencies.push(result.latency_ms as f64);
            if let Some(usage) = result.token_usage {
                stats.total_input_tokens += usage.input_tokens as u64;
                stats.total_output_tokens += usage.output_tokens as u64;
            }

            match result.verdict {
                Some(Verdict::Pass { score }) => {
                    stats.passed += 1;
                    scores.push(score);
                }
                Some(Verdict::Fail { score }) => scores.push(score),
                Some(Verdict::Inconclusive) | None => stats.inconclusive_count += 1,
            }
        }

        stats.pass_rate = ratio(stats.passed, stats.graded());
        stats.mean_score = average(&scores);
        stats.mean_latency_ms = average(&latencies);
        stats
    }

    /// @ai:intent Pooled pass rate per origin for every provider present
    /// @ai:effects pure
    fn compare_origins(&self, sorted: &[&ScoredResult]) -> Vec<OriginComparison> {
        let known = |origin: &str| self.variants.values().any(|info| info.origin == origin);
        if !known(ORIGIN_BASELINE) || !known(ORIGIN_OPTIMIZED) {
            return vec![];
        }

        let providers: BTreeSet<&str> = sorted
            .iter()
            .map(|r| r.key.provider.as_str())
            .chain(self.providers.iter().map(String::as_str))
            .collect();
        providers
            .into_iter()
            .map(|provider| {
                let pass_rate = |origin: &str| {
                    let members: Vec<_> = sorted
                        .iter()
                        .copied()
                        .filter(|r| r.key.provider == provider)
                        .filter(|r| self.origin(&r.key.variant) == Some(origin))
                        .collect();
                    Self::calculate_stats(&members).pass_rate
                };
                OriginComparison::new(provider, pass_rate(ORIGIN_BASELINE), pass_rate(ORIGIN_OPTIMIZED))
            })
            .collect()
    }
}

impl ResultAggregatorTrait for ResultAggregator {
    /// @ai:intent Group by (variant, provider) and by variant, then list failures
    /// @ai:effects pure
    fn aggregate(&self, results: &[ScoredResult]) -> SummaryReport {
        let mut sorted: Vec<&ScoredResult> = results.iter().collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));

        let mut groups: BTreeMap<(&str, &str), Vec<&ScoredResult>> = BTreeMap::new();
        let mut variants: BTreeMap<&str, Vec<&ScoredResult>> = BTreeMap::new();
        for variant in self.variants.keys() {
            variants.entry(variant.as_str()).or_default();
            for provider in &self.providers {
                groups.entry((variant.as_str(), provider.as_str())).or_default();
            }
        }
        for &result in &sorted {
            groups
                .entry((result.key.variant.as_str(), result.key.provider.as_str()))
                .or_default()
                .push(result);
            variants.entry(result.key.variant.as_str()).or_default().push(result);
        }

        let groups = groups
            .into_iter()
            .map(|((variant, provider), members)| GroupSummary {
                variant: variant.to_string(),
                provider: provider.to_string(),
                affinity: self.has_affinity(variant, provider),
                stats: Self::calculate_stats(&members),
            })
            .collect();

        let by_variant = variants
            .into_iter()
            .map(|(variant, members)| VariantSummary {
                variant: variant.to_string(),
                origin: self.origin(variant).map(str::to_string),
                stats: Self::calculate_stats(&members),
            })
            .collect();

        let failures = sorted
            .iter()
            .filter(|r| r.status == CellStatus::Failed)
            .map(|r| {
                let (kind, message) = r
                    .error
                    .as_ref()
                    .map(|e| (e.kind, e.message.clone()))
                    .unwrap_or((FailureKind::Unknown, String::new()));
                FailureEntry {
                    key: r.key.clone(),
                    kind,
                    message,
                    attempts: r.attempts,
                }
            })
            .collect();

        SummaryReport {
            total_cells: sorted.len() as u32,
            groups,
            by_variant,
            origin_comparison: self.compare_origins(&sorted),
            failures,
        }
    }
}

fn ratio(numerator: u32, denominator: u32) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

/// @ai:intent Mean of the values, None when empty
/// @ai:effects pure
fn average(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CellFailure, CellKey, TokenUsage};
    use pretty_assertions::assert_eq;

    fn scored(variant: &str, provider: &str, case: &str, verdict: Option<Verdict>) -> ScoredResult {
        ScoredResult {
            key: CellKey::new(variant, provider, case),
            status: CellStatus::Succeeded,
            verdict,
            rationale: None,
            output: "out".to_string(),
            attempts: 1,
            latency_ms: 10,
            token_usage: Some(TokenUsage {
                input_tokens: 5,
                output_tokens: 3,
            }),
            error: None,
        }
    }

    fn failed(variant: &str, provider: &str, case: &str) -> ScoredResult {
        ScoredResult {
            status: CellStatus::Failed,
            verdict: None,
            output: String::new(),
            token_usage: None,
            attempts: 3,
            error: Some(CellFailure {
                kind: FailureKind::RateLimited,
                message: "429".to_string(),
            }),
            ..scored(variant, provider, case, None)
        }
    }

    fn pass() -> Option<Verdict> {
        Some(Verdict::Pass { score: 1.0 })
    }

    fn fail() -> Option<Verdict> {
        Some(Verdict::Fail { score: 0.0 })
    }

    fn info(origin: &str, provider: Option<&str>) -> VariantInfo {
        VariantInfo {
            origin: origin.to_string(),
            provider: provider.map(str::to_string),
        }
    }

    fn origins() -> ResultAggregator {
        ResultAggregator::with_variants(
            [("a", info("baseline", None)), ("b", info("optimized", Some("q")))]
                .into_iter()
                .map(|(v, i)| (v.to_string(), i))
                .collect(),
        )
    }

    #[test]
    fn test_pass_rates_per_group() {
        let results = vec![
            scored("a", "p", "c1", pass()),
            scored("a", "p", "c2", pass()),
            scored("a", "p", "c3", pass()),
            scored("b", "p", "c1", pass()),
            scored("b", "p", "c2", fail()),
            scored("b", "p", "c3", fail()),
        ];
        let summary = origins().aggregate(&results);

        let a = &summary.group("a", "p").unwrap().stats;
        assert_eq!(a.pass_rate, Some(1.0));
        assert_eq!(a.total_input_tokens, 15);

        let b = &summary.group("b", "p").unwrap().stats;
        assert!((b.pass_rate.unwrap() - 1.0 / 3.0).abs() < 1e-9);
        assert!((b.mean_score.unwrap() - 1.0 / 3.0).abs() < 1e-9);

        assert_eq!(summary.origin_comparison.len(), 1);
        let comparison = &summary.origin_comparison[0];
        assert!((comparison.delta.unwrap() + 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_failed_group_has_null_pass_rate() {
        let results = vec![failed("a", "p", "c1"), failed("a", "p", "c2")];
        let summary = ResultAggregator::new().aggregate(&results);

        let stats = &summary.groups[0].stats;
        assert_eq!(stats.count, 2);
        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.pass_rate, None);
        assert_eq!(stats.mean_score, None);
        assert_eq!(stats.mean_latency_ms, None);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].kind, FailureKind::RateLimited);
    }

    #[test]
    fn test_inconclusive_is_excluded_from_pass_rate() {
        let results = vec![
            scored("a", "p", "c1", pass()),
            scored("a", "p", "c2", Some(Verdict::Inconclusive)),
            failed("a", "p", "c3"),
        ];
        let stats = ResultAggregator::new().aggregate(&results).groups[0].stats.clone();

        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.inconclusive_count, 1);
        assert_eq!(stats.graded(), 1);
        assert_eq!(stats.pass_rate, Some(1.0));
    }

    #[test]
    fn test_aggregation_is_idempotent_and_order_independent() {
        let mut results = vec![
            scored("b", "q", "c2", Some(Verdict::Fail { score: 0.1 })),
            scored("a", "p", "c1", Some(Verdict::Pass { score: 0.7 })),
            failed("a", "q", "c1"),
            scored("b", "p", "c1", Some(Verdict::Pass { score: 0.3 })),
            scored("a", "p", "c2", Some(Verdict::Fail { score: 0.2 })),
        ];
        let aggregator = origins();

        let first = serde_json::to_string(&aggregator.aggregate(&results)).unwrap();
        let second = serde_json::to_string(&aggregator.aggregate(&results)).unwrap();
        results.reverse();
        let reversed = serde_json::to_string(&aggregator.aggregate(&results)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, reversed);
    }

    #[test]
    fn test_groups_sorted_and_variant_rollup() {
        let results = vec![
            scored("b", "p", "c1", pass()),
            scored("b", "q", "c1", pass()),
            scored("a", "q", "c1", fail()),
            scored("a", "p", "c1", pass()),
        ];
        let summary = origins().aggregate(&results);

        let keys: Vec<_> = summary
            .groups
            .iter()
            .map(|g| format!("{}/{}", g.variant, g.provider))
            .collect();
        assert_eq!(keys, vec!["a/p", "a/q", "b/p", "b/q"]);
        assert!(summary.group("b", "q").unwrap().affinity);
        assert!(!summary.group("b", "p").unwrap().affinity);

        assert_eq!(summary.by_variant[0].variant, "a");
        assert_eq!(summary.by_variant[0].origin.as_deref(), Some("baseline"));
        assert_eq!(summary.by_variant[0].stats.pass_rate, Some(0.5));
    }

    #[test]
    fn test_origin_comparison_requires_both_origins() {
        let aggregator = ResultAggregator::with_variants(
            [("a".to_string(), info("baseline", None))].into_iter().collect(),
        );
        let summary = aggregator.aggregate(&[scored("a", "p", "c1", pass())]);
        assert!(summary.origin_comparison.is_empty());
    }

    #[test]
    fn test_undispatched_pairs_report_null_pass_rate() {
        let aggregator = origins().with_providers(vec!["q".to_string(), "p".to_string()]);
        // Cancelled before variant b was reached
        let results = vec![scored("a", "p", "c1", pass()), scored("a", "q", "c1", fail())];
        let summary = aggregator.aggregate(&results);

        let keys: Vec<_> = summary
            .groups
            .iter()
            .map(|g| format!("{}/{}", g.variant, g.provider))
            .collect();
        assert_eq!(keys, vec!["a/p", "a/q", "b/p", "b/q"]);

        let missing = &summary.group("b", "p").unwrap().stats;
        assert_eq!(missing.count, 0);
        assert_eq!(missing.pass_rate, None);
        assert_eq!(missing.mean_score, None);
        assert!(summary.group("b", "q").unwrap().affinity);

        assert_eq!(summary.by_variant.len(), 2);
        assert_eq!(summary.by_variant[1].stats.count, 0);
        assert_eq!(summary.by_variant[1].stats.pass_rate, None);
        assert_eq!(summary.total_cells, 2);

        // Origin comparison still lists every provider; optimized side is undefined
        assert_eq!(summary.origin_comparison.len(), 2);
        assert_eq!(summary.origin_comparison[0].optimized_pass_rate, None);
        assert_eq!(summary.origin_comparison[0].delta, None);
    }
}
