//! @ai:module:intent Summary types produced by result aggregation
//! @ai:module:layer domain
//! @ai:module:public_api VariantInfo, GroupStats, GroupSummary, VariantSummary, OriginComparison, FailureEntry, SummaryReport
//! @ai:module:stateless true

use crate::runner::{CellKey, FailureKind};
use serde::{Deserialize, Serialize};

/// @ai:intent What the aggregator needs to know about a variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantInfo {
    pub origin: String,
    /// Provider affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl VariantInfo {
    /// @ai:intent Whether the variant was written or optimized for `provider_id`
    /// @ai:effects pure
    pub fn has_affinity(&self, provider_id: &str) -> bool {
        self.provider.as_deref() == Some(provider_id)
    }
}

/// @ai:intent Statistics over a set of cells
/// @ai:post pass_rate and mean_score are None when no cell produced a decisive verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub count: u32,
    pub succeeded: u32,
    pub failure_count: u32,
    pub inconclusive_count: u32,
    pub passed: u32,
    pub pass_rate: Option<f64>,
    pub mean_score: Option<f64>,
    pub mean_latency_ms: Option<f64>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
}

impl GroupStats {
    /// Cells that received a pass/fail verdict
    pub fn graded(&self) -> u32 {
        self.succeeded - self.inconclusive_count
    }
}

/// @ai:intent Statistics for one (variant, provider) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub variant: String,
    pub provider: String,
    /// The variant was written or optimized for this provider
    #[serde(default)]
    pub affinity: bool,
    #[serde(flatten)]
    pub stats: GroupStats,
}

/// @ai:intent Statistics for one variant across every provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSummary {
    pub variant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub stats: GroupStats,
}

/// @ai:intent Baseline vs optimized pass rates on one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginComparison {
    pub provider: String,
    pub baseline_pass_rate: Option<f64>,
    pub optimized_pass_rate: Option<f64>,
    /// optimized - baseline, None when either side is undefined
    pub delta: Option<f64>,
}

impl OriginComparison {
    /// @ai:effects pure
    pub fn new(provider: &str, baseline: Option<f64>, optimized: Option<f64>) -> Self {
        Self {
            provider: provider.to_string(),
            baseline_pass_rate: baseline,
            optimized_pass_rate: optimized,
            delta: baseline.zip(optimized).map(|(b, o)| o - b),
        }
    }
}

/// @ai:intent One failed cell, listed for triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub key: CellKey,
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
}

/// @ai:intent Aggregated view of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub total_cells: u32,
    /// Sorted by (variant, provider)
    pub groups: Vec<GroupSummary>,
    pub by_variant: Vec<VariantSummary>,
    #[serde(default)]
    pub origin_comparison: Vec<OriginComparison>,
    pub failures: Vec<FailureEntry>,
}

impl SummaryReport {
    pub fn group(&self, variant: &str, provider: &str) -> Option<&GroupSummary> {
        self.groups
            .iter()
            .find(|g| g.variant == variant && g.provider == provider)
    }
}
