//! @ai:module:intent Persisted run report and its JSON / Markdown renderings
//! @ai:module:layer infrastructure
//! @ai:module:public_api RunReport, ReportGenerator, JsonReporter, MarkdownReporter

pub mod json_report;
pub mod markdown_report;

pub use json_report::{JsonReporter, JsonReporterTrait};
pub use markdown_report::{format_rate, MarkdownReporter, MarkdownReporterTrait};

use crate::metrics::{ResultAggregator, ResultAggregatorTrait, SummaryReport, VariantInfo};
use crate::runner::{RunOutcome, ScoredResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// @ai:intent Everything written for one run: metadata, summary and every scored cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub cancelled: bool,
    pub dispatched: usize,
    pub undispatched: usize,
    /// Kept so saved results can be re-aggregated
    #[serde(default)]
    pub variants: BTreeMap<String, VariantInfo>,
    #[serde(default)]
    pub providers: Vec<String>,
    pub summary: SummaryReport,
    pub results: Vec<ScoredResult>,
}

impl RunReport {
    /// @ai:intent Aggregate results and attach run metadata
    /// @ai:post results are sorted by cell key
    /// @ai:effects pure
    pub fn new(
        timestamp: String,
        config_path: Option<String>,
        outcome: &RunOutcome,
        aggregator: &ResultAggregator,
        mut results: Vec<ScoredResult>,
    ) -> Self {
        results.sort_by(|a, b| a.key.cmp(&b.key));

        Self {
            timestamp,
            config_path,
            cancelled: outcome.cancelled,
            dispatched: outcome.dispatched,
            undispatched: outcome.undispatched,
            variants: aggregator.variants().clone(),
            providers: aggregator.providers().to_vec(),
            summary: aggregator.aggregate(&results),
            results,
        }
    }

    /// @ai:intent Read a previously written results.json
    /// @ai:effects fs:read
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read results file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse results file {}", path.display()))
    }

    /// @ai:intent Recompute the summary from the stored results
    /// @ai:effects pure
    pub fn reaggregate(&mut self) {
        let aggregator =
            ResultAggregator::with_variants(self.variants.clone()).with_providers(self.providers.clone());
        self.summary = aggregator.aggregate(&self.results);
    }
}

/// @ai:intent Combined report generator
pub struct ReportGenerator {
    json: JsonReporter,
    markdown: MarkdownReporter,
}

impl ReportGenerator {
    /// @ai:intent Create a new report generator
    /// @ai:effects pure
    pub fn new() -> Self {
        Self {
            json: JsonReporter::new(),
            markdown: MarkdownReporter::new(),
        }
    }

    /// @ai:intent Write results.json and results.md
    /// @ai:effects fs:write
    pub fn generate_all(&self, report: &RunReport, output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        self.json.generate(report, &output_dir.join("results.json"))?;
        self.markdown.generate(report, &output_dir.join("results.md"))?;

        tracing::info!("Reports generated in {}", output_dir.display());
        Ok(())
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}
