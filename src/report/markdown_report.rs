//! @ai:module:intent Markdown report generation
//! @ai:module:layer infrastructure
//! @ai:module:public_api MarkdownReporter
//! @ai:module:stateless true

use crate::metrics::GroupStats;
use crate::report::RunReport;
use anyhow::{Context, Result};
use std::fmt::{self, Write as FmtWrite};
use std::path::Path;

/// @ai:intent Trait for Markdown report generation
pub trait MarkdownReporterTrait: Send + Sync {
    /// @ai:intent Generate Markdown report from a run
    fn generate(&self, report: &RunReport, output_path: &Path) -> Result<()>;
}

/// @ai:intent Generates results.md, a human-readable summary of a run
pub struct MarkdownReporter;

/// @ai:intent Render an optional ratio as a percentage, `n/a` when undefined
/// @ai:effects pure
pub fn format_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{:.1}%", r * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

impl MarkdownReporter {
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Format a delta value with sign
    /// @ai:effects pure
    fn format_delta(value: Option<f64>) -> String {
        match value {
            Some(v) if v >= 0.0 => format!("+{:.1}%", v * 100.0),
            Some(v) => format!("{:.1}%", v * 100.0),
            None => "n/a".to_string(),
        }
    }

    fn format_score(score: Option<f64>) -> String {
        score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "n/a".to_string())
    }

    fn stats_cells(stats: &GroupStats) -> String {
        format!(
            "{} | {} | {} | {} | {} | {} | {} | {}/{}",
            stats.count,
            stats.succeeded,
            stats.failure_count,
            stats.inconclusive_count,
            format_rate(stats.pass_rate),
            Self::format_score(stats.mean_score),
            stats
                .mean_latency_ms
                .map(|l| format!("{:.0}ms", l))
                .unwrap_or_else(|| "n/a".to_string()),
            stats.total_input_tokens,
            stats.total_output_tokens
        )
    }

    /// @ai:intent Render the whole report
    /// @ai:effects pure
    pub fn render(report: &RunReport) -> Result<String, fmt::Error> {
        let mut output = String::new();
        Self::write_summary(&mut output, report)?;
        Self::write_groups(&mut output, report)?;
        Self::write_variants(&mut output, report)?;
        Self::write_origin_comparison(&mut output, report)?;
        Self::write_failures(&mut output, report)?;
        Ok(output)
    }

    fn write_summary(output: &mut String, report: &RunReport) -> fmt::Result {
        writeln!(output, "# Prompt Evaluation Results")?;
        writeln!(output)?;
        writeln!(output, "**Date:** {}", report.timestamp)?;
        if let Some(config) = &report.config_path {
            writeln!(output, "**Config:** {}", config)?;
        }
        writeln!(output, "**Cells:** {}", report.summary.total_cells)?;
        if report.cancelled {
            writeln!(
                output,
                "**Cancelled:** {} cell(s) were never dispatched",
                report.undispatched
            )?;
        }
        writeln!(output)
    }

    fn write_groups(output: &mut String, report: &RunReport) -> fmt::Result {
        writeln!(output, "## Results by Variant and Provider")?;
        writeln!(output)?;
        writeln!(
            output,
            "| Variant | Provider | Cells | Succeeded | Failed | Inconclusive | Pass Rate | Mean Score | Mean Latency | Tokens In/Out |"
        )?;
        writeln!(
            output,
            "|---------|----------|-------|-----------|--------|--------------|-----------|------------|--------------|---------------|"
        )?;
        for group in &report.summary.groups {
            writeln!(
                output,
                "| {} | {}{} | {} |",
                group.variant,
                group.provider,
                if group.affinity { " *" } else { "" },
                Self::stats_cells(&group.stats)
            )?;
        }
        writeln!(output)?;
        if report.summary.groups.iter().any(|g| g.affinity) {
            writeln!(output, "\\* provider the variant was written for")?;
            writeln!(output)?;
        }
        Ok(())
    }

    fn write_variants(output: &mut String, report: &RunReport) -> fmt::Result {
        writeln!(output, "## Results by Variant")?;
        writeln!(output)?;
        writeln!(
            output,
            "| Variant | Origin | Cells | Succeeded | Failed | Inconclusive | Pass Rate | Mean Score | Mean Latency | Tokens In/Out |"
        )?;
        writeln!(
            output,
            "|---------|--------|-------|-----------|--------|--------------|-----------|------------|--------------|---------------|"
        )?;
        for variant in &report.summary.by_variant {
            writeln!(
                output,
                "| {} | {} | {} |",
                variant.variant,
                variant.origin.as_deref().unwrap_or("-"),
                Self::stats_cells(&variant.stats)
            )?;
        }
        writeln!(output)
    }

    fn write_origin_comparison(output: &mut String, report: &RunReport) -> fmt::Result {
        if report.summary.origin_comparison.is_empty() {
            return Ok(());
        }

        writeln!(output, "## Baseline vs Optimized")?;
        writeln!(output)?;
        writeln!(output, "| Provider | Baseline | Optimized | Delta |")?;
        writeln!(output, "|----------|----------|-----------|-------|")?;
        for comparison in &report.summary.origin_comparison {
            writeln!(
                output,
                "| {} | {} | {} | {} |",
                comparison.provider,
                format_rate(comparison.baseline_pass_rate),
                format_rate(comparison.optimized_pass_rate),
                Self::format_delta(comparison.delta)
            )?;
        }
        writeln!(output)
    }

    fn write_failures(output: &mut String, report: &RunReport) -> fmt::Result {
        if report.summary.failures.is_empty() {
            return Ok(());
        }

        writeln!(output, "## Failures")?;
        writeln!(output)?;
        for failure in &report.summary.failures {
            writeln!(
                output,
                "- `{}` **{}** after {} attempt(s): {}",
                failure.key,
                failure.kind,
                failure.attempts,
                failure.message.replace('\n', " ")
            )?;
        }
        writeln!(output)
    }
}

impl Default for MarkdownReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownReporterTrait for MarkdownReporter {
    /// @ai:intent Generate Markdown report to file
    /// @ai:effects fs:write
    fn generate(&self, report: &RunReport, output_path: &Path) -> Result<()> {
        let content = Self::render(report).context("Failed to render Markdown report")?;
        std::fs::write(output_path, content)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }
}
