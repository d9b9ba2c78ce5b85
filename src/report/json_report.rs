//! @ai:module:intent JSON report generation
//! @ai:module:layer infrastructure
//! @ai:module:public_api JsonReporter
//! @ai:module:stateless true

use crate::report::RunReport;
use anyhow::{Context, Result};
use std::path::Path;

/// @ai:intent Trait for JSON report generation
pub trait JsonReporterTrait: Send + Sync {
    /// @ai:intent Generate JSON report from a run
    fn generate(&self, report: &RunReport, output_path: &Path) -> Result<()>;
}

/// @ai:intent Generates results.json, the machine-readable record of a run
pub struct JsonReporter;

impl JsonReporter {
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonReporterTrait for JsonReporter {
    /// @ai:intent Generate JSON report to file
    /// @ai:effects fs:write
    fn generate(&self, report: &RunReport, output_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;
    use tempfile::TempDir;

    #[test]
    fn test_generate_json_report() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("results.json");

        JsonReporter::new().generate(&sample_report(), &output).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(value["configPath"], "bench.toml");
        assert_eq!(value["summary"]["totalCells"], 3);
        assert_eq!(value["results"][0]["verdict"]["outcome"], "pass");
        assert_eq!(value["summary"]["groups"][0]["passRate"], 0.5);
    }
}
