//! @ai:module:intent Load extra test cases from a directory of case files
//! @ai:module:layer infrastructure
//! @ai:module:public_api CaseDirLoader
//! @ai:module:stateless true

use crate::config::ConfigFormat;
use crate::corpus::case::TestCase;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// @ai:intent Raw structure of a case file: a top-level `cases` list
#[derive(Debug, Deserialize)]
struct CaseFile {
    #[serde(default)]
    cases: Vec<TestCase>,
}

/// @ai:intent Loads case files (TOML, JSON or YAML) found under a directory
pub struct CaseDirLoader;

impl CaseDirLoader {
    /// @ai:intent Find all recognised case files, sorted by path
    /// @ai:effects fs:read
    fn find_case_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| ConfigFormat::from_path(e.path()).is_ok())
            .map(|e| e.path().to_path_buf())
            .collect();

        files.sort();
        files
    }

    /// @ai:intent Load every case under `dir`, sorted by id
    /// @ai:pre dir exists
    /// @ai:effects fs:read
    pub fn load(dir: &Path) -> Result<Vec<TestCase>, ConfigError> {
        if !dir.is_dir() {
            return Err(ConfigError::InvalidValue {
                field: "casesDir",
                message: format!("{} is not a directory", dir.display()),
            });
        }

        let mut cases = Vec::new();

        for path in Self::find_case_files(dir) {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let file: CaseFile = ConfigFormat::from_path(&path)?.parse(&content, &path)?;

            tracing::debug!("Loaded {} cases from {}", file.cases.len(), path.display());
            cases.extend(file.cases);
        }

        cases.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_mixed_formats_sorted_by_id() {
        let temp = TempDir::new().unwrap();
        write(
            temp.path(),
            "geo.toml",
            r#"
[[cases]]
id = "zz-capital"
expected = "Paris"
input = { question = "Capital of France?" }
"#,
        );
        write(
            temp.path(),
            "nested/lit.json",
            r#"{"cases": [{"id": "aa-author", "expected": "Shakespeare", "input": {"question": "Who wrote Hamlet?"}}]}"#,
        );
        write(temp.path(), "notes.txt", "ignored");

        let cases = CaseDirLoader::load(temp.path()).unwrap();
        let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["aa-author", "zz-capital"]);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "bad.yaml", "cases:\n  - expected: no-id\n");

        let err = CaseDirLoader::load(temp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_dir() {
        let err = CaseDirLoader::load(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "casesDir", .. }));
    }
}
