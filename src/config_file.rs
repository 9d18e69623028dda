//! `.sisyphus/config.yaml` profile loader (§6 external interfaces).
//!
//! Grounded on the teacher's `TestConfigManager` (`config.rs`),
//! which discovered scenario files under a handful of conventional
//! directories and loaded them with `serde_yaml`; this applies the
//! same "load, then let the CLI override fields" composition to a
//! single sidecar profile file instead of a scenario tree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileFile {
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl ProfileFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| crate::error::EngineError::FileNotFound(path.display().to_string()))?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Resolve the profile to apply: an explicit `--profile` override
    /// wins, otherwise the file's own `active_profile`.
    pub fn resolve<'a>(&'a self, override_name: Option<&str>) -> Option<&'a Profile> {
        let name = override_name.or(self.active_profile.as_deref())?;
        self.profiles.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn resolves_active_profile_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
active_profile: staging
profiles:
  staging:
    base_url: https://staging.example.com
  prod:
    base_url: https://example.com
"#,
        );
        let file = ProfileFile::load(&path).unwrap();
        let profile = file.resolve(None).unwrap();
        assert_eq!(profile.base_url.as_deref(), Some("https://staging.example.com"));
    }

    #[test]
    fn explicit_override_wins_over_active_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
active_profile: staging
profiles:
  staging:
    base_url: https://staging.example.com
  prod:
    base_url: https://example.com
"#,
        );
        let file = ProfileFile::load(&path).unwrap();
        let profile = file.resolve(Some("prod")).unwrap();
        assert_eq!(profile.base_url.as_deref(), Some("https://example.com"));
    }

    #[test]
    fn missing_file_errors() {
        let result = ProfileFile::load(Path::new("/nonexistent/config.yaml"));
        assert!(result.is_err());
    }
}
