use crate::error::{RangeError, Result};
use crate::paths;
use crate::unit::Challenge;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_unit_timeout_minutes")]
    pub unit_timeout_minutes: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_unit_timeout_minutes() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            unit_timeout_minutes: default_unit_timeout_minutes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Parsed `range.yaml`: orchestration settings plus the ordered challenge
/// registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(RangeError::NotARoot);
        }
        let data = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn challenge(&self, id: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.id == id)
    }

    pub fn challenge_ids(&self) -> Vec<String> {
        self.challenges.iter().map(|c| c.id.clone()).collect()
    }

    /// Structural checks that don't require building the graph: duplicate
    /// ids, self-references, missing directories, and references to outputs
    /// a dependency never declares.
    pub fn validate(&self, root: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for c in &self.challenges {
            if !seen.insert(c.id.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("duplicate challenge id: {}", c.id),
                });
            }

            if c.dependency_ids().contains(&c.id.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("challenge '{}' depends on itself", c.id),
                });
            }

            let dir = root.join(&c.directory);
            if !dir.is_dir() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "challenge '{}': directory not found: {}",
                        c.id,
                        dir.display()
                    ),
                });
            } else if !dir.join("main.tf").is_file() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("challenge '{}': no main.tf in {}", c.id, dir.display()),
                });
            }

            if let Some(backend) = &c.backend_config {
                if !root.join(backend).is_file() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!(
                            "challenge '{}': backend config not found: {}",
                            c.id,
                            backend.display()
                        ),
                    });
                }
            }

            for (input, raw) in &c.inputs {
                for r in raw.refs() {
                    let Some(dep) = self.challenge(&r.unit) else {
                        continue; // unknown id is a graph-build error
                    };
                    if !dep.outputs.is_empty() && !dep.outputs.contains(&r.output) {
                        warnings.push(ConfigWarning {
                            level: WarnLevel::Warning,
                            message: format!(
                                "challenge '{}': input '{}' references '{}' which '{}' does not declare",
                                c.id, input, r, r.unit
                            ),
                        });
                    }
                }
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, yaml: &str) {
        std::fs::write(dir.join("range.yaml"), yaml).unwrap();
    }

    #[test]
    fn missing_config_is_not_a_root() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(RangeError::NotARoot)
        ));
    }

    #[test]
    fn load_applies_settings_defaults() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
challenges:
  - id: solo
    provider: aws
    directory: challenges/solo
"#,
        );
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.settings.concurrency, 4);
        assert_eq!(config.settings.unit_timeout_minutes, 30);
        assert_eq!(config.challenge_ids(), vec!["solo"]);
    }

    #[test]
    fn validate_flags_duplicates_and_missing_dirs() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
challenges:
  - id: twin
    provider: aws
    directory: challenges/twin
  - id: twin
    provider: gcp
    directory: challenges/twin-2
"#,
        );
        let config = Config::load(dir.path()).unwrap();
        let warnings = config.validate(dir.path());
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("duplicate")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("directory not found")));
    }

    #[test]
    fn validate_flags_undeclared_output_reference() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("challenges/net")).unwrap();
        std::fs::create_dir_all(dir.path().join("challenges/app")).unwrap();
        std::fs::write(dir.path().join("challenges/net/main.tf"), "").unwrap();
        std::fs::write(dir.path().join("challenges/app/main.tf"), "").unwrap();
        write_config(
            dir.path(),
            r#"
challenges:
  - id: net
    provider: aws
    directory: challenges/net
    outputs: [vpc_id]
  - id: app
    provider: aws
    directory: challenges/app
    inputs:
      subnet: ${net.subnet_id}
"#,
        );
        let config = Config::load(dir.path()).unwrap();
        let warnings = config.validate(dir.path());
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("subnet_id")));
    }

    #[test]
    fn self_dependency_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_config(
            dir.path(),
            r#"
challenges:
  - id: loop
    provider: aws
    directory: challenges/loop
    depends_on: [loop]
"#,
        );
        let config = Config::load(dir.path()).unwrap();
        let warnings = config.validate(dir.path());
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("depends on itself")));
    }
}
