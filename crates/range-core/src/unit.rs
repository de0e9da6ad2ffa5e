use crate::value::RawValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Cloud platform a challenge deploys to. Carried through to credential
/// assembly; the orchestration engine itself never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = crate::error::RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "gcp" => Ok(Provider::Gcp),
            other => Err(crate::error::RangeError::InvalidProvider(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Basic => "basic",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = crate::error::RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Difficulty::Basic),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(crate::error::RangeError::InvalidDifficulty(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// One deployable challenge: a Terraform root directory plus the metadata
/// the engine needs to order and resolve it.
///
/// Immutable once registered; per-run lifecycle state lives in the
/// orchestrator, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub provider: Provider,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub description: String,
    /// Terraform working directory, relative to the range root.
    pub directory: PathBuf,
    /// Optional `-backend-config` file, relative to the range root.
    #[serde(default)]
    pub backend_config: Option<PathBuf>,
    /// Explicit ordering dependencies. Always create a deploy-before edge,
    /// even when no input references the dependency's outputs.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, RawValue>,
    /// Output names this challenge is expected to produce after deploy.
    /// Used by `check` validation, not by resolution.
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Challenge {
    /// Ids of every challenge this one depends on: explicit `depends_on`
    /// entries plus ids discovered in input placeholders, deduplicated,
    /// in first-seen order.
    pub fn dependency_ids(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for id in &self.depends_on {
            if !seen.contains(&id.as_str()) {
                seen.push(id.as_str());
            }
        }
        for value in self.inputs.values() {
            for r in value.refs() {
                if !seen.contains(&r.unit.as_str()) {
                    seen.push(r.unit.as_str());
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn challenge(yaml: &str) -> Challenge {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn dependency_ids_merge_declared_and_discovered() {
        let c = challenge(
            r#"
id: web-tier
provider: aws
directory: challenges/aws/web-tier
depends_on: [shared-network]
inputs:
  vpc_id: ${shared-network.vpc_id}
  db_host: ${db-tier.host}
"#,
        );
        assert_eq!(c.dependency_ids(), vec!["shared-network", "db-tier"]);
    }

    #[test]
    fn dependency_ids_dedup_declared_overlap() {
        let c = challenge(
            r#"
id: app
provider: gcp
directory: challenges/gcp/app
depends_on: [base, base]
inputs:
  project: ${base.project_id}
"#,
        );
        assert_eq!(c.dependency_ids(), vec!["base"]);
    }

    #[test]
    fn inputs_keep_native_literals() {
        let c = challenge(
            r#"
id: app
provider: azure
directory: challenges/azure/app
inputs:
  replicas: 3
  public: false
"#,
        );
        assert_eq!(
            c.inputs["replicas"],
            crate::value::RawValue::Literal(json!(3))
        );
        assert_eq!(
            c.inputs["public"],
            crate::value::RawValue::Literal(json!(false))
        );
    }
}
