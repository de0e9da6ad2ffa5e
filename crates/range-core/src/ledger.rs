//! Persisted result of prior runs.
//!
//! One YAML file per range (`.range/ledger.yaml`) recording, for each
//! challenge that deployed successfully, the signature of the inputs it was
//! applied with and the outputs it produced. The orchestrator consults it
//! for the opt-in skip/reuse fast path; `status` and `output` read it
//! offline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::io::atomic_write;
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// SHA-256 over the canonical JSON of the resolved inputs.
    pub signature: String,
    pub outputs: BTreeMap<String, Value>,
    pub deployed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, LedgerEntry>,
}

fn default_version() -> u32 {
    1
}

impl Ledger {
    /// Load the ledger, treating a missing file as empty.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::ledger_path(root);
        if !path.exists() {
            return Ok(Self {
                version: 1,
                entries: BTreeMap::new(),
            });
        }
        let data = std::fs::read_to_string(&path)?;
        let ledger: Ledger = serde_yaml::from_str(&data)?;
        Ok(ledger)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(&paths::ledger_path(root), data.as_bytes())
    }

    pub fn entry(&self, unit: &str) -> Option<&LedgerEntry> {
        self.entries.get(unit)
    }

    pub fn record_deploy(
        &mut self,
        unit: &str,
        signature: String,
        outputs: BTreeMap<String, Value>,
    ) {
        self.entries.insert(
            unit.to_string(),
            LedgerEntry {
                signature,
                outputs,
                deployed_at: Utc::now(),
            },
        );
    }

    pub fn record_destroy(&mut self, unit: &str) {
        self.entries.remove(unit);
    }

    /// Ids of every challenge recorded as deployed, sorted.
    pub fn deployed_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Signature of a resolved input set: SHA-256 over its canonical JSON.
/// `BTreeMap` keys are already sorted, so equal inputs always serialize
/// identically.
pub fn input_signature(inputs: &BTreeMap<String, Value>) -> String {
    let canonical = serde_json::to_vec(inputs).expect("BTreeMap of JSON values serializes");
    let digest = Sha256::digest(&canonical);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::load(dir.path()).unwrap();
        assert!(ledger.entries.is_empty());
    }

    #[test]
    fn round_trip_preserves_entries() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path()).unwrap();
        let outputs = BTreeMap::from([("vpc_id".to_string(), json!("vpc-1"))]);
        ledger.record_deploy("net", "sig-1".into(), outputs.clone());
        ledger.save(dir.path()).unwrap();

        let loaded = Ledger::load(dir.path()).unwrap();
        let entry = loaded.entry("net").unwrap();
        assert_eq!(entry.signature, "sig-1");
        assert_eq!(entry.outputs, outputs);
        assert_eq!(loaded.deployed_ids(), vec!["net"]);
    }

    #[test]
    fn destroy_removes_entry() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path()).unwrap();
        ledger.record_deploy("net", "sig".into(), BTreeMap::new());
        ledger.record_destroy("net");
        assert!(ledger.entry("net").is_none());
        ledger.save(dir.path()).unwrap();
        assert!(Ledger::load(dir.path()).unwrap().entries.is_empty());
    }

    #[test]
    fn signature_is_stable_and_input_sensitive() {
        let a = BTreeMap::from([
            ("region".to_string(), json!("us-east-1")),
            ("port".to_string(), json!(443)),
        ]);
        let b = a.clone();
        assert_eq!(input_signature(&a), input_signature(&b));

        let mut c = a.clone();
        c.insert("port".to_string(), json!(8443));
        assert_ne!(input_signature(&a), input_signature(&c));
    }
}
