use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Outputs recorded for deployed challenges, shared across workers.
///
/// Entries are written whole, once per challenge per run (a redeploy
/// replaces the entry atomically). Readers never block each other, and a
/// reader only ever sees a complete entry.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    inner: Arc<RwLock<HashMap<String, BTreeMap<String, Value>>>>,
}

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the full output set for a challenge, replacing any prior entry.
    pub fn record(&self, unit: &str, outputs: BTreeMap<String, Value>) {
        let mut guard = self.inner.write().expect("output store lock poisoned");
        guard.insert(unit.to_string(), outputs);
    }

    /// One output value, if the challenge has deployed and produced it.
    pub fn value(&self, unit: &str, output: &str) -> Option<Value> {
        let guard = self.inner.read().expect("output store lock poisoned");
        guard.get(unit).and_then(|m| m.get(output)).cloned()
    }

    /// Whether any entry exists for the challenge.
    pub fn contains(&self, unit: &str) -> bool {
        let guard = self.inner.read().expect("output store lock poisoned");
        guard.contains_key(unit)
    }

    /// The challenge's full output map.
    pub fn outputs(&self, unit: &str) -> Option<BTreeMap<String, Value>> {
        let guard = self.inner.read().expect("output store lock poisoned");
        guard.get(unit).cloned()
    }

    /// Everything recorded so far, for the run report.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        let guard = self.inner.read().expect("output store lock poisoned");
        guard
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
