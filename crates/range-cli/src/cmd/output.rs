use crate::output::{print_json, print_table};
use anyhow::bail;
use range_core::config::Config;
use range_core::ledger::Ledger;
use std::path::Path;

pub fn run(root: &Path, challenge: &str, json: bool) -> anyhow::Result<i32> {
    let config = Config::load(root)?;
    if config.challenge(challenge).is_none() {
        bail!("challenge not found: {challenge}");
    }

    let ledger = Ledger::load(root)?;
    let Some(entry) = ledger.entry(challenge) else {
        bail!("challenge '{challenge}' is not deployed");
    };

    if json {
        print_json(&entry.outputs)?;
        return Ok(0);
    }

    if entry.outputs.is_empty() {
        println!("No outputs recorded for '{challenge}'");
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = entry
        .outputs
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            vec![name.clone(), rendered]
        })
        .collect();
    print_table(&["OUTPUT", "VALUE"], rows);
    Ok(0)
}
