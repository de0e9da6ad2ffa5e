use crate::output::{print_json, print_table};
use anyhow::bail;
use range_core::config::Config;
use range_core::ledger::Ledger;
use std::collections::BTreeMap;
use std::path::Path;

pub fn run(root: &Path, challenge: Option<&str>, json: bool) -> anyhow::Result<i32> {
    let config = Config::load(root)?;
    let ledger = Ledger::load(root)?;

    let selected: Vec<_> = match challenge {
        Some(id) => match config.challenge(id) {
            Some(c) => vec![c],
            None => bail!("challenge not found: {id}"),
        },
        None => config.challenges.iter().collect(),
    };

    #[derive(serde::Serialize)]
    struct Entry<'a> {
        id: &'a str,
        provider: String,
        state: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        deployed_at: Option<chrono::DateTime<chrono::Utc>>,
        outputs: usize,
    }

    let entries: Vec<Entry> = selected
        .iter()
        .map(|c| {
            let entry = ledger.entry(&c.id);
            Entry {
                id: &c.id,
                provider: c.provider.to_string(),
                state: if entry.is_some() {
                    "deployed"
                } else {
                    "not deployed"
                },
                deployed_at: entry.map(|e| e.deployed_at),
                outputs: entry.map(|e| e.outputs.len()).unwrap_or(0),
            }
        })
        .collect();

    if json {
        print_json(&entries)?;
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.id.to_string(),
                e.provider.clone(),
                e.state.to_string(),
                e.deployed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_default(),
                if e.outputs > 0 {
                    e.outputs.to_string()
                } else {
                    String::new()
                },
            ]
        })
        .collect();
    print_table(
        &["CHALLENGE", "PROVIDER", "STATE", "DEPLOYED AT", "OUTPUTS"],
        rows,
    );

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for e in &entries {
        *counts.entry(e.state).or_insert(0) += 1;
    }
    let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}: {n}")).collect();
    println!("\n{}", summary.join(", "));

    Ok(0)
}
