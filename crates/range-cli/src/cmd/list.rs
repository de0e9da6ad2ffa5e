use crate::output::{print_json, print_table};
use range_core::config::Config;
use range_core::ledger::Ledger;
use range_core::unit::{Challenge, Difficulty, Provider};
use std::path::Path;

pub fn run(
    root: &Path,
    provider: Option<Provider>,
    difficulty: Option<Difficulty>,
    details: bool,
    json: bool,
) -> anyhow::Result<i32> {
    let config = Config::load(root)?;
    let ledger = Ledger::load(root)?;

    let challenges: Vec<&Challenge> = config
        .challenges
        .iter()
        .filter(|c| provider.map_or(true, |p| c.provider == p))
        .filter(|c| difficulty.map_or(true, |d| c.difficulty == Some(d)))
        .collect();

    if json {
        #[derive(serde::Serialize)]
        struct Entry<'a> {
            id: &'a str,
            provider: Provider,
            difficulty: Option<Difficulty>,
            description: &'a str,
            deployed: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            directory: Option<String>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            depends_on: Vec<&'a str>,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            tags: Vec<&'a str>,
        }
        let entries: Vec<Entry> = challenges
            .iter()
            .map(|c| Entry {
                id: &c.id,
                provider: c.provider,
                difficulty: c.difficulty,
                description: &c.description,
                deployed: ledger.entry(&c.id).is_some(),
                directory: details.then(|| c.directory.display().to_string()),
                depends_on: if details {
                    c.dependency_ids()
                } else {
                    Vec::new()
                },
                tags: if details {
                    c.tags.iter().map(String::as_str).collect()
                } else {
                    Vec::new()
                },
            })
            .collect();
        print_json(&entries)?;
        return Ok(0);
    }

    if challenges.is_empty() {
        println!("No challenges match the given filters");
        return Ok(0);
    }

    let rows: Vec<Vec<String>> = challenges
        .iter()
        .map(|c| {
            vec![
                c.id.clone(),
                c.provider.to_string(),
                c.difficulty.map(|d| d.to_string()).unwrap_or_default(),
                if ledger.entry(&c.id).is_some() {
                    "deployed".into()
                } else {
                    "not deployed".into()
                },
                c.description.clone(),
            ]
        })
        .collect();
    print_table(
        &["CHALLENGE", "PROVIDER", "DIFFICULTY", "STATE", "DESCRIPTION"],
        rows,
    );

    if details {
        for c in &challenges {
            println!("\n{}:", c.id);
            println!("  directory: {}", c.directory.display());
            let deps = c.dependency_ids();
            if !deps.is_empty() {
                println!("  depends on: {}", deps.join(", "));
            }
            if !c.outputs.is_empty() {
                println!("  outputs: {}", c.outputs.join(", "));
            }
            if !c.tags.is_empty() {
                println!("  tags: {}", c.tags.join(", "));
            }
        }
    }

    Ok(0)
}
