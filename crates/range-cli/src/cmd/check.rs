use crate::output::print_json;
use range_core::config::{Config, WarnLevel};
use range_core::credentials::{self, Credentials};
use range_core::graph::DependencyGraph;
use std::collections::BTreeSet;
use std::path::Path;

/// Structural validation with no deployment: config findings, graph build
/// (cycles, unknown references), and environment readiness.
pub fn run(root: &Path, json: bool) -> anyhow::Result<i32> {
    let config = Config::load(root)?;

    let mut warnings = config.validate(root);

    // Graph errors (cycle, unknown reference) are fatal and propagate.
    let graph = DependencyGraph::build(&config.challenges)?;

    if credentials::terraform_binary().is_none() {
        warnings.push(range_core::config::ConfigWarning {
            level: WarnLevel::Warning,
            message: "terraform is not installed".into(),
        });
    }
    let creds = Credentials::load(root)?;
    let providers: BTreeSet<_> = config.challenges.iter().map(|c| c.provider).collect();
    for provider in providers {
        for item in creds.missing_for(provider) {
            warnings.push(range_core::config::ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("{provider}: missing credentials: {item}"),
            });
        }
    }

    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();

    if json {
        #[derive(serde::Serialize)]
        struct CheckOutput<'a> {
            challenges: usize,
            deploy_order: Vec<Vec<String>>,
            warnings: &'a [range_core::config::ConfigWarning],
            ok: bool,
        }
        print_json(&CheckOutput {
            challenges: config.challenges.len(),
            deploy_order: graph.deploy_batches(),
            warnings: &warnings,
            ok: errors == 0,
        })?;
        return Ok(if errors == 0 { 0 } else { 2 });
    }

    println!("{} challenges registered", config.challenges.len());
    println!("deploy order:");
    for (i, batch) in graph.deploy_batches().iter().enumerate() {
        println!("  {}. {}", i + 1, batch.join(", "));
    }

    if warnings.is_empty() {
        println!("\nno findings");
        return Ok(0);
    }

    println!();
    for w in &warnings {
        let tag = match w.level {
            WarnLevel::Error => "error",
            WarnLevel::Warning => "warning",
        };
        println!("{tag}: {}", w.message);
    }

    Ok(if errors == 0 { 0 } else { 2 })
}
