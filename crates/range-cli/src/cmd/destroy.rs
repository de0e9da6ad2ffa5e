use crate::cmd::common;
use crate::output::print_json;
use anyhow::bail;
use range_core::credentials::Credentials;
use range_core::ledger::Ledger;
use range_core::report::RunMode;
use std::io::Write;
use std::path::Path;

pub fn run(
    root: &Path,
    challenge: Option<&str>,
    all: bool,
    yes: bool,
    json: bool,
) -> anyhow::Result<i32> {
    let config = common::load_validated_config(root)?;
    let mut ledger = Ledger::load(root)?;

    let targets: Vec<String> = if all {
        ledger.deployed_ids()
    } else if let Some(id) = challenge {
        if config.challenge(id).is_none() {
            bail!("challenge not found: {id}");
        }
        vec![id.to_string()]
    } else {
        bail!("specify a challenge or --all");
    };
    if targets.is_empty() {
        println!("No deployed challenges found");
        return Ok(0);
    }

    if all && !yes && !confirm(targets.len())? {
        println!("Operation cancelled");
        return Ok(1);
    }

    let creds = Credentials::load(root)?;
    common::ensure_environment(&config, &creds, &targets)?;
    let orchestrator = common::build_orchestrator(&config, &creds, root)?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let opts = common::run_options(&config, None, None, false);
        orchestrator
            .run(RunMode::Destroy, &targets, &mut ledger, &opts)
            .await
    })?;
    ledger.save(root)?;

    if json {
        print_json(&report)?;
    } else {
        common::print_run_summary(&report);
    }

    Ok(if report.succeeded() { 0 } else { 1 })
}

fn confirm(count: usize) -> anyhow::Result<bool> {
    print!("This will destroy all {count} deployed challenges. Continue? (yes/no): ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
