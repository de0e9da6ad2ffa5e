use crate::cmd::common;
use crate::output::print_json;
use anyhow::bail;
use range_core::credentials::Credentials;
use range_core::ledger::Ledger;
use range_core::report::RunMode;
use range_core::unit::Provider;
use std::path::Path;

#[allow(clippy::too_many_arguments)]
pub fn run(
    root: &Path,
    challenge: Option<&str>,
    all: bool,
    provider: Option<Provider>,
    concurrency: Option<usize>,
    reuse: bool,
    timeout_minutes: Option<u64>,
    json: bool,
) -> anyhow::Result<i32> {
    let config = common::load_validated_config(root)?;

    let targets: Vec<String> = if all {
        config.challenge_ids()
    } else if let Some(p) = provider {
        config
            .challenges
            .iter()
            .filter(|c| c.provider == p)
            .map(|c| c.id.clone())
            .collect()
    } else if let Some(id) = challenge {
        if config.challenge(id).is_none() {
            bail!("challenge not found: {id}");
        }
        vec![id.to_string()]
    } else {
        bail!("specify a challenge, --all, or --provider");
    };
    if targets.is_empty() {
        println!("Nothing to deploy");
        return Ok(0);
    }

    let creds = Credentials::load(root)?;
    common::ensure_environment(&config, &creds, &targets)?;
    let orchestrator = common::build_orchestrator(&config, &creds, root)?;
    let mut ledger = Ledger::load(root)?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let opts = common::run_options(&config, concurrency, timeout_minutes, reuse);
        orchestrator
            .run(RunMode::Deploy, &targets, &mut ledger, &opts)
            .await
    })?;
    ledger.save(root)?;

    if json {
        print_json(&report)?;
    } else {
        common::print_run_summary(&report);
        if report.succeeded() {
            println!("\nAll challenges deployed. Outputs: rangectl output <challenge>");
        }
    }

    Ok(if report.succeeded() { 0 } else { 1 })
}
