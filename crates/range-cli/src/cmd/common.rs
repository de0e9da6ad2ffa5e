use anyhow::Context;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use range_core::config::{Config, WarnLevel};
use range_core::credentials::{self, Credentials};
use range_core::orchestrator::{Orchestrator, RunOptions};
use range_core::report::RunReport;
use range_core::unit::Provider;
use range_core::RangeError;
use terraform_agent::TerraformProvisioner;

use crate::output::print_table;

/// Load config and fail on error-level validation findings before a run.
pub fn load_validated_config(root: &Path) -> anyhow::Result<Config> {
    let config = Config::load(root)?;
    let errors: Vec<String> = config
        .validate(root)
        .into_iter()
        .filter(|w| w.level == WarnLevel::Error)
        .map(|w| w.message)
        .collect();
    if !errors.is_empty() {
        return Err(RangeError::InvalidConfig(errors.join("; ")).into());
    }
    Ok(config)
}

/// Check terraform and credentials for every provider the selected
/// challenges use. Aborts the run before any unit starts.
pub fn ensure_environment(
    config: &Config,
    creds: &Credentials,
    targets: &[String],
) -> anyhow::Result<()> {
    if credentials::terraform_binary().is_none() {
        return Err(RangeError::EnvironmentNotReady("terraform is not installed".into()).into());
    }

    let providers: BTreeSet<Provider> = targets
        .iter()
        .filter_map(|id| config.challenge(id))
        .map(|c| c.provider)
        .collect();

    let mut missing = Vec::new();
    for provider in providers {
        for item in creds.missing_for(provider) {
            missing.push(format!("{provider}: {item}"));
        }
    }
    if !missing.is_empty() {
        return Err(RangeError::EnvironmentNotReady(format!(
            "missing credentials: {}",
            missing.join(", ")
        ))
        .into());
    }
    Ok(())
}

/// Build the orchestrator against the real Terraform backend.
pub fn build_orchestrator(
    config: &Config,
    creds: &Credentials,
    root: &Path,
) -> anyhow::Result<Orchestrator> {
    let mut provisioner = TerraformProvisioner::new(creds.environment())
        .context("locating the terraform binary")?;
    for c in &config.challenges {
        if let Some(backend) = &c.backend_config {
            provisioner = provisioner.backend_config(&c.id, root.join(backend));
        }
    }
    let orchestrator = Orchestrator::new(
        config.challenges.clone(),
        Arc::new(provisioner),
        root,
    )?;
    Ok(orchestrator)
}

/// Run options from settings and flags, with ctrl-c wired to cancellation.
pub fn run_options(
    config: &Config,
    concurrency: Option<usize>,
    timeout_minutes: Option<u64>,
    reuse: bool,
) -> RunOptions {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });
    RunOptions {
        concurrency: concurrency.unwrap_or(config.settings.concurrency),
        unit_timeout: Some(Duration::from_secs(
            timeout_minutes.unwrap_or(config.settings.unit_timeout_minutes) * 60,
        )),
        reuse,
        cancel,
    }
}

/// Human-readable run summary: one row per unit plus state counts.
pub fn print_run_summary(report: &RunReport) {
    let rows: Vec<Vec<String>> = report
        .units
        .iter()
        .map(|u| {
            vec![
                u.id.clone(),
                u.state.to_string(),
                if u.reused { "yes".into() } else { String::new() },
                format!("{:.1}s", u.duration_secs),
                u.error.as_ref().map(|e| e.detail.clone()).unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["CHALLENGE", "STATE", "REUSED", "DURATION", "ERROR"], rows);

    let counts: Vec<String> = report
        .state_counts()
        .iter()
        .map(|(state, n)| format!("{state}: {n}"))
        .collect();
    println!("\n{} run {}: {}", report.mode, report.run_id, counts.join(", "));
}
