mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use range_core::unit::{Difficulty, Provider};
use range_core::RangeError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rangectl",
    about = "Deploy and manage Terraform-based CTF range challenges across AWS, Azure, and GCP",
    version,
    propagate_version = true
)]
struct Cli {
    /// Range root (default: auto-detect from range.yaml or .git/)
    #[arg(long, global = true, env = "RANGECTL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered challenges
    List {
        /// Filter by cloud provider (aws, azure, gcp)
        #[arg(long)]
        provider: Option<Provider>,

        /// Filter by difficulty (basic, intermediate, advanced)
        #[arg(long)]
        difficulty: Option<Difficulty>,

        /// Show directories, dependencies, and tags
        #[arg(long)]
        details: bool,
    },

    /// Deploy challenges in dependency order
    Deploy {
        /// Challenge to deploy (its dependencies come along)
        #[arg(conflicts_with_all = ["all", "provider"])]
        challenge: Option<String>,

        /// Deploy every registered challenge
        #[arg(long)]
        all: bool,

        /// Deploy every challenge of one provider
        #[arg(long, conflicts_with = "all")]
        provider: Option<Provider>,

        /// Parallel workers per batch (default: settings.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Reuse recorded outputs when inputs are unchanged
        #[arg(long)]
        reuse: bool,

        /// Per-challenge timeout in minutes (default: settings.unit_timeout_minutes)
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },

    /// Destroy challenges in reverse dependency order
    Destroy {
        /// Challenge to destroy (deployed dependents come along)
        #[arg(conflicts_with = "all")]
        challenge: Option<String>,

        /// Destroy every deployed challenge
        #[arg(long)]
        all: bool,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show deployment state
    Status {
        /// Show one challenge only
        challenge: Option<String>,
    },

    /// Show the recorded outputs of a deployed challenge
    Output { challenge: String },

    /// Validate configuration, graph, and environment without deploying
    Check,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Deploy { .. } | Commands::Destroy { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::List {
            provider,
            difficulty,
            details,
        } => cmd::list::run(&root, provider, difficulty, details, cli.json),
        Commands::Deploy {
            challenge,
            all,
            provider,
            concurrency,
            reuse,
            timeout_minutes,
        } => cmd::deploy::run(
            &root,
            challenge.as_deref(),
            all,
            provider,
            concurrency,
            reuse,
            timeout_minutes,
            cli.json,
        ),
        Commands::Destroy {
            challenge,
            all,
            yes,
        } => cmd::destroy::run(&root, challenge.as_deref(), all, yes, cli.json),
        Commands::Status { challenge } => cmd::status::run(&root, challenge.as_deref(), cli.json),
        Commands::Output { challenge } => cmd::output::run(&root, &challenge, cli.json),
        Commands::Check => cmd::check::run(&root, cli.json),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(exit_code(&e));
        }
    }
}

/// Structural and configuration errors exit 2; everything else (partial
/// failures, unknown challenge, I/O trouble) exits 1.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<RangeError>() {
        Some(
            RangeError::Cycle { .. }
            | RangeError::UnknownReference { .. }
            | RangeError::DuplicateChallenge(_)
            | RangeError::NotARoot
            | RangeError::InvalidProvider(_)
            | RangeError::InvalidDifficulty(_)
            | RangeError::InvalidConfig(_)
            | RangeError::EnvironmentNotReady(_)
            | RangeError::Yaml(_),
        ) => 2,
        _ => 1,
    }
}
