// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BFT-SH-DID Node
//!
//! Entry point for the `bftdid-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and dispatches to a subcommand:
//!
//! - `simulate` — run Byzantine recovery trials against the recovery core
//! - `keygen`   — generate a watcher or controller keypair
//! - `digest`   — print the proposal digest watchers sign
//! - `version`  — print build version information

mod cli;
mod logging;
mod metrics;
mod simulation;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::Path;

use bftdid_contracts::RecoveryProposal;
use bftdid_protocol::config::{network_id_by_name, network_name, RegistryConfig};
use bftdid_protocol::crypto::Keypair;
use bftdid_protocol::identity::{DidId, DocRef, Identity};
use bftdid_protocol::storage::{MemoryStore, RecoveryStore, SledStore};

use cli::{BftDidCli, Commands, RegistryArgs, ReportFormat};
use logging::{LogFormat, DEFAULT_DIRECTIVES};
use metrics::NodeMetrics;
use simulation::{SimulationPlan, SimulationReport, Simulator};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BftDidCli::parse();
    logging::init_logging(DEFAULT_DIRECTIVES, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Simulate(args) => simulate(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Digest(args) => digest(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Builds the registry configuration: JSON file (if any), then overrides.
fn load_registry_config(args: &RegistryArgs) -> Result<RegistryConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            RegistryConfig::from_json(&json)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => RegistryConfig::default(),
    };

    if let Some(name) = &args.network {
        config.network_id =
            network_id_by_name(name).ok_or_else(|| anyhow!("unknown network: {name}"))?;
    }
    if let Some(id) = &args.registry_id {
        let bytes = hex::decode(id.trim_start_matches("0x")).context("registry id is not hex")?;
        config.registry_id = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("registry id must be 32 bytes, got {}", b.len()))?;
    }
    if let Some(max) = args.max_committee_size {
        config.max_committee_size = max;
    }

    config.validate().context("invalid registry configuration")?;
    Ok(config)
}

/// Runs the simulation plan and prints the report. Fails if any cell saw
/// an outcome the recovery rules do not allow.
async fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let config = load_registry_config(&args.registry)?;
    let metrics = NodeMetrics::new().context("failed to register metrics")?;
    let plan = SimulationPlan {
        behaviors: args.behaviors,
        faults: args.faults,
        trials: args.trials,
        racers: args.racers,
    };

    tracing::info!(
        network = network_name(config.network_id).unwrap_or("unknown"),
        behaviors = ?plan.behaviors,
        faults = ?plan.faults,
        trials = plan.trials,
        persistent = args.data_dir.is_some(),
        "starting recovery simulation"
    );

    let report = match &args.data_dir {
        Some(data_dir) => {
            let db_path = data_dir.join("db");
            std::fs::create_dir_all(&db_path).with_context(|| {
                format!("failed to create database directory: {}", db_path.display())
            })?;
            let store = SledStore::open(&db_path)
                .with_context(|| format!("failed to open database at {}", db_path.display()))?;
            tracing::info!(path = %db_path.display(), "database opened");
            run_simulation(store, config, metrics.clone(), &plan).await?
        }
        None => run_simulation(MemoryStore::new(), config, metrics.clone(), &plan).await?,
    };

    match args.output {
        ReportFormat::Pretty => report.print_summary(),
        ReportFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to encode report")?
        ),
    }
    if args.metrics {
        print!("{}", metrics.encode().context("failed to encode metrics")?);
    }

    if !report.passed() {
        anyhow::bail!("{} simulation cell(s) saw unexpected outcomes", report.failures());
    }
    Ok(())
}

async fn run_simulation<S: RecoveryStore + 'static>(
    store: S,
    config: RegistryConfig,
    metrics: NodeMetrics,
    plan: &SimulationPlan,
) -> Result<SimulationReport> {
    let simulator = Simulator::new(store, config, metrics).context("invalid registry configuration")?;
    let report = simulator.run(plan).await?;
    simulator
        .authority()
        .store()
        .flush()
        .context("failed to flush store")?;
    Ok(report)
}

fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = Keypair::generate();
    let identity = keypair.identity();

    match &args.out {
        Some(path) => {
            write_secret_key(path, &keypair)?;
            tracing::info!(%identity, key_path = %path.display(), "keypair generated");
            println!("Identity   : {}", identity.to_hex());
            println!("Secret key : {}", path.display());
        }
        None => {
            println!("Identity   : {}", identity.to_hex());
            println!("Secret key : {}", hex::encode(keypair.secret_key_bytes()));
        }
    }
    Ok(())
}

fn write_secret_key(path: &Path, keypair: &Keypair) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    // Owner-only from the moment it exists.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).with_context(|| {
        format!("failed to create key file {} (it must not exist yet)", path.display())
    })?;
    file.write_all(hex::encode(keypair.secret_key_bytes()).as_bytes())
        .with_context(|| format!("failed to write secret key to {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    Ok(())
}

fn digest(args: cli::DigestArgs) -> Result<()> {
    let config = load_registry_config(&args.registry)?;
    let proposal = proposal_from_args(&args)?;
    println!("{}", hex::encode(proposal.digest(&config.domain())));
    Ok(())
}

fn proposal_from_args(args: &cli::DigestArgs) -> Result<RecoveryProposal> {
    let did = if args.did.starts_with("did:") {
        DidId::from_did_string(&args.did)
    } else {
        DidId::from_hex(&args.did)
    }
    .with_context(|| format!("invalid DID: {}", args.did))?;

    Ok(RecoveryProposal {
        did,
        new_doc_ref: DocRef::from_hex(&args.new_doc_ref).context("invalid document reference")?,
        new_controller: Identity::from_hex(&args.new_controller)
            .context("invalid controller identity")?,
        nonce: args.nonce,
        epoch: args.epoch,
    })
}

fn print_version() {
    println!("bftdid-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", bftdid_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
