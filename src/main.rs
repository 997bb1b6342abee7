//! LP Compounder - unattended yield-farm auto-compounder
//!
//! Run with: cargo run -- --config instances/tomb-ftm.toml [--config ...]
//!
//! Each configuration file is one instance: a liquidity pool staked in a
//! farm. Every instance runs on its own task, harvesting the farm's reward,
//! turning it back into LP tokens and re-depositing at the gas-optimal
//! interval.

use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod assets;
mod chain;
mod config;
mod error;
mod farm;
mod gas_oracle;
mod instance;
mod orchestrator;
mod pipeline;
mod position;
mod router;
mod scheduler;
mod shutdown;
mod state;
mod yield_model;

use config::Config;
use error::FatalError;
use instance::Instance;
use position::SnapshotBoard;
use scheduler::{format_countdown, Scheduler};
use shutdown::Terminate;

#[derive(Parser, Debug)]
#[command(name = "lp-compounder", version, about = "Auto-compound yield-farm LP positions")]
struct Cli {
    /// Instance configuration file (repeat for several instances)
    #[arg(short, long = "config", required = true)]
    configs: Vec<PathBuf>,

    /// Validate settings, wallet keys and LP pairs, then exit
    #[arg(long)]
    check: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🌾 LP COMPOUNDER - Yield Farm Auto-Compounder").cyan().bold());
    println!("{}", style("    Harvest | Top-up Gas | Re-add Liquidity | Re-stake").cyan());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn exit_fatal(err: &FatalError) -> ! {
    error!("{}", err);
    std::process::exit(err.exit_code());
}

fn print_final_summary(board: &SnapshotBoard) {
    println!();
    println!("{}", style("═══ SESSION SUMMARY ═══").blue().bold());
    for snapshot in board.all() {
        let apy = snapshot
            .yield_estimate
            .map(|y| format!("{:.2}% APY ({} compounds/yr)", y.optimal_apy_pct, y.compounds_per_year))
            .unwrap_or_else(|| "no estimate".to_string());
        println!(
            "  {} │ last cycle: {} ({}) │ {}",
            style(&snapshot.instance).bold(),
            snapshot.last_outcome.as_deref().unwrap_or("none"),
            format_countdown(std::time::Duration::from_secs_f64(snapshot.last_cycle_secs)),
            apy
        );
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lp_compounder=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    // Load every configuration before touching the chain
    let mut configs = Vec::new();
    let mut names = HashSet::new();
    for path in &cli.configs {
        let config = Config::from_file(path).unwrap_or_else(|e| exit_fatal(&e));
        if !names.insert(config.name.clone()) {
            exit_fatal(&FatalError::InvalidConfig(format!("instance name '{}' is used twice", config.name)));
        }
        config.print_summary();
        println!();
        configs.push(config);
    }

    let terminate = Terminate::new();
    let _ctrl_c = terminate.listen_for_ctrl_c();
    let board = Arc::new(SnapshotBoard::new());

    let mut instances = Vec::new();
    for config in configs {
        let span = info_span!("instance", name = %config.name);
        let instance = Instance::build(config, terminate.clone())
            .instrument(span)
            .await
            .unwrap_or_else(|e| exit_fatal(&e));
        instances.push(instance);
    }

    if cli.check {
        info!("✓ All {} instance(s) passed startup checks", instances.len());
        return Ok(());
    }

    let mut workers = JoinSet::new();
    for instance in instances {
        let name = instance.name().to_string();
        let span = info_span!("instance", name = %name);
        let state_path = instance.state_path();
        let timing = instance.timing();
        let scheduler = Scheduler::new(name, instance, timing, terminate.clone(), state_path, board.clone());
        workers.spawn(
            async move {
                let state = scheduler.compounder().initial_state();
                scheduler.run(state).await
            }
            .instrument(span),
        );
    }

    let mut exit_code = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(fatal)) => {
                error!("Stopping all instances: {}", fatal);
                terminate.trigger();
                exit_code.get_or_insert(fatal.exit_code());
            }
            Err(e) => error!("Instance worker failed: {}", e),
        }
    }

    print_final_summary(&board);
    if let Some(code) = exit_code {
        std::process::exit(code);
    }
    info!("All instances stopped");
    Ok(())
}
