//! pipeline-scheduler executable.

use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use pipeline_scheduler::{Scheduler, SchedulerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let matches = Command::new("pipeline-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scheduling and error-response engine fronting a pool of equivalent processing pipelines")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file path")
                .required(false),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("serve").about("Start the scheduler and block until shutdown"))
        .subcommand(Command::new("health").about("Load the config and report a vacuous health check"))
        .subcommand(Command::new("version").about("Show version information"))
        .get_matches();

    let config = load_config(matches.get_one::<String>("config"))?;

    match matches.subcommand() {
        Some(("health", _)) => {
            let scheduler = Scheduler::new(config);
            let status = scheduler.health_check().await;
            println!("overall: {:?}, pipelines: {}", status.overall_health, status.components.len());
        }
        Some(("version", _)) => {
            println!("pipeline-scheduler v{}", env!("CARGO_PKG_VERSION"));
        }
        _ => {
            let scheduler = Arc::new(Scheduler::new(config));
            scheduler.initialize().await?;
            info!("scheduler initialized with no pipelines registered; call create_pipeline via the library API to add one");

            tokio::signal::ctrl_c().await?;
            info!("received shutdown signal, shutting down");
            if let Err(err) = scheduler.shutdown().await {
                error!(%err, "error during shutdown");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline_scheduler=info,scheduler_core=info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<&String>) -> Result<SchedulerConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            info!(path, "loading configuration");
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => {
            info!("using default configuration");
            Ok(SchedulerConfig::default())
        }
    }
}
