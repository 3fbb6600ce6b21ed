use anyhow::Result;
use clap::{Parser, Subcommand};
use relayer_core::{relayer::Relayer, Config};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and summarize a configuration file
    ValidateConfig {
        /// Path to the configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Start the relayer
    Start {
        /// Path to the configuration file
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            info!("Validating config file: {:?}", config);
            let config = Config::load(config)?;
            println!("Config file is valid!");
            println!("- Source: {} ({}) at {}", config.source.name, config.source.id, config.source.rpc_url);
            println!(
                "- Destination: {} ({}) at {}",
                config.destination.name, config.destination.id, config.destination.rpc_url
            );
            println!("- Relayer: {} ({})", config.relayer.name, config.relayer.address);
            println!(
                "  - Quorum: {} of {} relayers",
                config.relayer.quorum,
                config.relayer.relayers.len()
            );
            println!("  - Leader interval: {}s", config.relayer.leader_interval_secs);
            println!("  - Step interval: {}ms", config.relayer.step_interval_millis);
            println!("  - Step durations:");
            let mut durations: Vec<_> = config.relayer.step_durations_millis.iter().collect();
            durations.sort();
            for (step, millis) in durations {
                println!("    - {}: {}ms", step, millis);
            }
            if let Some(path) = &config.relayer.status_file {
                println!("  - Status file: {:?}", path);
            }
            Ok(())
        }
        Commands::Start { config } => {
            info!("Starting relayer with config file: {:?}", config);

            let config = Config::load(config)?;
            let relayer = Relayer::new(config).await?;
            info!("Relayer initialized, running until ctrl-c");

            if let Err(e) = relayer.start(shutdown_signal()).await {
                error!("Relayer stopped with an error: {}", e);
                return Err(e.into());
            }

            Ok(())
        }
    }
}
