use clap::{Parser, Subcommand, ValueEnum};
use rallypoint_cli::{simulation, CliError, LogConfig, Result, SimulationOptions};
use rallypoint_core::Lobby;
use rallypoint_session::SessionConfig;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "rallypoint")]
#[command(version, about = "Rallypoint - lobby sessions with relay authorization")]
struct Cli {
    /// Verbose human-readable logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full lobby session against in-memory collaborators
    Simulate {
        /// Number of clients joining the host
        #[arg(short, long, default_value_t = 2)]
        clients: usize,

        /// Hand the lobby to a client when the host leaves
        #[arg(long)]
        host_migration: bool,

        /// Session config as JSON (defaults to fast simulation timings)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the default session config as JSON
    Config,

    /// Print a JSON schema
    Schema {
        #[arg(value_enum, default_value_t = SchemaTarget::Config)]
        target: SchemaTarget,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemaTarget {
    Config,
    Lobby,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::dev()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if cli.json_logs {
        log_config = log_config.with_json();
    }
    log_config.init()?;

    match cli.command {
        Commands::Simulate {
            clients,
            host_migration,
            config,
        } => {
            let mut options = SimulationOptions::new(clients).with_host_migration(host_migration);
            if let Some(path) = config {
                options = options.with_config(load_config(&path)?);
            }

            let report = simulation::run(options).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&SessionConfig::default())?);
        }
        Commands::Schema { target } => {
            let schema = match target {
                SchemaTarget::Config => schemars::schema_for!(SessionConfig),
                SchemaTarget::Lobby => schemars::schema_for!(Lobby),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path)?;
    let config = SessionConfig::from_json(&raw)?;
    config.validate()?;

    info!(path = %path.display(), "📄 Loaded session config");
    Ok(config)
}
