mod config;
mod seed;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::PacerConfig;

/// Environment variable holding the log filter (`info`, `pacer_orchestrator=debug`, ...).
const LOG_ENV: &str = "PACER_LOG";

/// Campaign execution orchestrator.
#[derive(Parser)]
#[command(name = "pacer", version, about = "Campaign execution orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the reconciliation loop
    Serve {
        /// Path to pacer.toml (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
        /// JSON file of campaign records and guardrail rules to preload
        #[arg(long)]
        campaigns: Option<PathBuf>,
        /// Use scripted in-process vendors; no ad platform is contacted
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse and validate a config file, reporting every problem
    CheckConfig {
        /// Path to pacer.toml
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve {
            config,
            port,
            campaigns,
            dry_run,
        } => {
            let config = load_config(config.as_deref());
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            let options = serve::ServeOptions {
                config,
                port,
                campaigns,
                dry_run,
            };
            if let Err(e) = rt.block_on(serve::start_server(options)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::CheckConfig { file } => cmd_check_config(&file),
    }
}

/// Load, env-override and validate the config, exiting on any problem.
fn load_config(path: Option<&Path>) -> PacerConfig {
    let mut config = match path {
        Some(path) => match PacerConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => PacerConfig::default(),
    };
    config.apply_env();

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("error: {}", problem);
        }
        process::exit(1);
    }
    config
}

fn cmd_check_config(file: &Path) {
    let config = match PacerConfig::load(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let problems = config.validate();
    if problems.is_empty() {
        println!(
            "{}: ok ({} credential{}, tick every {}s)",
            file.display(),
            config.credentials.len(),
            if config.credentials.len() == 1 { "" } else { "s" },
            config.orchestrator.tick_interval_secs
        );
        return;
    }
    for problem in &problems {
        eprintln!("{}: {}", file.display(), problem);
    }
    eprintln!("{} problem{} found", problems.len(), if problems.len() == 1 { "" } else { "s" });
    process::exit(1);
}
