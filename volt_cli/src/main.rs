use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use tracing::info;
use volt_master::MasterConfig;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the master config file
    #[arg(short, long, value_name = "FILE", default_value = "volt.toml")]
    config: PathBuf,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file if none exists
    InitConfig,
    /// Start the master and serve the HTTP surface
    Start,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.cmd {
        Commands::InitConfig => init_config(&cli.config),
        Commands::Start => {
            let content = fs::read_to_string(&cli.config)
                .with_context(|| format!("failed to read config {}", cli.config.display()))?;
            let config: MasterConfig = toml::from_str(&content)
                .with_context(|| format!("failed to parse config {}", cli.config.display()))?;
            volt_master::run_master(config).await
        }
    }
}

fn init_config(path: &PathBuf) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("config file {} already exists", path.display());
    }

    let starter = MasterConfig {
        listen: "0.0.0.0:3000".to_string(),
        index_path: PathBuf::from("/tmp/volt-index"),
        volumes: vec![
            "localhost:3001".to_string(),
            "localhost:3002".to_string(),
            "localhost:3003".to_string(),
        ],
        replicas: 3,
        subvolumes: 10,
        protect: false,
        md5sum: true,
        voltimeout_ms: 1000,
    };
    fs::write(path, toml::to_string_pretty(&starter)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote starter config to {}", path.display());
    Ok(())
}
