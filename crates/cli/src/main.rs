//! vmdesk CLI - Main Entry Point

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vmdesk_cli::commands::{connect, list, status, url};
use vmdesk_cli::output::{self, print_error};
use vmdesk_session::SessionConfig;

/// vmdesk - remote VM catalog and desktop sessions
#[derive(Parser)]
#[command(name = "vmdesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "VMDESK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// API root, e.g. https://vms.example.net/api
    #[arg(long, env = "VMDESK_API_ROOT", global = true)]
    api_root: Option<String>,

    /// Username reported to the VM endpoint
    #[arg(long, env = "VMDESK_USERNAME", global = true)]
    username: Option<String>,

    /// Local cache database
    #[arg(long, env = "VMDESK_STORE", global = true)]
    store: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available VMs
    List(list::ListArgs),

    /// Print the connection URL for a VM
    Url(url::UrlArgs),

    /// Connect to a VM and stay attached until interrupted
    Connect(connect::ConnectArgs),

    /// Show local state and catalog reachability
    Status(status::StatusArgs),
}

impl Cli {
    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(vmdesk_common::default_config_path);
        let mut config = SessionConfig::load(&path)?;

        if let Some(api_root) = &self.api_root {
            config.api_root = api_root.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean
    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new(log_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.session_config()?;

    let result = match cli.command {
        Commands::List(args) => list::execute(args, &config, cli.format).await,
        Commands::Url(args) => url::execute(args, &config).await,
        Commands::Connect(args) => connect::execute(args, config).await,
        Commands::Status(args) => status::execute(args, &config, cli.format).await,
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
