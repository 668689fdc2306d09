use clap::{Parser, Subcommand};
use lead_relay::config::Config;
use lead_relay::{server, webhook};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lead-relay",
    about = "Relay mini-app leads to an admin Telegram chat and route replies back"
)]
struct Cli {
    /// Config file (default: ~/.config/lead-relay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Register <public_base_url>/telegram as the bot webhook
    SetWebhook {
        /// Overrides public_base_url from the config
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

fn init_tracing(is_server: bool) {
    let default_level = if is_server { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Serve);
    init_tracing(matches!(command, Commands::Serve));

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = match command {
        Commands::Serve => rt.block_on(server::run_server(config)),
        Commands::SetWebhook { public_base_url } => {
            rt.block_on(webhook::run_set_webhook(&config, public_base_url))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
