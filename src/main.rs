//! webpush-relay CLI - sends VAPID-signed web push messages.
//!
//! This is the main binary entry point. See the `webpush_relay` library
//! for the core functionality.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use webpush_relay::{commands, Config};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "webpush-relay")]
#[command(version)]
#[command(about = "Encrypts, signs and delivers Web Push messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay (POST /api/send-push-msg)
    Serve {
        /// Listen address, e.g. 0.0.0.0:8080
        #[arg(long)]
        bind: Option<String>,
        /// Serve static files from this directory
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Generate a VAPID application server key pair
    GenerateKeys {
        /// Write the key pair to this file (0600) instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Send one push message
    Send(commands::SendArgs),
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn init_logging() -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("WEBPUSH_LOG_FILE") {
        let log_file =
            std::fs::File::create(&path).with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { bind, static_dir } => commands::serve_relay(config, bind, static_dir).await?,
        Commands::GenerateKeys { output } => commands::generate_keys(output.as_deref())?,
        Commands::Send(args) => commands::send_push(args, &config).await?,
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
                println!("Saved to {}", Config::config_path()?.display());
            }
        }
    }

    Ok(())
}
