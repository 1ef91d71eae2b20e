mod chat;
mod config;
mod notifier;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "livechat", about = "livechat CLI - talk to a support agent from the terminal")]
struct Cli {
    /// Config file (default: ~/.config/livechat/livechat.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for agent messages until interrupted
    Watch {
        /// Treat the conversation as open: print messages, no badge
        #[arg(long)]
        open: bool,

        /// Suppress the notification sound
        #[arg(long)]
        mute: bool,
    },

    /// Send a message, starting the conversation if needed
    Send {
        /// Message text
        message: String,
    },

    /// Print the conversation so far
    History,

    /// Show or set configuration
    Config {
        /// Set the chat API root URL
        #[arg(long)]
        chat_url: Option<String>,

        /// Set the site (website) id
        #[arg(long)]
        site_id: Option<String>,

        /// Set the visitor id (empty to regenerate on next use)
        #[arg(long)]
        visitor_id: Option<String>,
    },
}

fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,livechat=info,livechat_sync=info"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = async move {
        let path = config::resolve_path(cli.config)?;
        match cli.command {
            Commands::Watch { open, mute } => chat::run_watch(&path, open, mute).await,
            Commands::Send { message } => chat::run_send(&path, &message).await,
            Commands::History => chat::run_history(&path).await,
            Commands::Config {
                chat_url,
                site_id,
                visitor_id,
            } => {
                if chat_url.is_none() && site_id.is_none() && visitor_id.is_none() {
                    config::show_config(&path)
                } else {
                    config::set_config(&path, chat_url, site_id, visitor_id)
                }
            }
        }
    }
    .await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
