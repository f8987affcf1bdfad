//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory received files are written to
    #[arg(short, long)]
    pub download_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scripted two-peer session: connect, chat, send a file and call
    Demo {
        /// Skip the voice call part
        #[arg(long)]
        skip_call: bool,
    },
    /// Start interactive command-line mode against a local echo peer
    Interactive,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Write an example configuration file
    Init {
        /// Target path (defaults to ~/.peerchat/config.toml)
        path: Option<String>,
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the default configuration file path
    Path,
}
