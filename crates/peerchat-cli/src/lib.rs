//! PeerChat CLI library
//!
//! Components of the `peerchat` binary: argument parsing, layered
//! configuration, the line-oriented terminal interface and the command
//! handlers that drive a `ChatClient` over the in-memory signaling hub.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod terminal_interface;

pub use cli::{Cli, Commands, ConfigAction};
pub use commands::CommandDispatcher;
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use terminal_interface::{parse_line, render, UiCommand};
