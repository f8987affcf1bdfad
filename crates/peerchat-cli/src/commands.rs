//! Command handlers for the PeerChat CLI

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peerchat_harness::{FakeMediaDevices, MemoryHub, RecordingFileSink};
use peerchat_runtime::{
    AppState, ChatClient, ClientBuilder, Inbound, Notice, OutgoingFile, PeerEndpoint, PeerId,
    Store, Subscription,
};

use crate::cli::{Cli, Commands, ConfigAction};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::terminal_interface::{format_notice, help_text, parse_line, render, UiCommand};

/// Whether the interactive loop keeps reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Demo { skip_call } => Self::handle_demo_command(config, skip_call).await,
            Commands::Interactive => Self::handle_interactive_command(config).await,
            Commands::Config { action } => Self::handle_config_command(config, action),
        }
    }

    /// Scripted session between two clients on one in-memory hub
    async fn handle_demo_command(config: AppConfig, skip_call: bool) -> Result<()> {
        let step = Duration::from_millis(config.cli.step_timeout_ms);
        let hub = MemoryHub::new(config.hub.clone());
        let bob_sink = Arc::new(RecordingFileSink::new());
        let alice = Self::demo_client(&hub, &config, Arc::new(RecordingFileSink::new()))?;
        let bob = Self::demo_client(&hub, &config, bob_sink.clone())?;
        let printers = [
            print_notices("alice ", alice.notices()),
            print_notices("bob   ", bob.notices()),
        ];

        let alice_id = alice.start_session().await?;
        let bob_id = bob.start_session().await?;
        println!("alice is {}", alice_id);
        println!("bob is   {}", bob_id);

        // Connect and chat
        alice.change_input(bob_id.as_str());
        alice.connect_peer().await?;
        require(
            wait_for_state(bob.store(), step, |s| s.connection.is_connected(&alice_id)).await,
            "incoming connection at bob",
        )?;
        alice.select(bob_id.clone());
        bob.select(alice_id.clone());

        alice.send_text("Hi bob, this is alice").await?;
        require(
            wait_for_state(bob.store(), step, |s| !s.connection.messages.is_empty()).await,
            "alice's message",
        )?;
        bob.send_text("Hello alice!").await?;
        require(
            wait_for_state(alice.store(), step, |s| {
                s.connection.messages.iter().any(|m| !m.is_own())
            })
            .await,
            "bob's reply",
        )?;

        // File transfer
        let notes = OutgoingFile::new(
            "notes.txt",
            Some("text/plain".to_string()),
            b"PeerChat demo file\n".to_vec(),
        );
        alice.send_file(Some(notes)).await?;
        require(bob_sink.wait_for(1, step).await, "file at bob")?;
        for file in bob_sink.saved() {
            println!("bob saved {} ({} bytes)", file.file_name, file.bytes.len());
        }

        // Voice call
        if !skip_call {
            alice.call().await?;
            require(
                wait_until(step, || bob.call_state().is_active()).await,
                "call at bob",
            )?;
            println!("call is {} on both sides", alice.call_state().state_name());
            alice.hang_up().await;
            require(
                wait_until(step, || bob.call_state().is_idle()).await,
                "hang-up at bob",
            )?;
        }

        let recent = config.cli.max_recent_messages;
        println!("\n-- alice --\n{}", render(&alice.state(), &alice.call_state(), recent));
        println!("-- bob --\n{}", render(&bob.state(), &bob.call_state(), recent));

        alice.stop_session().await;
        bob.stop_session().await;

        let stats = hub.stats();
        println!(
            "hub: {} sessions, {} connections, {} payloads, {} calls",
            stats.sessions_opened(),
            stats.connections_opened(),
            stats.payloads_delivered(),
            stats.calls_placed()
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        for printer in printers {
            printer.abort();
        }
        Ok(())
    }

    fn demo_client(
        hub: &MemoryHub,
        config: &AppConfig,
        sink: Arc<RecordingFileSink>,
    ) -> Result<ChatClient> {
        let client = ClientBuilder::new(Arc::new(hub.clone()), Arc::new(FakeMediaDevices::new()))
            .with_config(config.peerchat.clone())
            .with_file_sink(sink)
            .build()?;
        Ok(client)
    }

    /// Read commands from stdin and drive one client against a local echo peer
    async fn handle_interactive_command(config: AppConfig) -> Result<()> {
        let hub = MemoryHub::new(config.hub.clone());
        let bot = EchoBot::start(&hub, &config).await?;

        let client = ClientBuilder::new(Arc::new(hub.clone()), Arc::new(FakeMediaDevices::new()))
            .with_config(config.effective_peerchat())
            .build()?;
        client.change_input(bot.id().as_str());
        let printer = print_notices("", client.notices());

        println!("Echo peer is listening as {}", bot.id());
        println!("Type `start`, then `connect` to reach it. `help` lists all commands.");

        let recent = config.cli.max_recent_messages;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{}", config.cli.prompt);
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            if apply_ui_command(&client, parse_line(&line), recent).await == Flow::Quit {
                break;
            }
            if config.cli.show_state_after_command {
                print!("{}", render(&client.state(), &client.call_state(), recent));
            }
        }

        client.stop_session().await;
        bot.stop().await;
        printer.abort();
        info!("Interactive session ended");
        Ok(())
    }

    fn handle_config_command(config: AppConfig, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show { json } => {
                let text = if json {
                    serde_json::to_string_pretty(&config)?
                } else {
                    toml::to_string_pretty(&config)?
                };
                println!("{}", text);
            }
            ConfigAction::Init { path, force } => {
                let path = match path {
                    Some(path) => PathBuf::from(path),
                    None => AppConfig::default_config_path()?,
                };
                if path.exists() && !force {
                    return Err(CliError::Config(format!(
                        "{} already exists (use --force to overwrite)",
                        path.display()
                    )));
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, AppConfig::example_config())?;
                println!("Wrote {}", path.display());
            }
            ConfigAction::Path => {
                println!("{}", AppConfig::default_config_path()?.display());
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Interactive Commands
// ----------------------------------------------------------------------------

/// Run one user command against the client. Failed actions have already been
/// reported as notices, so they do not end the loop.
pub async fn apply_ui_command(client: &ChatClient, command: UiCommand, recent: usize) -> Flow {
    let result = match command {
        UiCommand::Start => client
            .start_session()
            .await
            .map(|id| println!("Session started as {}", id)),
        UiCommand::Stop => {
            client.stop_session().await;
            Ok(())
        }
        UiCommand::Connect(target) => {
            if let Some(id) = target {
                client.change_input(id);
            }
            client.connect_peer().await
        }
        UiCommand::Select(peer) => {
            if client.state().connection.is_connected(&peer) {
                client.select(peer);
            } else {
                println!("Not connected to {}", peer);
            }
            Ok(())
        }
        UiCommand::Disconnect(target) => {
            match target.or_else(|| client.state().connection.selected_id) {
                Some(peer) => client.disconnect(&peer).await,
                None => {
                    println!("Please select a connection");
                    Ok(())
                }
            }
        }
        UiCommand::Send(text) => client.send_text(&text).await,
        UiCommand::File(path) => {
            let file = match path {
                Some(path) => match read_file(&path).await {
                    Ok(file) => Some(file),
                    Err(e) => {
                        println!("[error] {:#}", e);
                        return Flow::Continue;
                    }
                },
                None => None,
            };
            client.send_file(file).await
        }
        UiCommand::Call => client.call().await,
        UiCommand::HangUp => {
            if !client.hang_up().await {
                println!("No call in progress");
            }
            Ok(())
        }
        UiCommand::Status => {
            print!("{}", render(&client.state(), &client.call_state(), recent));
            Ok(())
        }
        UiCommand::Help => {
            println!("{}", help_text());
            Ok(())
        }
        UiCommand::Quit => return Flow::Quit,
        UiCommand::Empty => Ok(()),
        UiCommand::Unknown(line) => {
            println!("Unknown command: {} (try `help`)", line);
            Ok(())
        }
    };

    if let Err(e) = result {
        debug!("Command failed: {}", e);
    }
    Flow::Continue
}

async fn read_file(path: &Path) -> anyhow::Result<OutgoingFile> {
    OutgoingFile::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

// ----------------------------------------------------------------------------
// Echo Peer
// ----------------------------------------------------------------------------

/// Local peer that echoes chat text, acknowledges files and answers calls
pub struct EchoBot {
    endpoint: Arc<PeerEndpoint>,
    id: PeerId,
    _subscriptions: Vec<Subscription>,
}

impl EchoBot {
    /// Open a session on `hub` and start answering
    pub async fn start(hub: &MemoryHub, config: &AppConfig) -> Result<Self> {
        let endpoint = Arc::new(PeerEndpoint::new(
            Arc::new(hub.clone()),
            Arc::new(FakeMediaDevices::new()),
            config.peerchat.session.clone(),
        ));
        let id = endpoint.start().await?;

        let incoming = endpoint.clone();
        let connections = endpoint.on_incoming(move |peer| {
            let replies = incoming.clone();
            let from = peer.clone();
            let subscription = incoming.on_data(&peer, move |inbound| {
                let reply = match inbound {
                    Inbound::Text(text) => format!("echo: {}", text),
                    Inbound::File(file) => {
                        format!("got {} ({} bytes)", file.file_name, file.bytes.len())
                    }
                    Inbound::Ignored { .. } => return,
                };
                let endpoint = replies.clone();
                let to = from.clone();
                tokio::spawn(async move {
                    if let Err(e) = endpoint.send_text(&to, reply).await {
                        warn!("Echo to {} failed: {}", to, e);
                    }
                });
            });
            match subscription {
                Ok(subscription) => subscription.detach(),
                Err(e) => warn!("Echo peer cannot read from {}: {}", peer, e),
            }
        })?;
        let calls = endpoint.on_incoming_call(|call| {
            info!("Echo peer answered a call from {}", call.peer);
        })?;

        Ok(Self {
            endpoint,
            id,
            _subscriptions: vec![connections, calls],
        })
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub async fn stop(&self) -> bool {
        self.endpoint.stop().await
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Print every notice with `prefix` until the client goes away
fn print_notices(prefix: &'static str, mut notices: broadcast::Receiver<Notice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => println!("{}{}", prefix, format_notice(&notice)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Skipped {} notices", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Wait until the store holds a state matching `predicate`
pub async fn wait_for_state<F>(store: &Store, limit: Duration, predicate: F) -> bool
where
    F: Fn(&AppState) -> bool,
{
    let mut states = store.subscribe();
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if predicate(&states.borrow_and_update()) {
            return true;
        }
        match tokio::time::timeout_at(deadline, states.changed()).await {
            Ok(Ok(())) => continue,
            _ => return false,
        }
    }
}

/// Poll `condition` until it holds or `limit` passes
pub async fn wait_until<F>(limit: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn require(reached: bool, what: &str) -> Result<()> {
    if reached {
        Ok(())
    } else {
        Err(CliError::UI(format!("Timed out waiting for {}", what)))
    }
}
