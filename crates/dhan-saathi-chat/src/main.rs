//! Dhan Saathi chat - terminal front-end for the finance assistant.
//!
//! This is the entry point for the `dsaathi` binary. Lines typed on stdin are
//! sent to the assistant; the reply is printed as it is revealed.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use dhan_saathi_chat::{
    ChatConfig, ChatSession, DashboardClient, IdentityProvider, SessionChange, SessionError,
    StaticIdentity, UserState,
};
use dhan_saathi_core::{MessageId, UserId};

/// Dhan Saathi chat - ask the finance assistant from the terminal.
#[derive(Parser, Debug)]
#[command(name = "dsaathi")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional TOML configuration file.
    #[arg(long, env = "DHAN_SAATHI_CONFIG")]
    config: Option<PathBuf>,

    /// Assistant WebSocket URL. Overrides the config file.
    #[arg(long, env = "DHAN_SAATHI_WS_URL")]
    ws_url: Option<String>,

    /// Dashboard API base URL. Overrides the config file.
    #[arg(long, env = "DHAN_SAATHI_API_URL")]
    api_url: Option<String>,

    /// Signed-in user id. Requests are sent as the guest user without one.
    #[arg(long, env = "DHAN_SAATHI_USER_ID")]
    user_id: Option<String>,

    /// Use the super tier.
    #[arg(long = "super", default_value = "false")]
    super_tier: bool,

    /// Skip fetching suggested prompts.
    #[arg(long, default_value = "false")]
    no_suggestions: bool,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

/// A line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Retry,
    Ask(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/quit" | "/exit" => Self::Quit,
            "/retry" => Self::Retry,
            text => Self::Ask(text),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is the conversation.
    let filter = if args.debug {
        EnvFilter::new("dhan_saathi_chat=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&args)?;

    let user = match args.user_id.as_deref() {
        Some(raw) => UserState::Loaded(UserId::new(raw).context("invalid user id")?),
        None => UserState::SignedOut,
    };
    let identity = StaticIdentity::new(user, args.super_tier);
    let profile = identity.profile();
    tracing::info!(user_id = %profile.wire_user_id(), tier = %profile.tier, "Starting chat");

    let mut session = ChatSession::new(config.clone(), profile.clone());
    let mut out = Transcript::default();

    for message in session.messages() {
        print_line(&message.content)?;
    }

    if !args.no_suggestions {
        let client = DashboardClient::new(&config.api_base_url);
        match client.suggestions_for_profile(&profile).await {
            Ok(suggestions) if !suggestions.is_empty() => {
                print_line("Try asking:")?;
                for suggestion in suggestions {
                    print_line(&format!("  - {suggestion}"))?;
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to fetch suggestions"),
        }
    }

    let result = run_event_loop(&mut session, &mut out).await;
    session.shutdown();
    result
}

fn load_config(args: &Args) -> anyhow::Result<ChatConfig> {
    let mut config = match &args.config {
        Some(path) => ChatConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ChatConfig::default(),
    };
    if let Some(url) = &args.ws_url {
        config.ws_url.clone_from(url);
    }
    if let Some(url) = &args.api_url {
        config.api_base_url.clone_from(url);
    }
    config.validate()?;
    Ok(config)
}

/// Read stdin and apply session changes until `/quit` or end of input.
async fn run_event_loop(session: &mut ChatSession, out: &mut Transcript) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    print_prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    // Let an outstanding reply finish before exiting.
                    stdin_open = false;
                    if session.input_enabled() {
                        break;
                    }
                    continue;
                };
                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::Retry => {
                        let state = session.reconnect();
                        out.status(&state.to_string())?;
                        print_prompt()?;
                    }
                    Command::Ask(text) => match session.submit(text).await {
                        Ok(id) => out.begin_reply(session, id)?,
                        Err(SessionError::EmptyMessage) => print_prompt()?,
                        Err(SessionError::Busy) => out.status("still answering, please wait")?,
                        Err(e) => return Err(e.into()),
                    },
                }
            }

            change = session.next_change() => {
                if change.needs_redraw() {
                    out.apply(session, change)?;
                }
                if !stdin_open && session.input_enabled() {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn print_line(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}")
}

fn print_prompt() -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Incremental printer for the conversation.
#[derive(Debug, Default)]
struct Transcript {
    /// Reply being printed and how many bytes of it are on screen.
    streaming: Option<(MessageId, usize)>,
}

impl Transcript {
    fn status(&self, status: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if self.streaming.is_some_and(|(_, shown)| shown > 0) {
            writeln!(stdout)?;
        }
        writeln!(stdout, "[{status}]")
    }

    /// Start printing a reply. The reply may already be final if sending failed.
    fn begin_reply(&mut self, session: &ChatSession, id: MessageId) -> io::Result<()> {
        self.streaming = Some((id, 0));
        match session.message(id) {
            Ok(message) if !message.streaming => self.finish(session, id),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, session: &ChatSession, change: SessionChange) -> io::Result<()> {
        match change {
            SessionChange::None | SessionChange::Received(_) => Ok(()),
            SessionChange::Connection(state) => self.status(state.as_str()),
            SessionChange::Revealed(id) => self.reveal(session, id),
            SessionChange::Finalized(id) => self.finish(session, id),
            SessionChange::TurnFailed { message_id, .. } => {
                if self.streaming.is_some_and(|(_, shown)| shown > 0) {
                    print_line("")?;
                }
                self.streaming = Some((message_id, 0));
                self.finish(session, message_id)
            }
        }
    }

    /// Print the part of the reply not yet on screen.
    fn reveal(&mut self, session: &ChatSession, id: MessageId) -> io::Result<()> {
        let Some((current, shown)) = self.streaming.as_mut().filter(|(current, _)| *current == id) else {
            return Ok(());
        };
        let Ok(message) = session.message(*current) else {
            return Ok(());
        };
        if let Some(delta) = message.content.get(*shown..) {
            let mut stdout = io::stdout().lock();
            write!(stdout, "{delta}")?;
            stdout.flush()?;
            *shown = message.content.len();
        }
        Ok(())
    }

    fn finish(&mut self, session: &ChatSession, id: MessageId) -> io::Result<()> {
        self.reveal(session, id)?;
        self.streaming = None;
        print_line("")?;
        print_prompt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("  /retry "), Command::Retry);
        assert_eq!(Command::parse("How do I save?"), Command::Ask("How do I save?"));
        assert_eq!(Command::parse("/unknown"), Command::Ask("/unknown"));
    }

    #[test]
    fn status_keeps_reply_progress() {
        let id = MessageId::generate();
        let out = Transcript {
            streaming: Some((id, 5)),
        };
        let shared = &out;
        shared.status("connecting").unwrap();
        print_line("").unwrap();
        assert_eq!(out.streaming, Some((id, 5)));
    }

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "dsaathi",
            "--ws-url",
            "ws://assistant.local/interact",
            "--api-url",
            "http://api.local",
            "--super",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.ws_url, "ws://assistant.local/interact");
        assert_eq!(config.api_base_url, "http://api.local");
        assert!(args.super_tier);
    }
}
