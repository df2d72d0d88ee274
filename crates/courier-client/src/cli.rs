//! CLI command definitions and dispatch.

use clap::{Parser, Subcommand};

use crate::{config::ClientConfig, output, transport, ExitCode};

#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about = "Courier encrypted chat client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Claim an identifier with the relay
    Register {
        /// Identifier to claim
        #[arg(long, short = 'i')]
        id: String,
        /// Registration URL (defaults to http://<host>/register)
        #[arg(long)]
        server: Option<String>,
    },
    /// Open an interactive chat session with a recipient
    Send {
        /// Our registered identifier
        #[arg(long, short = 'i')]
        id: String,
        /// Recipient identifier
        #[arg(long, short = 'r')]
        recipient: String,
        /// Message to send once the session is established
        #[arg(long, short = 'm')]
        message: Option<String>,
        /// WebSocket URL (defaults to ws://<host>/message)
        #[arg(long)]
        server: Option<String>,
    },
    /// Listen for raw frames from the relay
    Receive {
        /// WebSocket URL (defaults to ws://<host>/message)
        #[arg(long)]
        server: Option<String>,
    },
}

impl Cli {
    pub async fn execute(self, config: ClientConfig) -> ExitCode {
        match self.command {
            Commands::Register { id, server } => {
                let url = server.unwrap_or_else(|| config.register_url());
                match transport::register(&url, &id).await {
                    Ok(()) => {
                        output::system(&format!("registered {id}"));
                        ExitCode::Success
                    }
                    Err(transport::ClientError::IdTaken) => {
                        output::error("id already taken; choose another");
                        ExitCode::UsageError
                    }
                    Err(e) => {
                        output::error(&format!("register failed: {e}"));
                        ExitCode::RuntimeError
                    }
                }
            }
            Commands::Send {
                id,
                recipient,
                message,
                server,
            } => {
                let mut config = config;
                if let Some(server) = server {
                    // accept a full ws URL by stripping down to the host
                    config.server_host = server
                        .trim_start_matches("ws://")
                        .trim_end_matches("/message")
                        .to_string();
                }
                match transport::run_chat(&config, &id, &recipient, message).await {
                    Ok(()) => ExitCode::Success,
                    Err(e) => {
                        output::error(&format!("chat session failed: {e}"));
                        ExitCode::RuntimeError
                    }
                }
            }
            Commands::Receive { server } => {
                let url = server.unwrap_or_else(|| config.ws_url());
                match transport::listen(&url).await {
                    Ok(()) => ExitCode::Success,
                    Err(e) => {
                        output::error(&format!("receive failed: {e}"));
                        ExitCode::RuntimeError
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_send_command() {
        let cli = Cli::try_parse_from([
            "courier", "send", "--id", "alice", "--recipient", "bob", "-m", "hello",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                id,
                recipient,
                message,
                server,
            } => {
                assert_eq!(id, "alice");
                assert_eq!(recipient, "bob");
                assert_eq!(message.as_deref(), Some("hello"));
                assert!(server.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn register_requires_an_id() {
        assert!(Cli::try_parse_from(["courier", "register"]).is_err());
    }

    #[test]
    fn receive_accepts_a_server_override() {
        let cli =
            Cli::try_parse_from(["courier", "receive", "--server", "ws://h:1/message?id=x"])
                .unwrap();
        match cli.command {
            Commands::Receive { server } => {
                assert_eq!(server.as_deref(), Some("ws://h:1/message?id=x"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
