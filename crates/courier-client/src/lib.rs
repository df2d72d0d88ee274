//! Courier chat client.
//!
//! The client registers an identifier over HTTP, opens a WebSocket to the
//! relay, and runs the end-to-end session layer on top: a Kyber-1024 key
//! agreement per peer, AES-256-GCM framing per message, and a monotone
//! delivery tracker fed by acknowledgements.

pub mod cli;
pub mod config;
pub mod keys;
pub mod output;
pub mod session;
pub mod tracker;
pub mod transport;

pub use cli::Cli;
pub use config::ClientConfig;

/// Exit codes for the CLI.
///
/// - 0: success
/// - 1: runtime error (I/O, transport, crypto)
/// - 2: user error (missing or duplicate id, bad arguments)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    RuntimeError = 1,
    UsageError = 2,
}

impl ExitCode {
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as i32 as u8)
    }
}
