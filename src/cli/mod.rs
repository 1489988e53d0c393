//! CLI module for wepp-status.
//!
//! Argument parsing, the version command and the terminal panel the tail
//! command renders into.
//!
//! ```ignore
//! use wepp_status::cli::{parse_args, CliCommand};
//!
//! match parse_args(std::env::args()) {
//!     CliCommand::Tail(options) => { /* follow the channel */ }
//!     CliCommand::Version => handle_version_command(),
//!     CliCommand::Help => println!("{}", USAGE),
//!     CliCommand::Invalid(msg) => eprintln!("{}", msg),
//! }
//! ```

pub mod args;
pub mod terminal;
pub mod version;

pub use args::{parse_args, CliCommand, TailOptions, USAGE};
pub use terminal::TerminalPanel;
pub use version::{handle_version_command, VERSION};

use color_eyre::Result;

use crate::config::SocketConfig;

/// Build the socket configuration for a tail command.
///
/// Starts from the environment and applies command-line overrides.
pub fn socket_config(options: &TailOptions) -> Result<SocketConfig> {
    let mut config = SocketConfig::from_env()?;
    if let Some(host) = &options.host {
        config = config.with_host(host.clone());
    }
    if options.insecure {
        config = config.with_tls(false);
    }
    Ok(config)
}
