//! Command-line argument parsing for the wepp-status CLI.
//!
//! ```text
//! wepp-status <RUN_ID> <CHANNEL> [--host H] [--insecure] [--preflight]
//! wepp-status --version
//! ```

/// What to follow.
#[derive(Debug, Clone, PartialEq)]
pub struct TailOptions {
    pub run_id: String,
    /// Status channel; `None` with `preflight`
    pub channel: Option<String>,
    /// Host override; otherwise `WEPP_STATUS_HOST` or the default host
    pub host: Option<String>,
    /// Use `ws://` instead of `wss://`
    pub insecure: bool,
    /// Follow the preflight checklist as well
    pub preflight: bool,
}

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Tail a status channel
    Tail(TailOptions),
    /// Arguments could not be understood
    Invalid(String),
}

pub const USAGE: &str = "\
Usage: wepp-status <RUN_ID> <CHANNEL> [--host HOST] [--insecure] [--preflight]

Tail a WEPPcloud job status channel until Ctrl-C.

Options:
  --host HOST    Status service host (default: $WEPP_STATUS_HOST or wepp.cloud)
  --insecure     Connect with ws:// instead of wss://
  --preflight    Also follow the run's preflight checklist
                 (CHANNEL may be omitted)
  -V, --version  Print version
  -h, --help     Print this help";

/// Parse command-line arguments.
///
/// # Examples
///
/// ```
/// use wepp_status::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["wepp-status".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut positional = Vec::new();
    let mut host = None;
    let mut insecure = false;
    let mut preflight = false;

    // Skip the program name
    let mut args = args.skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return CliCommand::Version,
            "--help" | "-h" => return CliCommand::Help,
            "--insecure" => insecure = true,
            "--preflight" => preflight = true,
            "--host" => match args.next() {
                Some(value) => host = Some(value),
                None => return CliCommand::Invalid("--host needs a value".to_string()),
            },
            other if other.starts_with("--host=") => {
                host = Some(other["--host=".len()..].to_string());
            }
            other if other.starts_with('-') => {
                return CliCommand::Invalid(format!("unknown option: {}", other));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(run_id) = positional.next() else {
        return CliCommand::Invalid("missing RUN_ID".to_string());
    };
    let channel = positional.next();
    if let Some(extra) = positional.next() {
        return CliCommand::Invalid(format!("unexpected argument: {}", extra));
    }
    if channel.is_none() && !preflight {
        return CliCommand::Invalid("missing CHANNEL".to_string());
    }

    CliCommand::Tail(TailOptions {
        run_id,
        channel,
        host,
        insecure,
        preflight,
    })
}
