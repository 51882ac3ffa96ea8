use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use taslink_link::{HotkeyId, LinkConfig};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod connect;
pub mod doctor;
pub mod host;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a diagnostic host peer (the game side of the channel).
    Host(HostArgs),
    /// Run a diagnostic controller peer and print incoming messages.
    Connect(ConnectArgs),
    /// Connect, deliver a single message, and exit.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args, format),
        Command::Connect(args) => connect::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
        Command::Doctor(args) => doctor::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct HostArgs {
    /// Pipe path to bind. Default: the well-known path.
    #[arg(long)]
    pub pipe: Option<PathBuf>,
    /// Interval between synthetic state broadcasts, in milliseconds.
    #[arg(long, default_value = "1000")]
    pub state_interval_ms: u64,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Pipe path to connect to. Default: the well-known path.
    #[arg(long)]
    pub pipe: Option<PathBuf>,
    /// Session file path announced during the handshake.
    #[arg(long, default_value = "/tmp/session.tas")]
    pub session: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Pipe path to connect to. Default: the well-known path.
    #[arg(long)]
    pub pipe: Option<PathBuf>,
    /// Hotkey to press.
    #[arg(long, conflicts_with_all = ["session_path", "toggle"])]
    pub hotkey: Option<HotkeyArg>,
    /// Send the hotkey release edge instead of the press.
    #[arg(long, requires = "hotkey")]
    pub released: bool,
    /// Announce a new session file path (guaranteed delivery).
    #[arg(long, conflicts_with_all = ["hotkey", "toggle"])]
    pub session_path: Option<String>,
    /// Toggle a named game setting (guaranteed delivery).
    #[arg(long, conflicts_with_all = ["hotkey", "session_path"])]
    pub toggle: Option<String>,
    /// Maximum time to wait for the channel to establish (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    /// Pipe path to check. Default: the well-known path.
    #[arg(long)]
    pub pipe: Option<PathBuf>,
}

/// CLI spelling of the hotkey identifiers.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum HotkeyArg {
    Start,
    Restart,
    FastForward,
    FrameAdvance,
    Pause,
    SaveState,
    ClearState,
}

impl From<HotkeyArg> for HotkeyId {
    fn from(arg: HotkeyArg) -> Self {
        match arg {
            HotkeyArg::Start => HotkeyId::Start,
            HotkeyArg::Restart => HotkeyId::Restart,
            HotkeyArg::FastForward => HotkeyId::FastForward,
            HotkeyArg::FrameAdvance => HotkeyId::FrameAdvance,
            HotkeyArg::Pause => HotkeyId::Pause,
            HotkeyArg::SaveState => HotkeyId::SaveState,
            HotkeyArg::ClearState => HotkeyId::ClearState,
        }
    }
}

pub(crate) fn link_config(pipe: &Option<PathBuf>) -> LinkConfig {
    let mut config = LinkConfig::default();
    if let Some(path) = pipe {
        config.pipe_path = path.clone();
    }
    config
}

/// Parse durations like `5s`, `500ms`, `2m`.
pub(crate) fn parse_duration(text: &str) -> Option<std::time::Duration> {
    let text = text.trim();
    if let Some(value) = text.strip_suffix("ms") {
        return value.parse().ok().map(std::time::Duration::from_millis);
    }
    if let Some(value) = text.strip_suffix('s') {
        return value.parse().ok().map(std::time::Duration::from_secs);
    }
    if let Some(value) = text.strip_suffix('m') {
        return value
            .parse::<u64>()
            .ok()
            .map(|m| std::time::Duration::from_secs(m * 60));
    }
    text.parse().ok().map(std::time::Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_suffixes() {
        assert_eq!(parse_duration("5s"), Some(std::time::Duration::from_secs(5)));
        assert_eq!(
            parse_duration("500ms"),
            Some(std::time::Duration::from_millis(500))
        );
        assert_eq!(parse_duration("2m"), Some(std::time::Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(std::time::Duration::from_secs(7)));
        assert_eq!(parse_duration("abc"), None);
    }
}
