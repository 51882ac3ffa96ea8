mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "taslink", version, about = "TAS host/controller channel CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_subcommand() {
        let cli = Cli::try_parse_from(["taslink", "host", "--pipe", "/tmp/test.sock"])
            .expect("host args should parse");
        assert!(matches!(cli.command, Command::Host(_)));
    }

    #[test]
    fn parses_send_hotkey() {
        let cli = Cli::try_parse_from([
            "taslink",
            "send",
            "--pipe",
            "/tmp/test.sock",
            "--hotkey",
            "pause",
        ])
        .expect("send args should parse");
        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_send_args() {
        let err = Cli::try_parse_from([
            "taslink",
            "send",
            "--hotkey",
            "pause",
            "--session-path",
            "/maps/a.tas",
        ])
        .expect_err("conflicting args should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_connect_with_count() {
        let cli = Cli::try_parse_from([
            "taslink",
            "connect",
            "--session",
            "/maps/a.tas",
            "--count",
            "5",
        ])
        .expect("connect args should parse");
        assert!(matches!(cli.command, Command::Connect(_)));
    }
}
