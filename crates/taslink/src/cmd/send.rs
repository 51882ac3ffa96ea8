use std::time::{Duration, Instant};

use taslink_frame::MessageKind;
use taslink_link::{Channel, HotkeyPress};

use crate::cmd::{link_config, parse_duration, SendArgs};
use crate::exit::{self, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_event, OutputFormat};

/// Connect, deliver one message, and exit.
pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)
        .ok_or_else(|| CliError::new(USAGE, format!("invalid duration '{}'", args.wait_timeout)))?;

    let config = link_config(&args.pipe);
    let channel = Channel::connect(config, "/tmp/session.tas")
        .map_err(|err| exit::link_error("starting controller", err))?;

    let deadline = Instant::now() + wait_timeout;
    while !channel.is_established() {
        if Instant::now() >= deadline {
            return Err(CliError::new(
                FAILURE,
                format!("no host within {}", args.wait_timeout),
            ));
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    if let Some(hotkey) = args.hotkey {
        let press = HotkeyPress {
            hotkey: hotkey.into(),
            released: args.released,
        };
        channel
            .send(MessageKind::HotkeyPress, &press)
            .map_err(|err| exit::link_error("sending hotkey", err))?;
        // Best-effort frames are only queued; give the worker a pass to
        // put this one on the wire before shutting down.
        std::thread::sleep(Duration::from_millis(100));
        print_event("sent", &format!("hotkey {:?}", press.hotkey), format);
    } else if let Some(path) = args.session_path {
        channel
            .send_guaranteed(MessageKind::SessionPath, &path)
            .map_err(|err| exit::link_error("sending session path", err))?;
        print_event("sent", &format!("session-path {path}"), format);
    } else if let Some(setting) = args.toggle {
        channel
            .send_guaranteed(MessageKind::ToggleSetting, &setting)
            .map_err(|err| exit::link_error("toggling setting", err))?;
        print_event("sent", &format!("toggle {setting}"), format);
    } else {
        return Err(CliError::new(
            USAGE,
            "one of --hotkey, --session-path or --toggle is required",
        ));
    }

    channel.shutdown();
    Ok(SUCCESS)
}
