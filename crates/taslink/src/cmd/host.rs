use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taslink_frame::MessageKind;
use taslink_link::{
    Channel, DataRequest, HotkeyBinding, HotkeyId, HotkeyPress, KeyBindings, StateSnapshot,
};

use crate::cmd::{link_config, HostArgs};
use crate::exit::{self, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// A stand-in for the game side: answers the handshake with canned
/// bindings, prints whatever the controller sends, and broadcasts a
/// synthetic state snapshot on a timer.
pub fn run(args: HostArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link_config(&args.pipe);
    let pipe_path = config.pipe_path.clone();

    let channel = Channel::host(config, demo_bindings())
        .map_err(|err| exit::link_error("starting host", err))?;

    channel.register_handler::<HotkeyPress, _>(MessageKind::HotkeyPress, move |press| {
        print_event("hotkey", &format!("{:?} released={}", press.hotkey, press.released), format);
    });
    channel.register_handler::<String, _>(MessageKind::SessionPath, move |path| {
        print_event("session-path", &path, format);
    });
    channel.register_handler::<String, _>(MessageKind::ToggleSetting, move |setting| {
        print_event("toggle-setting", &setting, format);
    });
    channel.register_handler::<DataRequest, _>(MessageKind::RequestData, move |request| {
        print_event(
            "request-data",
            &format!("{:?} {}", request.kind, request.argument),
            format,
        );
    });

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = Arc::clone(&running);
    ctrlc::set_handler(move || running_handler.store(false, Ordering::SeqCst))
        .map_err(|err| exit::CliError::new(INTERNAL, format!("signal handler: {err}")))?;

    print_event("listening", &pipe_path.display().to_string(), format);

    let interval = Duration::from_millis(args.state_interval_ms.max(50));
    let mut frame = 0i32;
    let mut was_established = false;
    while running.load(Ordering::SeqCst) {
        let established = channel.is_established();
        if established != was_established {
            print_event(
                "connection",
                if established { "established" } else { "lost" },
                format,
            );
            was_established = established;
        }

        if established {
            frame += 1;
            let snapshot = StateSnapshot {
                current_line: frame,
                current_frame_in_tas: frame * 60,
                total_frames: 360_000,
                playback_running: true,
                level_name: String::from("diagnostic"),
                ..StateSnapshot::default()
            };
            channel
                .send(MessageKind::StateSnapshot, &snapshot)
                .map_err(|err| exit::link_error("broadcasting state", err))?;
        }

        std::thread::sleep(interval);
    }

    print_event("stopping", "interrupt received", format);
    channel.shutdown();
    Ok(SUCCESS)
}

fn demo_bindings() -> KeyBindings {
    KeyBindings {
        bindings: vec![
            HotkeyBinding {
                hotkey: HotkeyId::Start,
                keys: vec![119],
            },
            HotkeyBinding {
                hotkey: HotkeyId::FrameAdvance,
                keys: vec![102],
            },
            HotkeyBinding {
                hotkey: HotkeyId::Pause,
                keys: vec![112],
            },
        ],
    }
}
