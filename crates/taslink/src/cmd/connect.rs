use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taslink_frame::MessageKind;
use taslink_link::{Channel, KeyBindings, LineUpdate, StateSnapshot};

use crate::cmd::{link_config, ConnectArgs};
use crate::exit::{self, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

/// A stand-in for the editor side: connects (waiting for the host to
/// come up if needed) and prints everything the host sends.
pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let config = link_config(&args.pipe);
    let pipe_path = config.pipe_path.clone();

    let channel = Channel::connect(config, args.session.clone())
        .map_err(|err| exit::link_error("starting controller", err))?;

    let received = Arc::new(AtomicU64::new(0));

    let counter = Arc::clone(&received);
    channel.register_handler::<StateSnapshot, _>(MessageKind::StateSnapshot, move |snapshot| {
        counter.fetch_add(1, Ordering::Relaxed);
        print_event(
            "state",
            &format!(
                "line={} frame={} running={} level={}",
                snapshot.current_line,
                snapshot.current_frame_in_tas,
                snapshot.playback_running,
                snapshot.level_name
            ),
            format,
        );
    });
    let counter = Arc::clone(&received);
    channel.register_handler::<Vec<LineUpdate>, _>(MessageKind::UpdateLines, move |updates| {
        counter.fetch_add(1, Ordering::Relaxed);
        for (line, text) in updates {
            print_event("update-line", &format!("{line}: {text}"), format);
        }
    });
    let counter = Arc::clone(&received);
    channel.register_handler::<String, _>(MessageKind::DataResponse, move |data| {
        counter.fetch_add(1, Ordering::Relaxed);
        print_event("data-response", &data, format);
    });
    let counter = Arc::clone(&received);
    channel.register_handler::<KeyBindings, _>(MessageKind::KeyBindings, move |bindings| {
        counter.fetch_add(1, Ordering::Relaxed);
        print_event("key-bindings", &format!("{} bindings", bindings.bindings.len()), format);
    });

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = Arc::clone(&running);
    ctrlc::set_handler(move || running_handler.store(false, Ordering::SeqCst))
        .map_err(|err| exit::CliError::new(INTERNAL, format!("signal handler: {err}")))?;

    print_event("connecting", &pipe_path.display().to_string(), format);

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

        if let Some(count) = args.count {
            if received.load(Ordering::Relaxed) >= count {
                break;
            }
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    channel.shutdown();
    Ok(SUCCESS)
}
