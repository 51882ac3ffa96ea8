//! End-to-end channel tests over a real pipe.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use taslink_codec::encode_value;
use taslink_frame::{FrameReader, FrameWriter, MessageKind};
use taslink_link::{
    handshake_host, Channel, ChannelStatus, HandshakeConfig, HotkeyBinding, HotkeyId, HotkeyPress,
    KeyBindings, LinkConfig, LinkError, StateSnapshot,
};
use taslink_link::handshake::read_first_contact;
use taslink_transport::PipeListener;

fn test_config(tag: &str) -> LinkConfig {
    let dir = std::env::temp_dir().join(format!(
        "taslink-e2e-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    LinkConfig {
        pipe_path: dir.join("link.sock"),
        handshake_timeout: Duration::from_secs(2),
        ack_timeout: Duration::from_millis(400),
        accept_poll: Duration::from_millis(20),
        reconnect_backoff: Duration::from_millis(20),
        ..LinkConfig::default()
    }
}

fn cleanup(config: &LinkConfig) {
    if let Some(dir) = config.pipe_path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

fn test_bindings() -> KeyBindings {
    KeyBindings {
        bindings: vec![HotkeyBinding {
            hotkey: HotkeyId::FrameAdvance,
            keys: vec![102],
        }],
    }
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn establishes_and_exchanges_typed_messages() {
    let config = test_config("exchange");

    let host = Channel::host(config.clone(), test_bindings()).expect("host should start");
    let (hotkey_tx, hotkey_rx) = mpsc::channel();
    host.register_handler::<HotkeyPress, _>(MessageKind::HotkeyPress, move |press| {
        let _ = hotkey_tx.send(press);
    });

    let controller =
        Channel::connect(config.clone(), "/maps/city.tas").expect("controller should start");
    let (state_tx, state_rx) = mpsc::channel();
    controller.register_handler::<StateSnapshot, _>(MessageKind::StateSnapshot, move |snapshot| {
        let _ = state_tx.send(snapshot);
    });

    assert!(
        wait_until(Duration::from_secs(5), || {
            host.is_established() && controller.is_established()
        }),
        "both peers should establish"
    );
    assert_eq!(host.status(), ChannelStatus::Established);

    let press = HotkeyPress {
        hotkey: HotkeyId::Pause,
        released: false,
    };
    controller
        .send(MessageKind::HotkeyPress, &press)
        .expect("send should succeed");
    let received = hotkey_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("host should receive hotkey");
    assert_eq!(received, press);

    let snapshot = StateSnapshot {
        current_line: 42,
        total_frames: 9000,
        playback_running: true,
        ..StateSnapshot::default()
    };
    host.send(MessageKind::StateSnapshot, &snapshot)
        .expect("send should succeed");
    let received = state_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("controller should receive snapshot");
    assert_eq!(received, snapshot);

    drop(controller);
    drop(host);
    cleanup(&config);
}

#[test]
fn guaranteed_send_is_confirmed_by_peer() {
    let config = test_config("guaranteed");

    let host = Channel::host(config.clone(), test_bindings()).expect("host should start");
    let controller =
        Channel::connect(config.clone(), "/maps/old.tas").expect("controller should start");

    assert!(wait_until(Duration::from_secs(5), || {
        host.is_established() && controller.is_established()
    }));

    // The host worker auto-confirms; no handler registration required.
    controller
        .send_guaranteed(MessageKind::SessionPath, &String::from("/maps/new.tas"))
        .expect("guaranteed send should be confirmed");

    // The channel survives the exchange.
    assert!(controller.is_established());

    drop(controller);
    drop(host);
    cleanup(&config);
}

#[test]
fn guaranteed_send_times_out_and_resets_without_confirmation() {
    let config = test_config("ack-timeout");

    // A hand-driven host that answers the handshake but never confirms.
    let listener = PipeListener::bind(&config.pipe_path).expect("bind should succeed");
    let mute_host = std::thread::spawn(move || {
        let stream = listener.accept().expect("accept should succeed");
        let reader_stream = stream.try_clone().expect("clone should succeed");
        let mut reader = FrameReader::new(reader_stream);
        let mut writer = FrameWriter::new(stream);

        let handshake_config = HandshakeConfig::default();
        let first = read_first_contact(&mut reader, handshake_config.step_timeout)
            .expect("first contact should arrive");
        handshake_host(&mut reader, &mut writer, first, &test_bindings(), &handshake_config)
            .expect("handshake should complete");

        // Swallow everything without confirming until the peer resets.
        while let Ok(frame) = reader.read_frame() {
            if frame.kind == MessageKind::Reset {
                break;
            }
        }
    });

    let controller =
        Channel::connect(config.clone(), "/maps/a.tas").expect("controller should start");
    assert!(wait_until(Duration::from_secs(5), || {
        controller.is_established()
    }));

    let start = Instant::now();
    let result = controller.send_guaranteed(MessageKind::SessionPath, &String::from("/maps/b.tas"));
    assert!(
        matches!(result, Err(LinkError::AckTimeout(MessageKind::SessionPath))),
        "expected ack timeout, got {result:?}"
    );
    // Bounded by the worker's deadline, with scheduling slack.
    assert!(start.elapsed() < config.ack_timeout * 3);

    // The timeout reset the channel.
    assert!(wait_until(Duration::from_secs(2), || {
        !controller.is_established()
    }));

    mute_host.join().expect("mute host should exit");
    drop(controller);
    cleanup(&config);
}

#[test]
fn disconnect_mid_handshake_recovers_on_next_attempt() {
    let config = test_config("recovery");

    let host = Channel::host(config.clone(), test_bindings()).expect("host should start");

    // A peer that says hello and dies before sending its session path.
    {
        let stream = {
            let deadline = Instant::now() + Duration::from_secs(2);
            loop {
                match PipeListener::connect(&config.pipe_path) {
                    Ok(stream) => break stream,
                    Err(_) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(10))
                    }
                    Err(err) => panic!("could not reach host: {err}"),
                }
            }
        };
        let mut writer = FrameWriter::new(stream);
        let version = encode_value(&String::from("1.0")).expect("encode should succeed");
        writer
            .send(MessageKind::Establish, &version)
            .expect("send should succeed");
        // Dropped here: transport disconnect mid-handshake.
    }

    // The host returns to Disconnected rather than wedging.
    assert!(wait_until(Duration::from_secs(5), || !host.is_established()));

    // A well-behaved controller establishes on the next cycle, and the
    // session carries traffic (no stale frames from the aborted one).
    let controller =
        Channel::connect(config.clone(), "/maps/retry.tas").expect("controller should start");
    let (state_tx, state_rx) = mpsc::channel();
    controller.register_handler::<StateSnapshot, _>(MessageKind::StateSnapshot, move |snapshot| {
        let _ = state_tx.send(snapshot);
    });

    assert!(
        wait_until(Duration::from_secs(5), || {
            host.is_established() && controller.is_established()
        }),
        "channel should recover after the aborted handshake"
    );

    let snapshot = StateSnapshot {
        current_line: 7,
        ..StateSnapshot::default()
    };
    host.send(MessageKind::StateSnapshot, &snapshot)
        .expect("send should succeed");
    assert_eq!(
        state_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("snapshot should arrive"),
        snapshot
    );

    drop(controller);
    drop(host);
    cleanup(&config);
}

#[test]
fn controller_reports_peer_unavailable_when_host_absent() {
    let config = LinkConfig {
        unavailable_after: 5,
        ..test_config("unavailable")
    };

    // Nobody ever binds the pipe.
    let controller = Channel::connect(config.clone(), "/maps/a.tas").expect("controller starts");

    assert!(
        wait_until(Duration::from_secs(3), || {
            controller.status() == ChannelStatus::PeerUnavailable
        }),
        "repeated connect failures should surface as peer unavailable"
    );

    drop(controller);
    cleanup(&config);
}

#[test]
fn sends_without_peer_are_dropped_or_rejected() {
    let config = test_config("no-peer");

    let controller = Channel::connect(config.clone(), "/maps/a.tas").expect("controller starts");

    // Best-effort sends are silently dropped while disconnected.
    controller
        .send(MessageKind::StateSnapshot, &StateSnapshot::default())
        .expect("best-effort send should not error");

    // Guaranteed sends fail fast instead.
    let result = controller.send_guaranteed(MessageKind::SessionPath, &String::from("/maps/b.tas"));
    assert!(matches!(result, Err(LinkError::NotEstablished)));

    // Unconfirmable kinds are rejected regardless of state.
    let press = HotkeyPress {
        hotkey: HotkeyId::Start,
        released: false,
    };
    let result = controller.send_guaranteed(MessageKind::HotkeyPress, &press);
    assert!(matches!(
        result,
        Err(LinkError::NotConfirmable(MessageKind::HotkeyPress))
    ));

    drop(controller);
    cleanup(&config);
}

#[test]
fn silent_peer_triggers_idle_reset() {
    let config = LinkConfig {
        idle_timeout: Duration::from_millis(300),
        ping_interval: Duration::from_millis(100),
        ..test_config("idle")
    };

    // A host that answers the handshake, then holds the stream open
    // without ever sending another byte.
    let listener = PipeListener::bind(&config.pipe_path).expect("bind should succeed");
    let silent_host = std::thread::spawn(move || {
        let stream = listener.accept().expect("accept should succeed");
        let reader_stream = stream.try_clone().expect("clone should succeed");
        let mut reader = FrameReader::new(reader_stream);
        let mut writer = FrameWriter::new(stream);

        let handshake_config = HandshakeConfig::default();
        let first = read_first_contact(&mut reader, handshake_config.step_timeout)
            .expect("first contact should arrive");
        handshake_host(&mut reader, &mut writer, first, &test_bindings(), &handshake_config)
            .expect("handshake should complete");

        std::thread::sleep(Duration::from_secs(2));
    });

    let controller =
        Channel::connect(config.clone(), "/maps/a.tas").expect("controller should start");
    assert!(wait_until(Duration::from_secs(5), || {
        controller.is_established()
    }));

    // Nothing inbound within the idle budget resets the channel.
    assert!(
        wait_until(Duration::from_secs(1), || !controller.is_established()),
        "silence should reset the channel"
    );

    silent_host.join().expect("silent host should exit");
    drop(controller);
    cleanup(&config);
}

#[test]
fn wait_pauses_state_broadcasts_until_next_message() {
    let config = test_config("wait");

    let host = Channel::host(config.clone(), test_bindings()).expect("host should start");
    let controller =
        Channel::connect(config.clone(), "/maps/a.tas").expect("controller should start");
    let (state_tx, state_rx) = mpsc::channel();
    controller.register_handler::<StateSnapshot, _>(MessageKind::StateSnapshot, move |snapshot| {
        let _ = state_tx.send(snapshot);
    });

    assert!(wait_until(Duration::from_secs(5), || {
        host.is_established() && controller.is_established()
    }));

    // Ask the host to hold normal-priority traffic.
    controller
        .send(MessageKind::Wait, &())
        .expect("wait should send");
    std::thread::sleep(Duration::from_millis(200));

    let snapshot = StateSnapshot {
        current_line: 99,
        ..StateSnapshot::default()
    };
    host.send(MessageKind::StateSnapshot, &snapshot)
        .expect("send should succeed");
    assert!(
        state_rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "state broadcast should be held while the peer waits"
    );

    // Any further message from the controller releases the gate.
    let press = HotkeyPress {
        hotkey: HotkeyId::Start,
        released: false,
    };
    controller
        .send(MessageKind::HotkeyPress, &press)
        .expect("send should succeed");

    assert_eq!(
        state_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("held snapshot should flush"),
        snapshot
    );

    drop(controller);
    drop(host);
    cleanup(&config);
}

#[test]
fn host_survives_controller_restart() {
    let config = test_config("restart");

    let host = Channel::host(config.clone(), test_bindings()).expect("host should start");

    let first = Channel::connect(config.clone(), "/maps/one.tas").expect("controller starts");
    assert!(wait_until(Duration::from_secs(5), || {
        host.is_established() && first.is_established()
    }));
    drop(first);

    // The host notices the loss and goes back to waiting.
    assert!(wait_until(Duration::from_secs(5), || !host.is_established()));

    let second = Channel::connect(config.clone(), "/maps/two.tas").expect("controller restarts");
    assert!(
        wait_until(Duration::from_secs(5), || {
            host.is_established() && second.is_established()
        }),
        "host should accept a restarted controller"
    );

    drop(second);
    drop(host);
    cleanup(&config);
}
