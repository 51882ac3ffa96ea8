//! Typed payloads for the built-in message kinds.
//!
//! Small control payloads implement [`WireValue`] directly on the
//! primitive fast paths; the state snapshot and binding set are
//! structured records and go through `wire_record!`.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use taslink_codec::{wire_record, CodecError, WireCursor, WireValue};

/// Hotkeys the controller can press on behalf of the user.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HotkeyId {
    Start = 0,
    Restart = 1,
    FastForward = 2,
    FrameAdvance = 3,
    Pause = 4,
    SaveState = 5,
    ClearState = 6,
}

impl TryFrom<u8> for HotkeyId {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HotkeyId::Start),
            1 => Ok(HotkeyId::Restart),
            2 => Ok(HotkeyId::FastForward),
            3 => Ok(HotkeyId::FrameAdvance),
            4 => Ok(HotkeyId::Pause),
            5 => Ok(HotkeyId::SaveState),
            6 => Ok(HotkeyId::ClearState),
            other => Err(CodecError::UnexpectedMarker(other)),
        }
    }
}

/// A hotkey edge event: two bytes on the wire, pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyPress {
    pub hotkey: HotkeyId,
    pub released: bool,
}

impl WireValue for HotkeyPress {
    fn write(&self, dst: &mut BytesMut) -> taslink_codec::Result<()> {
        (self.hotkey as u8).write(dst)?;
        self.released.write(dst)
    }

    fn read(src: &mut WireCursor<'_>) -> taslink_codec::Result<Self> {
        let hotkey = HotkeyId::try_from(u8::read(src)?)?;
        let released = bool::read(src)?;
        Ok(Self { hotkey, released })
    }
}

/// Categories of game data the controller can ask the host for.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameDataKind {
    ConsoleCommand = 0,
    SettingValue = 1,
    ExactGameInfo = 2,
    CustomInfoTemplate = 3,
}

impl TryFrom<u8> for GameDataKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameDataKind::ConsoleCommand),
            1 => Ok(GameDataKind::SettingValue),
            2 => Ok(GameDataKind::ExactGameInfo),
            3 => Ok(GameDataKind::CustomInfoTemplate),
            other => Err(CodecError::UnexpectedMarker(other)),
        }
    }
}

/// A request for game data; answered with a `DataResponse` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub kind: GameDataKind,
    pub argument: String,
}

impl WireValue for DataRequest {
    fn write(&self, dst: &mut BytesMut) -> taslink_codec::Result<()> {
        (self.kind as u8).write(dst)?;
        self.argument.write(dst)
    }

    fn read(src: &mut WireCursor<'_>) -> taslink_codec::Result<Self> {
        let kind = GameDataKind::try_from(u8::read(src)?)?;
        let argument = String::read(src)?;
        Ok(Self { kind, argument })
    }
}

/// The key combination bound to one hotkey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyBinding {
    pub hotkey: HotkeyId,
    /// Platform key codes, all required simultaneously.
    pub keys: Vec<i32>,
}

/// The full set of hotkey bindings on the host, exchanged during the
/// handshake and re-sent whenever bindings change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindings {
    pub bindings: Vec<HotkeyBinding>,
}

/// One line-status update for the session file: line number and new text.
pub type LineUpdate = (i32, String);

/// Snapshot of the current playback state, broadcast by the host every
/// game frame while connected. Staleness is harmless; delivery is
/// best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub current_line: i32,
    pub current_line_suffix: String,
    pub current_frame_in_tas: i32,
    pub total_frames: i32,
    pub save_state_lines: Vec<i32>,
    pub playback_running: bool,
    pub level_name: String,
    pub chapter_time: String,
    pub player_position: (f32, f32),
    pub player_speed: (f32, f32),
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            current_line: -1,
            current_line_suffix: String::new(),
            current_frame_in_tas: -1,
            total_frames: 0,
            save_state_lines: Vec::new(),
            playback_running: false,
            level_name: String::new(),
            chapter_time: String::new(),
            player_position: (0.0, 0.0),
            player_speed: (0.0, 0.0),
        }
    }
}

wire_record!(KeyBindings, StateSnapshot);

#[cfg(test)]
mod tests {
    use taslink_codec::{decode_value, encode_value};

    use super::*;

    #[test]
    fn hotkey_press_is_two_bytes() {
        let press = HotkeyPress {
            hotkey: HotkeyId::FrameAdvance,
            released: true,
        };
        let payload = encode_value(&press).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(decode_value::<HotkeyPress>(&payload).unwrap(), press);
    }

    #[test]
    fn unknown_hotkey_byte_rejected() {
        let payload = [0x7Fu8, 0x00];
        assert!(decode_value::<HotkeyPress>(&payload).is_err());
    }

    #[test]
    fn data_request_roundtrip() {
        let request = DataRequest {
            kind: GameDataKind::SettingValue,
            argument: String::from("ShowHitboxes"),
        };
        let payload = encode_value(&request).unwrap();
        assert_eq!(decode_value::<DataRequest>(&payload).unwrap(), request);
    }

    #[test]
    fn key_bindings_roundtrip() {
        let bindings = KeyBindings {
            bindings: vec![
                HotkeyBinding {
                    hotkey: HotkeyId::Start,
                    keys: vec![119],
                },
                HotkeyBinding {
                    hotkey: HotkeyId::FastForward,
                    keys: vec![306, 102],
                },
            ],
        };
        let payload = encode_value(&bindings).unwrap();
        assert_eq!(decode_value::<KeyBindings>(&payload).unwrap(), bindings);
    }

    #[test]
    fn state_snapshot_roundtrip() {
        let snapshot = StateSnapshot {
            current_line: 412,
            current_line_suffix: String::from("FrameStep"),
            current_frame_in_tas: 8111,
            total_frames: 9000,
            save_state_lines: vec![100, 250],
            playback_running: true,
            level_name: String::from("2A"),
            chapter_time: String::from("1:23.456"),
            player_position: (104.5, -32.25),
            player_speed: (90.0, -105.0),
        };
        let payload = encode_value(&snapshot).unwrap();
        assert_eq!(decode_value::<StateSnapshot>(&payload).unwrap(), snapshot);
    }

    #[test]
    fn line_updates_use_list_encoding() {
        let updates: Vec<LineUpdate> = vec![(3, String::from("1:02.345")), (7, String::new())];
        let payload = encode_value(&updates).unwrap();
        assert_eq!(decode_value::<Vec<LineUpdate>>(&payload).unwrap(), updates);
    }
}
