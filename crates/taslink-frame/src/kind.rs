//! The closed message-kind registry.
//!
//! Kind values are partitioned by range and shared by both peers at
//! compile time:
//! - `0x00` — reserved "empty slot" sentinel, never a kind
//! - `0x01..=0x0F` — connection management
//! - `0x10..=0x1F` — pure data transfer
//! - `0x20..=0x2F` — controller-to-host control
//! - `0x30..=0x3F` — host-to-controller control
//! - `0x40..=0x4F` — reserved for collaborator-defined ("external") use
//!
//! Priority and confirmation are properties of the kind, fixed here, not
//! of individual messages.

use crate::error::FrameError;

/// Identifier for messages exchanged between the host and the controller.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Receipt confirmation for a guaranteed send. Carries the confirmed
    /// kind byte.
    Confirm = 0x01,
    /// Keepalive, sent when nothing else has been written for a while.
    Ping = 0x02,
    /// Request a piece of game data from the host.
    RequestData = 0x08,
    /// Handshake hello; carries the sender's protocol version.
    Establish = 0x0D,
    /// Ask the peer to pause normal-priority sends until further traffic.
    Wait = 0x0E,
    /// Tear the channel down and re-establish.
    Reset = 0x0F,

    /// Current game state, broadcast every frame while a session runs.
    StateSnapshot = 0x10,

    /// Path of the session file currently edited in the controller.
    SessionPath = 0x20,
    /// A hotkey edge event (pressed or released).
    HotkeyPress = 0x21,
    /// Toggle a named game setting.
    ToggleSetting = 0x25,

    /// Current hotkey bindings of the host.
    KeyBindings = 0x30,
    /// Response to [`MessageKind::RequestData`].
    DataResponse = 0x31,
    /// Line status updates for the session file (e.g. chapter times).
    UpdateLines = 0x32,

    /// Collaborator-defined, normal priority.
    ExternLow1 = 0x40,
    /// Collaborator-defined, normal priority.
    ExternLow2 = 0x41,
    /// Collaborator-defined, high priority.
    ExternHigh1 = 0x42,
    /// Collaborator-defined, high priority.
    ExternHigh2 = 0x43,
}

impl MessageKind {
    /// Whether this kind preempts queued normal-priority frames at the
    /// next frame boundary. Hotkey edges and abort/reset style messages
    /// must not sit behind a large state payload.
    pub fn is_high_priority(self) -> bool {
        matches!(
            self,
            MessageKind::Confirm
                | MessageKind::RequestData
                | MessageKind::Establish
                | MessageKind::Wait
                | MessageKind::Reset
                | MessageKind::SessionPath
                | MessageKind::HotkeyPress
                | MessageKind::ToggleSetting
                | MessageKind::KeyBindings
                | MessageKind::DataResponse
                | MessageKind::UpdateLines
                | MessageKind::ExternHigh1
                | MessageKind::ExternHigh2
        )
    }

    /// Whether receipt of this kind must be acknowledged with a
    /// [`MessageKind::Confirm`] frame. Only these kinds are valid with a
    /// guaranteed send.
    pub fn needs_confirm(self) -> bool {
        matches!(
            self,
            MessageKind::RequestData
                | MessageKind::SessionPath
                | MessageKind::ToggleSetting
                | MessageKind::KeyBindings
                | MessageKind::UpdateLines
        )
    }

    /// Kinds that repeat at frame rate; logged at trace level only.
    pub fn is_chatty(self) -> bool {
        matches!(
            self,
            MessageKind::Ping | MessageKind::StateSnapshot | MessageKind::HotkeyPress
        )
    }

    /// Connection-management range (`0x01..=0x0F`).
    pub fn is_connection(self) -> bool {
        (self as u8) <= 0x0F
    }

    /// Collaborator-defined range (`0x40..=0x4F`).
    pub fn is_external(self) -> bool {
        (self as u8) >= 0x40
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Confirm => "Confirm",
            MessageKind::Ping => "Ping",
            MessageKind::RequestData => "RequestData",
            MessageKind::Establish => "Establish",
            MessageKind::Wait => "Wait",
            MessageKind::Reset => "Reset",
            MessageKind::StateSnapshot => "StateSnapshot",
            MessageKind::SessionPath => "SessionPath",
            MessageKind::HotkeyPress => "HotkeyPress",
            MessageKind::ToggleSetting => "ToggleSetting",
            MessageKind::KeyBindings => "KeyBindings",
            MessageKind::DataResponse => "DataResponse",
            MessageKind::UpdateLines => "UpdateLines",
            MessageKind::ExternLow1 => "ExternLow1",
            MessageKind::ExternLow2 => "ExternLow2",
            MessageKind::ExternHigh1 => "ExternHigh1",
            MessageKind::ExternHigh2 => "ExternHigh2",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageKind::Confirm),
            0x02 => Ok(MessageKind::Ping),
            0x08 => Ok(MessageKind::RequestData),
            0x0D => Ok(MessageKind::Establish),
            0x0E => Ok(MessageKind::Wait),
            0x0F => Ok(MessageKind::Reset),
            0x10 => Ok(MessageKind::StateSnapshot),
            0x20 => Ok(MessageKind::SessionPath),
            0x21 => Ok(MessageKind::HotkeyPress),
            0x25 => Ok(MessageKind::ToggleSetting),
            0x30 => Ok(MessageKind::KeyBindings),
            0x31 => Ok(MessageKind::DataResponse),
            0x32 => Ok(MessageKind::UpdateLines),
            0x40 => Ok(MessageKind::ExternLow1),
            0x41 => Ok(MessageKind::ExternLow2),
            0x42 => Ok(MessageKind::ExternHigh1),
            0x43 => Ok(MessageKind::ExternHigh2),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[MessageKind] = &[
        MessageKind::Confirm,
        MessageKind::Ping,
        MessageKind::RequestData,
        MessageKind::Establish,
        MessageKind::Wait,
        MessageKind::Reset,
        MessageKind::StateSnapshot,
        MessageKind::SessionPath,
        MessageKind::HotkeyPress,
        MessageKind::ToggleSetting,
        MessageKind::KeyBindings,
        MessageKind::DataResponse,
        MessageKind::UpdateLines,
        MessageKind::ExternLow1,
        MessageKind::ExternLow2,
        MessageKind::ExternHigh1,
        MessageKind::ExternHigh2,
    ];

    #[test]
    fn byte_roundtrip_for_every_kind() {
        for &kind in ALL {
            assert_eq!(MessageKind::try_from(kind as u8).unwrap(), kind);
        }
    }

    #[test]
    fn sentinel_and_unknown_bytes_rejected() {
        assert!(matches!(
            MessageKind::try_from(0x00),
            Err(FrameError::UnknownKind(0x00))
        ));
        assert!(matches!(
            MessageKind::try_from(0xFE),
            Err(FrameError::UnknownKind(0xFE))
        ));
        // Unassigned value inside the control range.
        assert!(MessageKind::try_from(0x22).is_err());
    }

    #[test]
    fn ranges_partition_kinds() {
        assert!(MessageKind::Establish.is_connection());
        assert!(MessageKind::Reset.is_connection());
        assert!(!MessageKind::StateSnapshot.is_connection());
        assert!(MessageKind::ExternHigh1.is_external());
        assert!(!MessageKind::SessionPath.is_external());
    }

    #[test]
    fn state_broadcast_is_normal_priority() {
        assert!(!MessageKind::StateSnapshot.is_high_priority());
        assert!(!MessageKind::Ping.is_high_priority());
        assert!(MessageKind::HotkeyPress.is_high_priority());
        assert!(MessageKind::Reset.is_high_priority());
    }

    #[test]
    fn confirmed_kinds_are_high_priority() {
        // A confirmation-demanding frame stuck behind a state payload
        // would stall its sender, so every confirmed kind preempts.
        for &kind in ALL {
            if kind.needs_confirm() {
                assert!(kind.is_high_priority(), "{kind} must be high priority");
            }
        }
    }
}
