//! MIDI Decoding
//!
//! Turns raw MIDI 1.0 channel-voice messages (two or three bytes) into typed
//! [`StatusMessage`] values. Decoding is stateless; anything that cannot be
//! classified comes back as [`MessageKind::Unknown`] rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of a decoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "camelCase")]
pub enum MessageKind {
    NoteOff {
        pitch: u8,
        velocity: u8,
    },
    NoteOn {
        pitch: u8,
        velocity: u8,
    },
    PolyAfterTouch {
        key: u8,
        pressure: u8,
    },
    ChannelControl {
        controller: u8,
        value: u8,
    },
    ProgramChange {
        preset: u8,
    },
    ChannelAfterTouch {
        pressure: u8,
    },
    #[serde(rename_all = "camelCase")]
    PitchBend {
        bend_lsb: u8,
        bend_msb: u8,
    },
    Unknown,
}

impl MessageKind {
    /// Short name of the message kind
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::NoteOff { .. } => "noteOff",
            MessageKind::NoteOn { .. } => "noteOn",
            MessageKind::PolyAfterTouch { .. } => "polyAfterTouch",
            MessageKind::ChannelControl { .. } => "channelControl",
            MessageKind::ProgramChange { .. } => "programChange",
            MessageKind::ChannelAfterTouch { .. } => "channelAfterTouch",
            MessageKind::PitchBend { .. } => "pitchBend",
            MessageKind::Unknown => "unknown",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, MessageKind::Unknown)
    }
}

/// A decoded MIDI message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Fingerprint of the raw bytes, used for duplicate suppression
    pub id: String,

    /// 1-based MIDI channel; absent for unknown messages
    pub channel: Option<u8>,

    #[serde(flatten)]
    pub kind: MessageKind,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(ch) => write!(f, "{} ch{} [{}]", self.kind.name(), ch, self.id),
            None => write!(f, "{} [{}]", self.kind.name(), self.id),
        }
    }
}

/// Build the fingerprint for a raw message: the byte values joined with `-`.
/// Missing bytes render as empty fields so 2- and 3-byte messages never collide.
pub fn message_id(bytes: &[u8]) -> String {
    let field = |i: usize| bytes.get(i).map(|b| b.to_string()).unwrap_or_default();
    format!("{}-{}-{}", field(0), field(1), field(2))
}

/// Decode a raw 2- or 3-byte MIDI message.
///
/// The status byte's 16-wide range selects the kind and the low nibble the
/// channel. A note-on with zero velocity is a note-off. Missing or
/// out-of-range data bytes make the message `Unknown`.
pub fn decode(bytes: &[u8]) -> StatusMessage {
    let id = message_id(bytes);
    let unknown = || StatusMessage {
        id: id.clone(),
        channel: None,
        kind: MessageKind::Unknown,
    };

    let Some(&status) = bytes.first() else {
        return unknown();
    };
    let data = |i: usize| bytes.get(i).copied().filter(|b| *b < 0x80);
    let channel = (status & 0x0F) + 1;

    let kind = match status {
        0x80..=0x8F => data(1)
            .zip(data(2))
            .map(|(pitch, velocity)| MessageKind::NoteOff { pitch, velocity }),
        0x90..=0x9F => data(1).zip(data(2)).map(|(pitch, velocity)| {
            if velocity == 0 {
                MessageKind::NoteOff { pitch, velocity }
            } else {
                MessageKind::NoteOn { pitch, velocity }
            }
        }),
        0xA0..=0xAF => data(1)
            .zip(data(2))
            .map(|(key, pressure)| MessageKind::PolyAfterTouch { key, pressure }),
        0xB0..=0xBF => data(1)
            .zip(data(2))
            .map(|(controller, value)| MessageKind::ChannelControl { controller, value }),
        0xC0..=0xCF => data(1).map(|preset| MessageKind::ProgramChange { preset }),
        0xD0..=0xDF => data(1).map(|pressure| MessageKind::ChannelAfterTouch { pressure }),
        0xE0..=0xEF => data(1)
            .zip(data(2))
            .map(|(bend_lsb, bend_msb)| MessageKind::PitchBend { bend_lsb, bend_msb }),
        _ => None,
    };

    match kind {
        Some(kind) => StatusMessage {
            id,
            channel: Some(channel),
            kind,
        },
        None => unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::discriminant;

    fn expected_name(status: u8) -> &'static str {
        match status >> 4 {
            0x8 => "noteOff",
            0x9 => "noteOn",
            0xA => "polyAfterTouch",
            0xB => "channelControl",
            0xC => "programChange",
            0xD => "channelAfterTouch",
            0xE => "pitchBend",
            _ => "unknown",
        }
    }

    #[test]
    fn test_range_classification() {
        for status in 0x80u8..=0xEF {
            let msg = decode(&[status, 60, 100]);
            assert_eq!(msg.kind.name(), expected_name(status), "status {:#x}", status);
            assert_eq!(msg.channel, Some(status % 16 + 1));
        }
    }

    #[test]
    fn test_outside_ranges_are_unknown() {
        for status in (0x00u8..0x80).chain(0xF0..=0xFF) {
            let msg = decode(&[status, 60, 100]);
            assert!(msg.kind.is_unknown(), "status {:#x}", status);
            assert_eq!(msg.channel, None);
        }
    }

    #[test]
    fn test_zero_velocity_note_on_is_note_off() {
        let released = decode(&[0x90, 60, 0]);
        let off = decode(&[0x80, 60, 64]);
        assert_eq!(discriminant(&released.kind), discriminant(&off.kind));
        assert_eq!(
            released.kind,
            MessageKind::NoteOff {
                pitch: 60,
                velocity: 0
            }
        );
        assert_eq!(
            off.kind,
            MessageKind::NoteOff {
                pitch: 60,
                velocity: 64
            }
        );
    }

    #[test]
    fn test_payloads() {
        assert_eq!(
            decode(&[0x93, 64, 90]),
            StatusMessage {
                id: "147-64-90".into(),
                channel: Some(4),
                kind: MessageKind::NoteOn {
                    pitch: 64,
                    velocity: 90
                },
            }
        );
        assert_eq!(
            decode(&[0xE0, 0, 64]).kind,
            MessageKind::PitchBend {
                bend_lsb: 0,
                bend_msb: 64
            }
        );
        assert_eq!(
            decode(&[0xC2, 5]).kind,
            MessageKind::ProgramChange { preset: 5 }
        );
        assert_eq!(
            decode(&[0xBF, 1, 127]),
            StatusMessage {
                id: "191-1-127".into(),
                channel: Some(16),
                kind: MessageKind::ChannelControl {
                    controller: 1,
                    value: 127
                },
            }
        );
    }

    #[test]
    fn test_malformed_messages() {
        assert!(decode(&[]).kind.is_unknown());
        assert!(decode(&[0x90]).kind.is_unknown());
        assert!(decode(&[0x90, 60]).kind.is_unknown());
        assert!(decode(&[0x90, 0x90, 100]).kind.is_unknown());
    }

    #[test]
    fn test_message_id() {
        assert_eq!(message_id(&[144, 60, 100]), "144-60-100");
        assert_eq!(message_id(&[192, 5]), "192-5-");
        assert_ne!(decode(&[144, 60, 100]).id, decode(&[144, 61, 100]).id);
    }

    #[test]
    fn test_serializes_with_message_tag() {
        let json = serde_json::to_value(decode(&[0xE1, 10, 70])).unwrap();
        assert_eq!(json["message"], "pitchBend");
        assert_eq!(json["channel"], 2);
        assert_eq!(json["bendLsb"], 10);
        assert_eq!(json["bendMsb"], 70);
    }
}
