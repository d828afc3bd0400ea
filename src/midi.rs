use crate::const_min;
use thiserror::*;

mod notes;
pub use notes::*;

mod control;
pub use control::*;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum MessageParseError {
    #[error("Wrong midi tag: expected {expected:b}, but found {actual:b}.")]
    WrongTag { expected: u8, actual: u8 },
    #[error("Value out of range: expected number in the range [{min}..={max}], found {found}.")]
    OutOfRange { found: u8, min: u8, max: u8 },
    #[error("Empty message.")]
    Empty,
    #[error("Status byte {0:#04x} is not a status byte.")]
    NotAStatusByte(u8),
    #[error("Message with status {status:#04x} should be {expected} bytes long, found {found}.")]
    WrongLength {
        status: u8,
        expected: usize,
        found: usize,
    },
    #[error("Extended message is not terminated by an end-of-exclusive byte.")]
    Unterminated,
}

pub const fn parse_channel(raw: u8) -> Result<MidiChannel, MessageParseError> {
    let offset = raw & 0xF;
    Ok(MidiChannel { raw: offset })
}

pub const fn parse_note(raw: u8) -> Result<MidiNote, MessageParseError> {
    match MidiNote::from_raw(raw) {
        Some(n) => Ok(n),
        None => Err(MessageParseError::OutOfRange {
            min: 0,
            max: 127,
            found: raw,
        }),
    }
}

pub const fn parse_vel(raw: u8) -> Result<PressVelocity, MessageParseError> {
    match PressVelocity::from_raw(raw) {
        Some(n) => Ok(n),
        None => Err(MessageParseError::OutOfRange {
            min: 0,
            max: 127,
            found: raw,
        }),
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Debug, Hash)]
pub struct PressVelocity {
    value: u8,
}

impl PressVelocity {
    pub const fn as_u8(&self) -> u8 {
        self.value
    }
    pub const fn from_raw(raw: u8) -> Option<PressVelocity> {
        if raw > 127 {
            None
        } else {
            Some(PressVelocity { value: raw })
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default, Debug, Hash)]
pub struct MidiChannel {
    raw: u8,
}

const fn make_all_channels() -> [MidiChannel; 16] {
    let mut retvl = [MidiChannel { raw: 0 }; 16];
    let mut idx = 0;
    while idx < retvl.len() {
        retvl[idx] = MidiChannel { raw: idx as u8 };
        idx += 1;
    }
    retvl
}

impl MidiChannel {
    pub const fn all() -> &'static [MidiChannel] {
        const ALL: [MidiChannel; 16] = make_all_channels();
        &ALL
    }
    pub const fn as_u8(&self) -> u8 {
        self.raw
    }
    pub const fn from_raw(raw: u8) -> Option<MidiChannel> {
        let raw = raw as usize;
        if raw >= Self::all().len() {
            None
        } else {
            Some(Self::all()[raw])
        }
    }
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct MidiNote {
    raw: u8,
}

impl MidiNote {
    pub const fn from_raw(raw: u8) -> Option<MidiNote> {
        if raw >= 128 {
            None
        } else {
            Some(MidiNote { raw })
        }
    }
    pub const fn as_u8(self) -> u8 {
        self.raw
    }
}

/// A short (at most 3 byte) message that has no dedicated variant.
///
/// Missing data bytes are padded with `0xFF`, which can never be a data byte.
#[derive(Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub struct RawMessage {
    bytes: [u8; 3],
}

impl RawMessage {
    pub const fn empty() -> Self {
        Self {
            bytes: [0, 0xFF, 0xFF],
        }
    }

    pub const fn from_raw(raw: &[u8]) -> RawMessage {
        let mut retvl = RawMessage::empty();
        let cplen = const_min!(retvl.bytes.len(), raw.len());
        let mut idx = 0;
        while idx < cplen {
            retvl.bytes[idx] = raw[idx];
            idx += 1;
        }
        retvl
    }

    pub const fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub const fn tag(&self) -> u8 {
        self.bytes[0] & 0xF0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len()]
    }

    pub const fn len(&self) -> usize {
        if self.bytes[0] & 0x80 == 0 {
            0
        } else if self.bytes[1] & 0x80 != 0 {
            1
        } else if self.bytes[2] & 0x80 != 0 {
            2
        } else {
            3
        }
    }
}

impl Default for RawMessage {
    fn default() -> Self {
        RawMessage::empty()
    }
}

/// A variable-length (system exclusive) message, stored with its
/// `0xF0 .. 0xF7` framing.
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub struct ExtendedMessage {
    bytes: Box<[u8]>,
}

impl ExtendedMessage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Coarse classification of a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MessageCategory {
    NoteOff,
    Control,
    Other,
    NoteOn,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum MidiMessage {
    NoteOn(NoteOn),
    NoteOff(NoteOff),
    Control(ControlChange),
    Other(RawMessage),
    Extended(ExtendedMessage),
}

const PITCH_WHEEL_TAG: u8 = 0xE0;
const CHANNEL_PRESSURE_TAG: u8 = 0xD0;
const KEY_PRESSURE_TAG: u8 = 0xA0;
const PROGRAM_CHANGE_TAG: u8 = 0xC0;
const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

/// Number of bytes a message starting with `status` occupies,
/// or `None` for variable-length messages.
const fn expected_len(status: u8) -> Option<usize> {
    match status & 0xF0 {
        PROGRAM_CHANGE_TAG | CHANNEL_PRESSURE_TAG => Some(2),
        0x80 | 0x90 | KEY_PRESSURE_TAG | 0xB0 | PITCH_WHEEL_TAG => Some(3),
        _ => match status {
            SYSEX_START => None,
            0xF1 | 0xF3 => Some(2),
            0xF2 => Some(3),
            _ => Some(1),
        },
    }
}

impl MidiMessage {
    /// Classifies a raw byte tuple as handed over by the score loader.
    pub fn from_bytes(bytes: &[u8]) -> Result<MidiMessage, MessageParseError> {
        let status = *bytes.first().ok_or(MessageParseError::Empty)?;
        if status & 0x80 == 0 {
            return Err(MessageParseError::NotAStatusByte(status));
        }
        let expected = match expected_len(status) {
            Some(n) => n,
            None => {
                if bytes.len() < 2 || bytes[bytes.len() - 1] != SYSEX_END {
                    return Err(MessageParseError::Unterminated);
                }
                return Ok(MidiMessage::Extended(ExtendedMessage {
                    bytes: bytes.into(),
                }));
            }
        };
        if bytes.len() != expected {
            return Err(MessageParseError::WrongLength {
                status,
                expected,
                found: bytes.len(),
            });
        }
        for &data in &bytes[1..] {
            if data > 127 {
                return Err(MessageParseError::OutOfRange {
                    found: data,
                    min: 0,
                    max: 127,
                });
            }
        }
        match status & 0xF0 {
            0x90 => Ok(MidiMessage::NoteOn(parse_noteon([
                bytes[0], bytes[1], bytes[2],
            ])?)),
            0x80 => Ok(MidiMessage::NoteOff(parse_noteoff([
                bytes[0], bytes[1], bytes[2],
            ])?)),
            0xB0 => Ok(MidiMessage::Control(parse_control([
                bytes[0], bytes[1], bytes[2],
            ])?)),
            _ => Ok(MidiMessage::Other(RawMessage::from_raw(bytes))),
        }
    }

    pub fn category(&self) -> MessageCategory {
        match self {
            MidiMessage::NoteOff(_) => MessageCategory::NoteOff,
            MidiMessage::NoteOn(on) if on.vel().as_u8() == 0 => MessageCategory::NoteOff,
            MidiMessage::NoteOn(_) => MessageCategory::NoteOn,
            MidiMessage::Control(_) => MessageCategory::Control,
            MidiMessage::Other(raw) => match raw.tag() {
                PITCH_WHEEL_TAG | CHANNEL_PRESSURE_TAG | KEY_PRESSURE_TAG => {
                    MessageCategory::Control
                }
                _ => MessageCategory::Other,
            },
            MidiMessage::Extended(_) => MessageCategory::Other,
        }
    }

    /// Whether this message starts or stops a sounding note.
    pub fn is_note(&self) -> bool {
        match self.category() {
            MessageCategory::NoteOn | MessageCategory::NoteOff => true,
            MessageCategory::Control | MessageCategory::Other => false,
        }
    }

    pub fn channel(&self) -> Option<MidiChannel> {
        match self {
            MidiMessage::NoteOn(on) => Some(on.channel()),
            MidiMessage::NoteOff(off) => Some(off.channel()),
            MidiMessage::Control(cc) => Some(cc.channel()),
            MidiMessage::Other(raw) if raw.status() < SYSEX_START => {
                MidiChannel::from_raw(raw.status() & 0x0F)
            }
            MidiMessage::Other(_) | MidiMessage::Extended(_) => None,
        }
    }

    /// The wire representation of this message.
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            MidiMessage::NoteOn(on) => on.as_bytes().to_vec(),
            MidiMessage::NoteOff(off) => off.as_bytes().to_vec(),
            MidiMessage::Control(cc) => cc.as_bytes().to_vec(),
            MidiMessage::Other(raw) => raw.bytes().to_vec(),
            MidiMessage::Extended(ext) => ext.bytes().to_vec(),
        }
    }
}

impl From<RawMessage> for MidiMessage {
    fn from(inner: RawMessage) -> Self {
        MidiMessage::Other(inner)
    }
}
impl From<NoteOff> for MidiMessage {
    fn from(inner: NoteOff) -> Self {
        MidiMessage::NoteOff(inner)
    }
}

impl From<NoteOn> for MidiMessage {
    fn from(inner: NoteOn) -> Self {
        MidiMessage::NoteOn(inner)
    }
}

impl From<ControlChange> for MidiMessage {
    fn from(inner: ControlChange) -> Self {
        MidiMessage::Control(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let on = MidiMessage::from_bytes(&[0x91, 60, 100]).unwrap();
        assert_eq!(MessageCategory::NoteOn, on.category());
        assert_eq!(MidiChannel::from_raw(1), on.channel());
        assert_eq!(vec![0x91, 60, 100], on.bytes());

        let silent_on = MidiMessage::from_bytes(&[0x90, 60, 0]).unwrap();
        assert_eq!(MessageCategory::NoteOff, silent_on.category());

        let pan = MidiMessage::from_bytes(&[0xB2, 10, 64]).unwrap();
        assert_eq!(MessageCategory::Control, pan.category());
        let bend = MidiMessage::from_bytes(&[0xE0, 0, 64]).unwrap();
        assert_eq!(MessageCategory::Control, bend.category());
        let program = MidiMessage::from_bytes(&[0xC3, 5]).unwrap();
        assert_eq!(MessageCategory::Other, program.category());
        assert_eq!(vec![0xC3, 5], program.bytes());
        assert_eq!(MidiChannel::from_raw(3), program.channel());

        let sysex = MidiMessage::from_bytes(&[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]).unwrap();
        assert_eq!(MessageCategory::Other, sysex.category());
        assert_eq!(None, sysex.channel());
        assert_eq!(6, sysex.bytes().len());
    }

    #[test]
    fn test_from_bytes_errors() {
        assert_eq!(Err(MessageParseError::Empty), MidiMessage::from_bytes(&[]));
        assert_eq!(
            Err(MessageParseError::NotAStatusByte(0x40)),
            MidiMessage::from_bytes(&[0x40, 1])
        );
        assert_eq!(
            Err(MessageParseError::WrongLength {
                status: 0x90,
                expected: 3,
                found: 2
            }),
            MidiMessage::from_bytes(&[0x90, 60])
        );
        assert_eq!(
            Err(MessageParseError::Unterminated),
            MidiMessage::from_bytes(&[0xF0, 0x01, 0x02])
        );
        assert!(MidiMessage::from_bytes(&[0xB0, 7, 200]).is_err());
    }

    #[test]
    fn test_raw_len() {
        assert_eq!(2, RawMessage::from_raw(&[0xC0, 3]).len());
        assert_eq!(3, RawMessage::from_raw(&[0xE0, 3, 4]).len());
        assert_eq!(1, RawMessage::from_raw(&[0xF8]).len());
        assert_eq!(0, RawMessage::empty().len());
    }
}
