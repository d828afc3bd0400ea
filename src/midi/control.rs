use super::notes::parse_tag_expected;
use super::{parse_channel, MessageParseError, MidiChannel, MidiMessage, RawMessage};
use super::{CHANNEL_PRESSURE_TAG, PITCH_WHEEL_TAG};

use crate::const_try;

const CONTROL_TAG: u8 = 0xB0;

pub const MOD_WHEEL: u8 = 1;
pub const DATA_ENTRY_MSB: u8 = 6;
pub const VOLUME: u8 = 7;
pub const PAN: u8 = 10;
pub const EXPRESSION: u8 = 11;
pub const DATA_ENTRY_LSB: u8 = 38;
pub const SUSTAIN_PEDAL: u8 = 64;
pub const NRPN_LSB: u8 = 98;
pub const NRPN_MSB: u8 = 99;
pub const RPN_LSB: u8 = 100;
pub const RPN_MSB: u8 = 101;

/// A control-change message.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ControlChange {
    channel: MidiChannel,
    controller: u8,
    value: u8,
}

impl ControlChange {
    /// Returns `None` if either the controller number or the value
    /// is not a 7 bit number.
    pub const fn new(channel: MidiChannel, controller: u8, value: u8) -> Option<Self> {
        if controller > 127 || value > 127 {
            None
        } else {
            Some(Self {
                channel,
                controller,
                value,
            })
        }
    }
    pub const fn as_bytes(&self) -> [u8; 3] {
        [CONTROL_TAG | self.channel.as_u8(), self.controller, self.value]
    }
    pub const fn channel(&self) -> MidiChannel {
        self.channel
    }
    pub const fn controller(&self) -> u8 {
        self.controller
    }
    pub const fn value(&self) -> u8 {
        self.value
    }
}

pub const fn parse_control(bytes: [u8; 3]) -> Result<ControlChange, MessageParseError> {
    const_try!(parse_tag_expected(bytes[0], CONTROL_TAG));
    let channel = const_try!(parse_channel(bytes[0]));
    match ControlChange::new(channel, bytes[1], bytes[2]) {
        Some(cc) => Ok(cc),
        None => Err(MessageParseError::OutOfRange {
            found: if bytes[1] > 127 { bytes[1] } else { bytes[2] },
            min: 0,
            max: 127,
        }),
    }
}

/// Which continuous controller an envelope drives.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ControllerKind {
    PitchWheel,
    ChannelPressure,
    Control(u8),
}

impl ControllerKind {
    pub const MOD_WHEEL: ControllerKind = ControllerKind::Control(MOD_WHEEL);
    pub const VOLUME: ControllerKind = ControllerKind::Control(VOLUME);
    pub const PAN: ControllerKind = ControllerKind::Control(PAN);
    pub const EXPRESSION: ControllerKind = ControllerKind::Control(EXPRESSION);

    /// Builds the message setting this controller on `channel`.
    ///
    /// Values are masked to 7 bits. A pitch wheel given a single value
    /// sends it in both data bytes.
    pub fn message(&self, channel: MidiChannel, value1: u8, value2: Option<u8>) -> MidiMessage {
        let value1 = value1 & 0x7F;
        match *self {
            ControllerKind::Control(controller) => MidiMessage::Control(ControlChange {
                channel,
                controller: controller & 0x7F,
                value: value1,
            }),
            ControllerKind::PitchWheel => {
                let value2 = value2.map(|v| v & 0x7F).unwrap_or(value1);
                MidiMessage::Other(RawMessage::from_raw(&[
                    PITCH_WHEEL_TAG | channel.as_u8(),
                    value1,
                    value2,
                ]))
            }
            ControllerKind::ChannelPressure => MidiMessage::Other(RawMessage::from_raw(&[
                CHANNEL_PRESSURE_TAG | channel.as_u8(),
                value1,
            ])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MessageCategory;

    #[test]
    fn test_controller_messages() {
        let chan = MidiChannel::from_raw(2).unwrap();
        let pan = ControllerKind::PAN.message(chan, 20, None);
        assert_eq!(vec![0xB2, 10, 20], pan.bytes());

        let bend = ControllerKind::PitchWheel.message(chan, 64, None);
        assert_eq!(vec![0xE2, 64, 64], bend.bytes());
        assert_eq!(MessageCategory::Control, bend.category());

        let fine_bend = ControllerKind::PitchWheel.message(chan, 0, Some(70));
        assert_eq!(vec![0xE2, 0, 70], fine_bend.bytes());

        let pressure = ControllerKind::ChannelPressure.message(chan, 99, Some(3));
        assert_eq!(vec![0xD2, 99], pressure.bytes());
    }

    #[test]
    fn test_parse_control() {
        let cc = parse_control([0xB5, PAN, 127]).unwrap();
        assert_eq!(5, cc.channel().as_u8());
        assert_eq!(PAN, cc.controller());
        assert_eq!(127, cc.value());
        assert!(parse_control([0x95, PAN, 127]).is_err());
    }
}
