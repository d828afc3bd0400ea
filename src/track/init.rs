use crate::midi::{
    ControlChange, MidiChannel, MidiMessage, DATA_ENTRY_LSB, DATA_ENTRY_MSB, NRPN_LSB, NRPN_MSB,
    RPN_LSB, RPN_MSB,
};
use std::collections::{BTreeMap, HashMap};

/// What a message sets, so that a later message setting the same thing
/// replaces it.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
enum ControllerKey {
    Control {
        channel: MidiChannel,
        controller: u8,
    },
    Parameter {
        channel: MidiChannel,
        registered: bool,
        msb: u8,
        lsb: u8,
    },
    PitchWheel(MidiChannel),
    ChannelPressure(MidiChannel),
    KeyPressure(MidiChannel, u8),
    Program(MidiChannel),
    Status(u8),
    Extended(Box<[u8]>),
}

/// The (N)RPN address most recently selected on a channel.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
struct ParameterAddress {
    registered: bool,
    msb: Option<u8>,
    lsb: Option<u8>,
}

impl ParameterAddress {
    fn full(registered: bool, msb: u8, lsb: u8) -> Self {
        ParameterAddress {
            registered,
            msb: Some(msb),
            lsb: Some(lsb),
        }
    }

    /// The messages selecting this address on `channel`.
    fn select(self, channel: MidiChannel) -> impl Iterator<Item = MidiMessage> {
        let (msb_ctl, lsb_ctl) = if self.registered {
            (RPN_MSB, RPN_LSB)
        } else {
            (NRPN_MSB, NRPN_LSB)
        };
        let msb = self.msb.map(|value| (msb_ctl, value));
        let lsb = self.lsb.map(|value| (lsb_ctl, value));
        msb.into_iter()
            .chain(lsb)
            .filter_map(move |(controller, value)| ControlChange::new(channel, controller, value))
            .map(MidiMessage::from)
    }
}

/// Accumulates the non-note state a receiver ends up in after a stream of
/// messages, keeping only the latest message per controller.
///
/// A registered or non-registered parameter is stored as one unit: its
/// address selection followed by its data entry values. The address
/// selected last on each channel is selected again at the end.
#[derive(Debug, Clone, Default)]
pub struct ControllerSnapshot {
    entries: Vec<(ControllerKey, Vec<MidiMessage>)>,
    index: HashMap<ControllerKey, usize>,
    addresses: BTreeMap<MidiChannel, ParameterAddress>,
}

impl ControllerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message: &MidiMessage) {
        if message.is_note() {
            return;
        }
        match message {
            MidiMessage::Control(cc) => self.record_control(*cc),
            MidiMessage::Other(raw) => {
                let channel = message.channel();
                let key = match (raw.tag(), channel) {
                    (0xE0, Some(channel)) => ControllerKey::PitchWheel(channel),
                    (0xD0, Some(channel)) => ControllerKey::ChannelPressure(channel),
                    (0xA0, Some(channel)) => {
                        ControllerKey::KeyPressure(channel, raw.bytes().get(1).copied().unwrap_or(0))
                    }
                    (0xC0, Some(channel)) => ControllerKey::Program(channel),
                    _ => ControllerKey::Status(raw.status()),
                };
                self.upsert(key, vec![message.clone()]);
            }
            MidiMessage::Extended(ext) => {
                self.upsert(ControllerKey::Extended(ext.bytes().into()), vec![message.clone()]);
            }
            MidiMessage::NoteOn(_) | MidiMessage::NoteOff(_) => {}
        }
    }

    fn record_control(&mut self, cc: ControlChange) {
        let channel = cc.channel();
        let value = cc.value();
        match cc.controller() {
            RPN_MSB | NRPN_MSB => {
                let registered = cc.controller() == RPN_MSB;
                let address = self.addresses.entry(channel).or_default();
                if address.registered != registered {
                    address.lsb = None;
                }
                address.registered = registered;
                address.msb = Some(value);
            }
            RPN_LSB | NRPN_LSB => {
                let registered = cc.controller() == RPN_LSB;
                let address = self.addresses.entry(channel).or_default();
                if address.registered != registered {
                    address.msb = None;
                }
                address.registered = registered;
                address.lsb = Some(value);
            }
            DATA_ENTRY_MSB | DATA_ENTRY_LSB => {
                let address = self.addresses.get(&channel).copied().unwrap_or_default();
                match (address.msb, address.lsb) {
                    (Some(msb), Some(lsb)) => {
                        self.record_parameter(channel, address.registered, msb, lsb, cc)
                    }
                    _ => self.upsert(
                        ControllerKey::Control {
                            channel,
                            controller: cc.controller(),
                        },
                        vec![cc.into()],
                    ),
                }
            }
            controller => self.upsert(
                ControllerKey::Control {
                    channel,
                    controller,
                },
                vec![cc.into()],
            ),
        }
    }

    fn record_parameter(
        &mut self,
        channel: MidiChannel,
        registered: bool,
        msb: u8,
        lsb: u8,
        data: ControlChange,
    ) {
        let key = ControllerKey::Parameter {
            channel,
            registered,
            msb,
            lsb,
        };
        // Coarse and fine values are set independently.
        let previous = |controller: u8| {
            self.index.get(&key).and_then(|&idx| {
                self.entries[idx].1.iter().cloned().find(|msg| {
                    matches!(msg, MidiMessage::Control(cc) if cc.controller() == controller)
                })
            })
        };
        let (coarse, fine) = if data.controller() == DATA_ENTRY_MSB {
            (Some(data.into()), previous(DATA_ENTRY_LSB))
        } else {
            (previous(DATA_ENTRY_MSB), Some(data.into()))
        };
        let unit = ParameterAddress::full(registered, msb, lsb)
            .select(channel)
            .chain(coarse)
            .chain(fine)
            .collect();
        self.upsert(key, unit);
    }

    fn upsert(&mut self, key: ControllerKey, messages: Vec<MidiMessage>) {
        match self.index.get(&key) {
            Some(&idx) => self.entries[idx].1 = messages,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, messages));
            }
        }
    }

    /// The collected messages, in the order their controllers were first
    /// seen, followed by any address selection the replay would otherwise
    /// leave changed.
    pub fn messages(&self) -> Vec<MidiMessage> {
        let mut selected = BTreeMap::new();
        let mut messages = Vec::new();
        for (key, unit) in &self.entries {
            if let ControllerKey::Parameter {
                channel,
                registered,
                msb,
                lsb,
            } = *key
            {
                selected.insert(channel, ParameterAddress::full(registered, msb, lsb));
            }
            messages.extend(unit.iter().cloned());
        }
        for (channel, address) in &self.addresses {
            if selected.get(channel) != Some(address) {
                messages.extend(address.select(*channel));
            }
        }
        messages
    }
}

impl<'a> std::iter::FromIterator<&'a MidiMessage> for ControllerSnapshot {
    fn from_iter<I: IntoIterator<Item = &'a MidiMessage>>(iter: I) -> Self {
        let mut snapshot = ControllerSnapshot::new();
        for message in iter {
            snapshot.record(message);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{ControllerKind, PAN, VOLUME};

    fn cc(controller: u8, value: u8) -> MidiMessage {
        ControlChange::new(MidiChannel::default(), controller, value)
            .unwrap()
            .into()
    }

    fn bytes(messages: &[MidiMessage]) -> Vec<Vec<u8>> {
        messages.iter().map(MidiMessage::bytes).collect()
    }

    #[test]
    fn test_latest_value_wins() {
        let stream = vec![
            cc(PAN, 10),
            MidiMessage::from_bytes(&[0x90, 60, 100]).unwrap(),
            cc(VOLUME, 90),
            MidiMessage::from_bytes(&[0xC0, 3]).unwrap(),
            cc(PAN, 70),
            MidiMessage::from_bytes(&[0x80, 60, 64]).unwrap(),
            ControllerKind::PitchWheel.message(MidiChannel::default(), 20, None),
            MidiMessage::from_bytes(&[0xC0, 5]).unwrap(),
        ];
        let snapshot: ControllerSnapshot = stream.iter().collect();
        assert_eq!(
            vec![
                vec![0xB0, PAN, 70],
                vec![0xB0, VOLUME, 90],
                vec![0xC0, 5],
                vec![0xE0, 20, 20],
            ],
            bytes(&snapshot.messages())
        );
    }

    #[test]
    fn test_channels_are_separate() {
        let other = MidiChannel::from_raw(1).unwrap();
        let stream = vec![
            cc(PAN, 10),
            ControlChange::new(other, PAN, 20).unwrap().into(),
        ];
        let snapshot: ControllerSnapshot = stream.iter().collect();
        assert_eq!(2, snapshot.messages().len());
    }

    #[test]
    fn test_parameter_units() {
        let stream = vec![
            // Pitch bend sensitivity, 2 semitones.
            cc(RPN_MSB, 0),
            cc(RPN_LSB, 0),
            cc(DATA_ENTRY_MSB, 2),
            // Fine tuning.
            cc(RPN_MSB, 0),
            cc(RPN_LSB, 1),
            cc(DATA_ENTRY_MSB, 64),
            // Pitch bend sensitivity again, 12 semitones and 50 cents.
            cc(RPN_MSB, 0),
            cc(RPN_LSB, 0),
            cc(DATA_ENTRY_MSB, 12),
            cc(DATA_ENTRY_LSB, 50),
        ];
        let snapshot: ControllerSnapshot = stream.iter().collect();
        assert_eq!(
            vec![
                vec![0xB0, RPN_MSB, 0],
                vec![0xB0, RPN_LSB, 0],
                vec![0xB0, DATA_ENTRY_MSB, 12],
                vec![0xB0, DATA_ENTRY_LSB, 50],
                vec![0xB0, RPN_MSB, 0],
                vec![0xB0, RPN_LSB, 1],
                vec![0xB0, DATA_ENTRY_MSB, 64],
                vec![0xB0, RPN_MSB, 0],
                vec![0xB0, RPN_LSB, 0],
            ],
            bytes(&snapshot.messages())
        );
    }

    #[test]
    fn test_fine_then_coarse_keeps_both() {
        let stream = vec![
            cc(NRPN_MSB, 1),
            cc(NRPN_LSB, 8),
            cc(DATA_ENTRY_LSB, 30),
            cc(DATA_ENTRY_MSB, 90),
        ];
        let snapshot: ControllerSnapshot = stream.iter().collect();
        assert_eq!(
            vec![
                vec![0xB0, NRPN_MSB, 1],
                vec![0xB0, NRPN_LSB, 8],
                vec![0xB0, DATA_ENTRY_MSB, 90],
                vec![0xB0, DATA_ENTRY_LSB, 30],
            ],
            bytes(&snapshot.messages())
        );
    }

    #[test]
    fn test_selection_without_data_is_kept() {
        let stream = vec![
            cc(RPN_MSB, 0),
            cc(RPN_LSB, 0),
            cc(DATA_ENTRY_MSB, 2),
            cc(NRPN_MSB, 5),
        ];
        let snapshot: ControllerSnapshot = stream.iter().collect();
        assert_eq!(
            vec![
                vec![0xB0, RPN_MSB, 0],
                vec![0xB0, RPN_LSB, 0],
                vec![0xB0, DATA_ENTRY_MSB, 2],
                vec![0xB0, NRPN_MSB, 5],
            ],
            bytes(&snapshot.messages())
        );
    }

    #[test]
    fn test_data_entry_without_address() {
        let snapshot: ControllerSnapshot = vec![cc(DATA_ENTRY_MSB, 1), cc(DATA_ENTRY_MSB, 2)]
            .iter()
            .collect();
        assert_eq!(vec![vec![0xB0, DATA_ENTRY_MSB, 2]], bytes(&snapshot.messages()));
    }
}
