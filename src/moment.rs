use crate::midi::MidiMessage;

/// A batch of messages that are sent at the same instant.
///
/// The messages are always stored in the order note-offs, switches
/// (discrete controls), continuous envelope values, note-ons, so that an
/// instant shared by two notes releases the old sound and updates the
/// controllers before the new sound starts.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Moment {
    offset_in_object: u32,
    duration_to_next: u32,
    messages: Vec<MidiMessage>,
    /// End indices of the note-off, switch and envelope groups in `messages`.
    bounds: [usize; 3],
}

impl Moment {
    /// The offset of this moment from the start of its `MidiObject`, in ms.
    pub fn offset_in_object(&self) -> u32 {
        self.offset_in_object
    }

    /// The time between this moment and the next one in the same object
    /// (or the end of the object for the last moment).
    pub fn duration_to_next(&self) -> u32 {
        self.duration_to_next
    }

    pub fn messages(&self) -> &[MidiMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn note_offs(&self) -> &[MidiMessage] {
        &self.messages[..self.bounds[0]]
    }

    pub fn switches(&self) -> &[MidiMessage] {
        &self.messages[self.bounds[0]..self.bounds[1]]
    }

    pub fn envelope(&self) -> &[MidiMessage] {
        &self.messages[self.bounds[1]..self.bounds[2]]
    }

    pub fn note_ons(&self) -> &[MidiMessage] {
        &self.messages[self.bounds[2]..]
    }
}

/// The message groups of a `Moment` that is still being assembled.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct MomentBuilder {
    pub note_offs: Vec<MidiMessage>,
    pub switches: Vec<MidiMessage>,
    pub envelope: Vec<MidiMessage>,
    pub note_ons: Vec<MidiMessage>,
}

impl MomentBuilder {
    /// Appends every group of `other` to the matching group of `self`.
    pub fn absorb(&mut self, other: MomentBuilder) {
        self.note_offs.extend(other.note_offs);
        self.switches.extend(other.switches);
        self.envelope.extend(other.envelope);
        self.note_ons.extend(other.note_ons);
    }

    pub fn build(self, offset_in_object: u32, duration_to_next: u32) -> Moment {
        let first = self.note_offs.len();
        let second = first + self.switches.len();
        let third = second + self.envelope.len();
        let mut messages = self.note_offs;
        messages.reserve(self.switches.len() + self.envelope.len() + self.note_ons.len());
        messages.extend(self.switches);
        messages.extend(self.envelope);
        messages.extend(self.note_ons);
        Moment {
            offset_in_object,
            duration_to_next,
            messages,
            bounds: [first, second, third],
        }
    }
}
