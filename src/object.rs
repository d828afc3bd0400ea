use crate::config::ScoreConfig;
use crate::midi::{MessageCategory, MidiChannel, MidiMessage};
use crate::moment::{Moment, MomentBuilder};
use std::collections::BTreeMap;
use thiserror::*;

mod envelope;
pub use envelope::*;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ObjectError {
    #[error("Duration of {duration} ms is shorter than the minimum of {minimum} ms.")]
    DegenerateDuration { duration: u32, minimum: u32 },

    #[error("Moment at offset {offset} ms lies past the end of a {duration} ms object.")]
    MomentOutOfRange { offset: u32, duration: u32 },

    #[error("Moment at offset {offset} ms has a {found:?} message in its {group} group.")]
    MisplacedMessage {
        offset: u32,
        group: &'static str,
        found: MessageCategory,
    },

    #[error("Malformed {controller:?} envelope: {fault}.")]
    MalformedEnvelope {
        controller: crate::midi::ControllerKind,
        fault: EnvelopeFault,
    },
}

/// Whether an object sounds.
///
/// A rest has no note messages but may still carry envelopes, for example
/// a pedal held over the rest.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    Chord,
    Rest,
}

/// The discrete messages of one instant, as delivered by the score loader.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MomentRecord {
    pub offset_ms: u32,
    pub note_offs: Vec<MidiMessage>,
    pub switches: Vec<MidiMessage>,
    pub note_ons: Vec<MidiMessage>,
}

impl MomentRecord {
    pub fn new(offset_ms: u32) -> Self {
        MomentRecord {
            offset_ms,
            ..MomentRecord::default()
        }
    }

    fn into_builder(self) -> Result<MomentBuilder, ObjectError> {
        let offset = self.offset_ms;
        check_group(offset, "note-off", &self.note_offs, |cat| {
            cat == MessageCategory::NoteOff
        })?;
        check_group(offset, "switch", &self.switches, |cat| {
            cat == MessageCategory::Control || cat == MessageCategory::Other
        })?;
        check_group(offset, "note-on", &self.note_ons, |cat| {
            cat == MessageCategory::NoteOn
        })?;
        Ok(MomentBuilder {
            note_offs: self.note_offs,
            switches: self.switches,
            envelope: Vec::new(),
            note_ons: self.note_ons,
        })
    }
}

fn check_group(
    offset: u32,
    group: &'static str,
    messages: &[MidiMessage],
    allowed: impl Fn(MessageCategory) -> bool,
) -> Result<(), ObjectError> {
    match messages
        .iter()
        .map(MidiMessage::category)
        .find(|cat| !allowed(*cat))
    {
        Some(found) => Err(ObjectError::MisplacedMessage {
            offset,
            group,
            found,
        }),
        None => Ok(()),
    }
}

/// Playback position inside a `MidiObject`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MomentCursor {
    /// The moment at this index is the next one to be played.
    Active(usize),
    /// Every moment of the object has been played.
    Ended,
}

/// A chord or a rest: an ordered list of `Moment`s with a fixed duration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MidiObject {
    kind: ObjectKind,
    moments: Vec<Moment>,
    duration_in_score: u32,
    position_in_score: u32,
    cursor: MomentCursor,
}

impl MidiObject {
    /// Flattens the note moments and the controller envelopes of one object
    /// into its moment list.
    ///
    /// Every envelope is sampled on the controller update grid, values are
    /// only sent when they change or a new vertex span starts, vertices off
    /// the grid get a moment of their own, and the resulting points are
    /// merged into the note moments by offset. Points landing on an existing
    /// moment join its envelope group.
    pub fn new(
        kind: ObjectKind,
        channel: MidiChannel,
        duration_ms: u32,
        note_moments: Vec<MomentRecord>,
        envelopes: &[Envelope],
        config: &ScoreConfig,
    ) -> Result<MidiObject, ObjectError> {
        if duration_ms < config.min_duration_ms.max(1) {
            return Err(ObjectError::DegenerateDuration {
                duration: duration_ms,
                minimum: config.min_duration_ms.max(1),
            });
        }

        let mut builders: BTreeMap<u32, MomentBuilder> = BTreeMap::new();
        builders.insert(0, MomentBuilder::default());
        for record in note_moments {
            if record.offset_ms > duration_ms {
                return Err(ObjectError::MomentOutOfRange {
                    offset: record.offset_ms,
                    duration: duration_ms,
                });
            }
            let offset = record.offset_ms;
            let builder = record.into_builder()?;
            builders.entry(offset).or_default().absorb(builder);
        }

        let mut insertions = Vec::new();
        for envelope in envelopes {
            envelope
                .validate(duration_ms)
                .map_err(|fault| ObjectError::MalformedEnvelope {
                    controller: envelope.controller,
                    fault,
                })?;
            insertions.extend(envelope.sample(
                channel,
                duration_ms,
                config.controller_update_interval_ms,
            ));
        }
        for point in insertions {
            let builder = builders.entry(point.offset).or_default();
            if let Some(message) = point.message {
                builder.envelope.push(message);
            }
        }

        let offsets: Vec<u32> = builders.keys().copied().collect();
        let moments = builders
            .into_iter()
            .enumerate()
            .map(|(idx, (offset, builder))| {
                let next = offsets.get(idx + 1).copied().unwrap_or(duration_ms);
                builder.build(offset, next - offset)
            })
            .collect();

        Ok(MidiObject {
            kind,
            moments,
            duration_in_score: duration_ms,
            position_in_score: 0,
            cursor: MomentCursor::Active(0),
        })
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn moments(&self) -> &[Moment] {
        &self.moments
    }

    pub fn duration_in_score(&self) -> u32 {
        self.duration_in_score
    }

    pub fn position_in_score(&self) -> u32 {
        self.position_in_score
    }

    pub fn end_in_score(&self) -> u32 {
        self.position_in_score + self.duration_in_score
    }

    pub(crate) fn set_position_in_score(&mut self, position: u32) {
        self.position_in_score = position;
    }

    /// Whether `ms_position` falls inside this object. An object ending
    /// exactly at `ms_position` does not contain it.
    pub fn contains(&self, ms_position: u32) -> bool {
        self.position_in_score <= ms_position && ms_position < self.end_in_score()
    }

    /// Whether the moment at `moment_idx` is the zero-length moment placed
    /// exactly at the object's end (typically its note-offs).
    pub fn is_tail(&self, moment_idx: usize) -> bool {
        self.moments
            .get(moment_idx)
            .map(|moment| moment.offset_in_object() == self.duration_in_score)
            .unwrap_or(false)
    }

    pub fn cursor(&self) -> MomentCursor {
        self.cursor
    }

    pub fn current_moment(&self) -> Option<&Moment> {
        match self.cursor {
            MomentCursor::Active(idx) => self.moments.get(idx),
            MomentCursor::Ended => None,
        }
    }

    /// Absolute score position of the current moment.
    pub fn current_ms_position(&self) -> Option<u32> {
        self.current_moment()
            .map(|moment| self.position_in_score + moment.offset_in_object())
    }

    pub fn set_to_start(&mut self) {
        self.cursor = MomentCursor::Active(0);
    }

    pub(crate) fn set_cursor(&mut self, cursor: MomentCursor) {
        self.cursor = match cursor {
            MomentCursor::Active(idx) if idx >= self.moments.len() => MomentCursor::Ended,
            other => other,
        };
    }

    /// Index of the first moment at or after the absolute `ms_position`.
    pub fn first_moment_at_or_after(&self, ms_position: u32) -> Option<usize> {
        let relative = ms_position.saturating_sub(self.position_in_score);
        self.moments
            .iter()
            .position(|moment| moment.offset_in_object() >= relative)
    }

    /// Moves the cursor to the first moment at or after `ms_position`.
    pub fn seek(&mut self, ms_position: u32) -> Option<usize> {
        let found = self.first_moment_at_or_after(ms_position);
        self.cursor = match found {
            Some(idx) => MomentCursor::Active(idx),
            None => MomentCursor::Ended,
        };
        found
    }

    /// Steps to the next moment, returning it, or `None` once the object
    /// has no moments left.
    pub fn advance_moment(&mut self) -> Option<&Moment> {
        let next = match self.cursor {
            MomentCursor::Active(idx) if idx + 1 < self.moments.len() => {
                MomentCursor::Active(idx + 1)
            }
            _ => MomentCursor::Ended,
        };
        self.cursor = next;
        self.current_moment()
    }
}
