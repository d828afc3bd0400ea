//! Scheduling core for performing a score over MIDI.
//!
//! A score is a set of `Track`s, one per channel, each an ordered run of
//! chords and rests (`MidiObject`s). Every object is flattened once, at load
//! time, into `Moment`s: instants carrying the note and controller messages
//! to send together. A `Performance` walks all tracks in step through a
//! sequence of possibly repeated regions and hands out the moments that fall
//! due.

mod utils;

pub mod config;
pub mod midi;
pub mod moment;
pub mod object;
pub mod performance;
pub mod region;
pub mod score;
pub mod track;

pub use config::{ConfigError, ScoreConfig};
pub use midi::{MidiChannel, MidiMessage};
pub use moment::Moment;
pub use object::{Envelope, MidiObject, MomentRecord, ObjectError, ObjectKind, Vertex};
pub use performance::{Performance, PerformanceError, PerformanceState, ScheduledMoment, TrackInit};
pub use region::{OutputSpan, RegionDef, RegionError, RegionSequence};
pub use score::{ObjectRecord, Score, ScoreError, TrackRecord};
pub use track::Track;

/// Score position reported by a track with nothing left to play.
pub const END_OF_TRACK: u32 = u32::MAX;
