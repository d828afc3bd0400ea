use crate::midi::{MidiChannel, MidiMessage};
use crate::moment::Moment;
use crate::object::{MidiObject, MomentCursor};
use crate::region::{NextRegion, OutputSpan, RegionEntry, RegionLink};
use crate::END_OF_TRACK;
use tracing::{debug, trace, warn};

mod cursor;
pub use cursor::*;

mod init;
pub use init::*;

/// The ordered, contiguous objects played on one channel, together with
/// the navigation state of the current performance.
#[derive(Debug, Clone)]
pub struct Track {
    channel: MidiChannel,
    objects: Vec<MidiObject>,
    region_links: Vec<RegionLink>,
    region_index: usize,
    cursor: TrackCursor,
    start_marker: Option<StartMarker>,
    has_ended_region: bool,
    /// Set while the current moment is the tail of an object cut off by the
    /// region end; the tail is played at that end instead.
    cut_tail_at: Option<u32>,
}

impl Track {
    /// Lays `objects` end to end from position 0.
    pub fn new(channel: MidiChannel, objects: Vec<MidiObject>) -> Self {
        let mut objects = objects;
        let mut position = 0u32;
        for object in objects.iter_mut() {
            object.set_position_in_score(position);
            object.set_to_start();
            position = position.saturating_add(object.duration_in_score());
        }
        let cursor = if objects.is_empty() {
            TrackCursor::Ended
        } else {
            TrackCursor::Active { object_index: 0 }
        };
        Track {
            channel,
            objects,
            region_links: Vec::new(),
            region_index: 0,
            cursor,
            start_marker: None,
            has_ended_region: false,
            cut_tail_at: None,
        }
    }

    pub fn channel(&self) -> MidiChannel {
        self.channel
    }

    pub fn objects(&self) -> &[MidiObject] {
        &self.objects
    }

    /// Score position at which the last object ends.
    pub fn end_in_score(&self) -> u32 {
        self.objects
            .last()
            .map(MidiObject::end_in_score)
            .unwrap_or(0)
    }

    pub fn cursor(&self) -> TrackCursor {
        self.cursor
    }

    pub fn region_links(&self) -> &[RegionLink] {
        &self.region_links
    }

    /// Index, within the current output span, of the region being played.
    pub fn region_index(&self) -> usize {
        self.region_index
    }

    pub fn start_marker(&self) -> Option<StartMarker> {
        self.start_marker
    }

    /// Whether the current moment lies past the end of the current region.
    /// Always true once the track has nothing left to play.
    pub fn has_ended_region(&self) -> bool {
        self.has_ended_region
    }

    pub fn current_moment(&self) -> Option<&Moment> {
        let object_index = self.cursor.object_index()?;
        self.objects[object_index].current_moment()
    }

    /// Object and moment index of the current moment.
    pub fn current_indices(&self) -> Option<(usize, usize)> {
        let object_index = self.cursor.object_index()?;
        match self.objects[object_index].cursor() {
            MomentCursor::Active(moment_index) => Some((object_index, moment_index)),
            MomentCursor::Ended => None,
        }
    }

    /// Absolute score position of the current moment, or `END_OF_TRACK`.
    ///
    /// The tail of an object that runs past the end of the current region
    /// is reported at the region end, where it is played.
    pub fn current_ms_position(&self) -> u32 {
        if let Some(region_end) = self.cut_tail_at {
            return region_end;
        }
        self.cursor
            .object_index()
            .and_then(|idx| self.objects[idx].current_ms_position())
            .unwrap_or(END_OF_TRACK)
    }

    /// Prepares the track for a performance of `span`.
    ///
    /// Builds the region link table, moves the cursor to the first moment
    /// at or after the span's start and returns the messages that put a
    /// receiver into the controller state the score has reached by then.
    pub fn set_output_span(&mut self, span: &OutputSpan) -> Vec<MidiMessage> {
        let regions = span.regions();
        self.region_links = regions
            .iter()
            .enumerate()
            .map(|(idx, region)| {
                let next = match regions.get(idx + 1) {
                    None => NextRegion::Final,
                    Some(next) => match self.playable_from(next.start_ms, next.end_ms) {
                        Some((object_index, moment_index)) => NextRegion::Enter(RegionEntry {
                            object_index,
                            moment_index,
                            object_count: self.objects[object_index..]
                                .iter()
                                .take_while(|obj| obj.position_in_score() < next.end_ms)
                                .count(),
                        }),
                        None => NextRegion::Silent,
                    },
                };
                RegionLink {
                    end_of_region_ms: region.end_ms,
                    next,
                }
            })
            .collect();

        let start = span.start_ms();
        let first_end = regions[0].end_ms;
        let marker = match self.playable_from(start, first_end) {
            Some((object_index, moment_index)) => StartMarker::At {
                object_index,
                moment_index,
            },
            None => {
                debug!(
                    "Channel {} has nothing to play between {} and {} ms.",
                    self.channel.as_u8(),
                    start,
                    first_end
                );
                StartMarker::Silent
            }
        };
        if let StartMarker::At { object_index, .. } = marker {
            for object in self.objects[object_index + 1..]
                .iter_mut()
                .take_while(|obj| obj.position_in_score() < first_end)
            {
                object.set_to_start();
            }
        }
        let silent_throughout = marker == StartMarker::Silent
            && self
                .region_links
                .iter()
                .all(|link| !matches!(link.next, NextRegion::Enter(_)));
        if silent_throughout && !self.objects.is_empty() {
            warn!(
                "Channel {} has nothing to play from {} ms on.",
                self.channel.as_u8(),
                start
            );
        }
        self.start_marker = Some(marker);
        self.apply_start_marker(marker);

        let init = self.init_messages(start);
        debug!(
            "Channel {}: output span {}..{} ms over {} regions, {} init messages.",
            self.channel.as_u8(),
            start,
            span.end_ms(),
            regions.len(),
            init.len()
        );
        init
    }

    /// Latest value per controller over every moment strictly before
    /// `ms_position`.
    pub fn init_messages(&self, ms_position: u32) -> Vec<MidiMessage> {
        let mut snapshot = ControllerSnapshot::new();
        for object in self
            .objects
            .iter()
            .take_while(|obj| obj.position_in_score() < ms_position)
        {
            for moment in object
                .moments()
                .iter()
                .take_while(|m| object.position_in_score() + m.offset_in_object() < ms_position)
            {
                for message in moment.messages() {
                    snapshot.record(message);
                }
            }
        }
        snapshot.messages()
    }

    /// Steps to the next moment, moving into the following object once the
    /// current one is exhausted.
    pub fn advance_current_moment(&mut self) {
        let object_index = match self.cursor {
            TrackCursor::Active { object_index } => object_index,
            TrackCursor::Ended => return,
        };
        self.cut_tail_at = None;
        if self.objects[object_index].advance_moment().is_none() {
            let next = object_index + 1;
            if next < self.objects.len() {
                self.objects[next].set_to_start();
                self.cursor = TrackCursor::Active { object_index: next };
                trace!(
                    "Channel {} moved to object {} at {} ms.",
                    self.channel.as_u8(),
                    next,
                    self.objects[next].position_in_score()
                );
            } else {
                self.cursor = TrackCursor::Ended;
            }
        }
        self.update_region_state();
    }

    /// Enters the region following `finished_region` using the precomputed
    /// link.
    ///
    /// # Panics
    ///
    /// If `finished_region` is beyond the link table or is the last region
    /// of the span.
    pub fn move_to_next_region(&mut self, finished_region: usize) {
        let link = *self.region_links.get(finished_region).unwrap_or_else(|| {
            panic!(
                "region {} is beyond the {} regions of the output span",
                finished_region,
                self.region_links.len()
            )
        });
        self.region_index = finished_region + 1;
        self.has_ended_region = false;
        self.cut_tail_at = None;
        match link.next {
            NextRegion::Final => panic!(
                "region {} is the last region of the output span",
                finished_region
            ),
            NextRegion::Silent => {
                self.cursor = TrackCursor::Ended;
                self.has_ended_region = true;
            }
            NextRegion::Enter(entry) => {
                self.objects[entry.object_index].set_cursor(MomentCursor::Active(entry.moment_index));
                let rest = entry.object_index + 1..entry.object_index + entry.object_count;
                for object in self.objects[rest].iter_mut() {
                    object.set_to_start();
                }
                self.cursor = TrackCursor::Active {
                    object_index: entry.object_index,
                };
            }
        }
        trace!(
            "Channel {} entered region {} at {} ms.",
            self.channel.as_u8(),
            self.region_index,
            self.current_ms_position()
        );
    }

    /// Rewinds every object and the cursor to the very beginning of the
    /// track, as it was right after construction.
    pub fn set_to_first_region(&mut self) {
        for object in self.objects.iter_mut() {
            object.set_to_start();
        }
        self.cursor = if self.objects.is_empty() {
            TrackCursor::Ended
        } else {
            TrackCursor::Active { object_index: 0 }
        };
        self.region_index = 0;
        self.has_ended_region = false;
        self.cut_tail_at = None;
    }

    /// Returns to the start of the current output span without searching
    /// the track again.
    ///
    /// # Panics
    ///
    /// If `set_output_span` was never called.
    pub fn reset_to_start_marker(&mut self) {
        let marker = self
            .start_marker
            .expect("reset_to_start_marker called before set_output_span");
        self.apply_start_marker(marker);
    }

    fn apply_start_marker(&mut self, marker: StartMarker) {
        self.region_index = 0;
        self.cut_tail_at = None;
        match marker {
            StartMarker::At {
                object_index,
                moment_index,
            } => {
                self.objects[object_index].set_cursor(MomentCursor::Active(moment_index));
                self.cursor = TrackCursor::Active { object_index };
                self.has_ended_region = false;
            }
            StartMarker::Silent => {
                self.cursor = TrackCursor::Ended;
                self.has_ended_region = true;
            }
        }
    }

    fn current_region_end(&self) -> u32 {
        self.region_links
            .get(self.region_index)
            .map(|link| link.end_of_region_ms)
            .unwrap_or(END_OF_TRACK)
    }

    fn update_region_state(&mut self) {
        let region_end = self.current_region_end();
        self.has_ended_region = match self.cursor {
            TrackCursor::Ended => true,
            TrackCursor::Active { object_index } => match self.objects[object_index].cursor() {
                MomentCursor::Active(moment_index) => {
                    !self.in_region(object_index, moment_index, region_end)
                        && !self.cut_tail(object_index, region_end)
                }
                MomentCursor::Ended => true,
            },
        };
    }

    /// Moves the cursor to the tail of an object that started inside the
    /// region but ends after it, so its note-offs are still sent at the
    /// region end. Moments between the region end and the tail are skipped.
    fn cut_tail(&mut self, object_index: usize, region_end: u32) -> bool {
        let object = &self.objects[object_index];
        let tail = match object.moments().len().checked_sub(1) {
            Some(tail) if object.is_tail(tail) => tail,
            _ => return false,
        };
        if object.position_in_score() >= region_end
            || object.end_in_score() <= region_end
            || object.moments()[tail].is_empty()
        {
            return false;
        }
        self.objects[object_index].set_cursor(MomentCursor::Active(tail));
        self.cut_tail_at = Some(region_end);
        trace!(
            "Channel {} cut object {} short at {} ms.",
            self.channel.as_u8(),
            object_index,
            region_end
        );
        true
    }

    /// Whether a moment still belongs to a region ending at `region_end`.
    /// The tail of an object that started inside the region is played at
    /// the boundary so that no note is left sounding.
    fn in_region(&self, object_index: usize, moment_index: usize, region_end: u32) -> bool {
        let object = &self.objects[object_index];
        let position =
            object.position_in_score() + object.moments()[moment_index].offset_in_object();
        position < region_end
            || (position == region_end
                && object.is_tail(moment_index)
                && object.position_in_score() < region_end)
    }

    /// First moment at or after `start` whose object has not yet ended.
    fn first_moment_from(&self, start: u32) -> Option<(usize, usize)> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.end_in_score() > start)
            .find_map(|(idx, object)| {
                object
                    .first_moment_at_or_after(start)
                    .map(|moment_idx| (idx, moment_idx))
            })
    }

    /// The first moment at or after `start`, provided some moment carrying
    /// messages follows it before `end`.
    fn playable_from(&self, start: u32, end: u32) -> Option<(usize, usize)> {
        let (first_object, first_moment) = self.first_moment_from(start)?;
        for (object_index, object) in self.objects.iter().enumerate().skip(first_object) {
            let skip = if object_index == first_object {
                first_moment
            } else {
                0
            };
            for (moment_index, moment) in object.moments().iter().enumerate().skip(skip) {
                if !self.in_region(object_index, moment_index, end) {
                    return None;
                }
                if !moment.is_empty() {
                    return Some((first_object, first_moment));
                }
            }
        }
        None
    }
}
