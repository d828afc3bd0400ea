use crate::midi::MidiMessage;
use crate::moment::Moment;
use crate::region::{OutputSpan, RegionSequence, RegionSpan};
use crate::track::Track;
use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use thiserror::*;
use tracing::{debug, info};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PerformanceState {
    Stopped,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum PerformanceError {
    #[error("Cannot play from {start_ms} ms to {end_ms} ms: the start must come before the end.")]
    EmptySpan { start_ms: u32, end_ms: u32 },
    #[error("Start position {0} ms lies after the last region.")]
    StartAfterRegions(u32),
    #[error("The performance has not been started.")]
    NotStarted,
    #[error("Not possible while the performance is {0:?}.")]
    WrongState(PerformanceState),
    #[error("There is no track {0}.")]
    NoSuchTrack(usize),
}

/// Messages a track sends before its first moment, so that the receiver
/// starts from the controller state the score has reached.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrackInit {
    pub track: usize,
    pub messages: Vec<MidiMessage>,
}

/// A moment due at `time_ms` ms of performance time.
///
/// The moment itself stays in its track; look it up with
/// `Performance::moment`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ScheduledMoment {
    pub time_ms: u64,
    pub track: usize,
    pub object_index: usize,
    pub moment_index: usize,
}

/// One performance of a loaded score: the tracks, which of them are
/// heard, and the position in the region sequence.
///
/// Time is supplied by the caller as milliseconds since the performance
/// started; while paused the caller's clock must not advance.
#[derive(Debug, Clone)]
pub struct Performance {
    tracks: Vec<Track>,
    track_on: Vec<bool>,
    regions: RegionSequence,
    span: Option<OutputSpan>,
    region_index: usize,
    region_offset_ms: u64,
    init_messages: Vec<TrackInit>,
    state: PerformanceState,
}

impl Performance {
    pub fn new(tracks: Vec<Track>, regions: RegionSequence) -> Self {
        Performance {
            track_on: vec![true; tracks.len()],
            tracks,
            regions,
            span: None,
            region_index: 0,
            region_offset_ms: 0,
            init_messages: Vec::new(),
            state: PerformanceState::Stopped,
        }
    }

    pub fn state(&self) -> PerformanceState {
        self.state
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn span(&self) -> Option<&OutputSpan> {
        self.span.as_ref()
    }

    /// Index of the region being played within the current span.
    pub fn region_index(&self) -> usize {
        self.region_index
    }

    /// Total length of the current span in performance time.
    pub fn duration_ms(&self) -> u64 {
        self.span.as_ref().map(OutputSpan::duration_ms).unwrap_or(0)
    }

    pub fn is_track_on(&self, track: usize) -> bool {
        self.track_on.get(track).copied().unwrap_or(false)
    }

    /// Mutes or unmutes a track. A muted track keeps its place but its
    /// moments are not scheduled.
    pub fn set_track_on(&mut self, track: usize, on: bool) -> Result<(), PerformanceError> {
        let flag = self
            .track_on
            .get_mut(track)
            .ok_or(PerformanceError::NoSuchTrack(track))?;
        *flag = on;
        debug!("Track {} is now {}.", track, if on { "on" } else { "off" });
        Ok(())
    }

    /// Prepares every track to play from `start_ms` to `end_ms` (score
    /// positions) and returns the messages to send before the first batch.
    pub fn start(
        &mut self,
        start_ms: u32,
        end_ms: u32,
    ) -> Result<Vec<TrackInit>, PerformanceError> {
        match self.state {
            PerformanceState::Stopped | PerformanceState::Finished => {}
            other => return Err(PerformanceError::WrongState(other)),
        }
        if start_ms >= end_ms {
            return Err(PerformanceError::EmptySpan { start_ms, end_ms });
        }
        if self
            .regions
            .instances()
            .iter()
            .all(|def| def.end_ms <= start_ms)
        {
            return Err(PerformanceError::StartAfterRegions(start_ms));
        }

        let span = self.regions.output_span(start_ms, end_ms);
        self.init_messages = self
            .tracks
            .iter_mut()
            .enumerate()
            .map(|(track, data)| TrackInit {
                track,
                messages: data.set_output_span(&span),
            })
            .collect();
        info!(
            "Starting performance: {}..{} ms, {} regions, {} ms long.",
            span.start_ms(),
            span.end_ms(),
            span.regions().len(),
            span.duration_ms()
        );
        self.span = Some(span);
        self.region_index = 0;
        self.region_offset_ms = 0;
        self.state = PerformanceState::Running;
        Ok(self.audible_inits())
    }

    fn audible_inits(&self) -> Vec<TrackInit> {
        self.init_messages
            .iter()
            .filter(|init| self.is_track_on(init.track) && !init.messages.is_empty())
            .cloned()
            .collect()
    }

    fn current_region(&self) -> Option<RegionSpan> {
        self.span
            .as_ref()
            .and_then(|span| span.regions().get(self.region_index))
            .copied()
    }

    /// Advances the performance up to and including `performance_ms`,
    /// returning the moments that fall due, in playing order.
    ///
    /// Moments at the same score position on different tracks are
    /// scheduled together before any later moment. The batch lives in
    /// `bump`, which the caller may reset once the batch is consumed.
    pub fn step_until<'b>(
        &mut self,
        performance_ms: u64,
        bump: &'b Bump,
    ) -> BumpVec<'b, ScheduledMoment> {
        let mut batch = BumpVec::new_in(bump);
        if self.state != PerformanceState::Running {
            return batch;
        }
        while let Some(region) = self.current_region() {
            let next = self
                .tracks
                .iter()
                .filter(|track| !track.has_ended_region())
                .map(Track::current_ms_position)
                .min();
            match next {
                Some(position) => {
                    let time_ms =
                        self.region_offset_ms + u64::from(position.saturating_sub(region.start_ms));
                    if time_ms > performance_ms {
                        break;
                    }
                    for (idx, track) in self.tracks.iter_mut().enumerate() {
                        if track.has_ended_region() || track.current_ms_position() != position {
                            continue;
                        }
                        let audible = self.track_on[idx]
                            && track.current_moment().map_or(false, |m| !m.is_empty());
                        if let (true, Some((object_index, moment_index))) =
                            (audible, track.current_indices())
                        {
                            batch.push(ScheduledMoment {
                                time_ms,
                                track: idx,
                                object_index,
                                moment_index,
                            });
                        }
                        track.advance_current_moment();
                    }
                }
                None => {
                    let region_end_ms = self.region_offset_ms + u64::from(region.duration_ms());
                    let last = self
                        .span
                        .as_ref()
                        .map_or(true, |span| self.region_index + 1 >= span.regions().len());
                    if last {
                        if performance_ms >= region_end_ms {
                            self.finish();
                        }
                        break;
                    }
                    for track in self.tracks.iter_mut() {
                        track.move_to_next_region(self.region_index);
                    }
                    self.region_index += 1;
                    self.region_offset_ms = region_end_ms;
                    debug!(
                        "Entering region {} at {} ms.",
                        self.region_index, self.region_offset_ms
                    );
                }
            }
        }
        batch
    }

    pub fn moment(&self, scheduled: &ScheduledMoment) -> &Moment {
        &self.tracks[scheduled.track].objects()[scheduled.object_index].moments()
            [scheduled.moment_index]
    }

    pub fn messages(&self, scheduled: &ScheduledMoment) -> &[MidiMessage] {
        self.moment(scheduled).messages()
    }

    /// Holds the performance where it is.
    pub fn pause(&mut self) -> Result<(), PerformanceError> {
        match self.state {
            PerformanceState::Running => {
                self.state = PerformanceState::Paused;
                debug!("Paused.");
                Ok(())
            }
            other => Err(PerformanceError::WrongState(other)),
        }
    }

    pub fn resume(&mut self) -> Result<(), PerformanceError> {
        match self.state {
            PerformanceState::Paused => {
                self.state = PerformanceState::Running;
                debug!("Resumed.");
                Ok(())
            }
            other => Err(PerformanceError::WrongState(other)),
        }
    }

    /// Stops scheduling. Track positions are kept; `restart` or `start`
    /// continue from here.
    pub fn stop(&mut self) {
        if self.state != PerformanceState::Stopped {
            info!("Performance stopped.");
        }
        self.state = PerformanceState::Stopped;
    }

    /// Goes back to the start of the current span and returns the cached
    /// init messages.
    pub fn restart(&mut self) -> Result<Vec<TrackInit>, PerformanceError> {
        if self.span.is_none() {
            return Err(PerformanceError::NotStarted);
        }
        for track in self.tracks.iter_mut() {
            track.reset_to_start_marker();
        }
        self.region_index = 0;
        self.region_offset_ms = 0;
        self.state = PerformanceState::Running;
        info!("Performance restarted.");
        Ok(self.audible_inits())
    }

    /// Ends the performance and rewinds every track to the beginning of the
    /// score.
    pub fn finish(&mut self) {
        for track in self.tracks.iter_mut() {
            track.set_to_first_region();
        }
        self.region_index = 0;
        self.region_offset_ms = 0;
        self.state = PerformanceState::Finished;
        info!("Performance finished.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScoreConfig;
    use crate::midi::{ControlChange, MessageCategory, MidiChannel, VOLUME};
    use crate::object::tests::{chord_moments, note_on};
    use crate::object::MomentRecord;
    use crate::region::RegionDef;
    use crate::score::{ObjectRecord, Score, TrackRecord};

    fn two_chords(channel: u8, first: u8, second: u8) -> TrackRecord {
        TrackRecord::new(
            MidiChannel::from_raw(channel).unwrap(),
            vec![
                ObjectRecord::chord(0, 1000, chord_moments(channel, &[first], 1000)),
                ObjectRecord::chord(1000, 1000, chord_moments(channel, &[second], 1000)),
            ],
        )
    }

    fn performance(tracks: Vec<TrackRecord>, sequence: &str) -> Performance {
        let defs = vec![RegionDef::new('a', 0, 1000), RegionDef::new('b', 1000, 2000)];
        Score::load(tracks, defs, sequence, &ScoreConfig::default())
            .unwrap()
            .into_performance()
    }

    /// `(time, track, note-ons, note-offs)` for every scheduled moment.
    fn summary(perf: &Performance, batch: &[ScheduledMoment]) -> Vec<(u64, usize, usize, usize)> {
        batch
            .iter()
            .map(|scheduled| {
                let count = |cat| {
                    perf.messages(scheduled)
                        .iter()
                        .filter(|msg| msg.category() == cat)
                        .count()
                };
                (
                    scheduled.time_ms,
                    scheduled.track,
                    count(MessageCategory::NoteOn),
                    count(MessageCategory::NoteOff),
                )
            })
            .collect()
    }

    #[test]
    fn test_simultaneous_tracks() {
        let mut perf = performance(vec![two_chords(0, 60, 62), two_chords(1, 48, 50)], "ab");
        let bump = Bump::new();
        assert!(perf.start(0, 2000).unwrap().is_empty());

        let batch = perf.step_until(0, &bump);
        assert_eq!(vec![(0, 0, 1, 0), (0, 1, 1, 0)], summary(&perf, &batch));

        let batch = perf.step_until(999, &bump);
        assert!(batch.is_empty());

        let batch = perf.step_until(1000, &bump);
        assert_eq!(
            vec![(1000, 0, 0, 1), (1000, 1, 0, 1), (1000, 0, 1, 0), (1000, 1, 1, 0)],
            summary(&perf, &batch)
        );
        assert_eq!(1, perf.region_index());
        assert_eq!(PerformanceState::Running, perf.state());

        let batch = perf.step_until(2000, &bump);
        assert_eq!(vec![(2000, 0, 0, 1), (2000, 1, 0, 1)], summary(&perf, &batch));
        assert_eq!(PerformanceState::Finished, perf.state());
        assert!(perf.step_until(5000, &bump).is_empty());
    }

    #[test]
    fn test_repeated_region_timing() {
        let mut perf = performance(vec![two_chords(0, 60, 62)], "aba");
        let bump = Bump::new();
        perf.start(0, 2000).unwrap();
        assert_eq!(3000, perf.duration_ms());

        let batch = perf.step_until(10_000, &bump);
        assert_eq!(
            vec![
                (0, 0, 1, 0),
                (1000, 0, 0, 1),
                (1000, 0, 1, 0),
                (2000, 0, 0, 1),
                (2000, 0, 1, 0),
                (3000, 0, 0, 1),
            ],
            summary(&perf, &batch)
        );
        let replayed: Vec<MidiMessage> = batch
            .iter()
            .filter(|scheduled| scheduled.time_ms == 2000)
            .flat_map(|scheduled| perf.messages(scheduled).to_vec())
            .collect();
        assert!(replayed.contains(&note_on(0, 60)));
        assert_eq!(PerformanceState::Finished, perf.state());
    }

    #[test]
    fn test_cut_tail_sent_at_region_end() {
        let defs = vec![RegionDef::new('a', 0, 1500), RegionDef::new('b', 1500, 2000)];
        let mut perf = Score::load(vec![two_chords(0, 60, 62)], defs, "aa", &ScoreConfig::default())
            .unwrap()
            .into_performance();
        let bump = Bump::new();
        perf.start(0, 2000).unwrap();
        assert_eq!(3000, perf.duration_ms());

        let batch = perf.step_until(10_000, &bump);
        assert_eq!(
            vec![
                (0, 0, 1, 0),
                (1000, 0, 0, 1),
                (1000, 0, 1, 0),
                (1500, 0, 0, 1),
                (1500, 0, 1, 0),
                (2500, 0, 0, 1),
                (2500, 0, 1, 0),
                (3000, 0, 0, 1),
            ],
            summary(&perf, &batch)
        );
        assert_eq!(PerformanceState::Finished, perf.state());
    }

    #[test]
    fn test_finish_waits_for_region_end() {
        let track = TrackRecord::new(
            MidiChannel::default(),
            vec![
                ObjectRecord::chord(0, 500, chord_moments(0, &[60], 500)),
                ObjectRecord::rest(500, 1500),
            ],
        );
        let mut perf = performance(vec![track], "a");
        let bump = Bump::new();
        perf.start(0, 1000).unwrap();
        assert_eq!(2, perf.step_until(800, &bump).len());
        assert_eq!(PerformanceState::Running, perf.state());
        assert!(perf.step_until(1000, &bump).is_empty());
        assert_eq!(PerformanceState::Finished, perf.state());
    }

    #[test]
    fn test_muted_track() {
        let mut perf = performance(vec![two_chords(0, 60, 62), two_chords(1, 48, 50)], "ab");
        let bump = Bump::new();
        perf.start(0, 2000).unwrap();
        perf.set_track_on(1, false).unwrap();
        let batch = perf.step_until(1500, &bump);
        assert!(batch.iter().all(|scheduled| scheduled.track == 0));
        assert_eq!(3, batch.len());

        perf.set_track_on(1, true).unwrap();
        let batch = perf.step_until(2000, &bump);
        assert_eq!(vec![(2000, 0, 0, 1), (2000, 1, 0, 1)], summary(&perf, &batch));
        assert_eq!(
            Err(PerformanceError::NoSuchTrack(2)),
            perf.set_track_on(2, false)
        );
    }

    #[test]
    fn test_pause_and_restart() {
        let volume: MidiMessage = ControlChange::new(MidiChannel::default(), VOLUME, 80)
            .unwrap()
            .into();
        let mut moments = chord_moments(0, &[60], 1000);
        let mut switch = MomentRecord::new(100);
        switch.switches.push(volume.clone());
        moments.push(switch);
        let track = TrackRecord::new(
            MidiChannel::default(),
            vec![
                ObjectRecord::chord(0, 1000, moments),
                ObjectRecord::chord(1000, 1000, chord_moments(0, &[62], 1000)),
            ],
        );
        let mut perf = performance(vec![track], "ab");
        let bump = Bump::new();

        let init = perf.start(500, 2000).unwrap();
        assert_eq!(
            vec![TrackInit {
                track: 0,
                messages: vec![volume]
            }],
            init
        );
        let batch = perf.step_until(600, &bump);
        let first = summary(&perf, &batch);
        assert_eq!(vec![(500, 0, 0, 1), (500, 0, 1, 0)], first);

        perf.pause().unwrap();
        assert!(perf.step_until(5000, &bump).is_empty());
        assert_eq!(
            Err(PerformanceError::WrongState(PerformanceState::Paused)),
            perf.pause()
        );
        perf.resume().unwrap();

        perf.stop();
        assert_eq!(init, perf.restart().unwrap());
        let batch = perf.step_until(600, &bump);
        assert_eq!(first, summary(&perf, &batch));
    }

    #[test]
    fn test_start_errors() {
        let mut perf = performance(vec![two_chords(0, 60, 62)], "ab");
        assert_eq!(Err(PerformanceError::NotStarted), perf.restart());
        assert_eq!(
            Err(PerformanceError::EmptySpan {
                start_ms: 500,
                end_ms: 500
            }),
            perf.start(500, 500)
        );
        assert_eq!(
            Err(PerformanceError::StartAfterRegions(2000)),
            perf.start(2000, 3000)
        );
        perf.start(0, 2000).unwrap();
        assert_eq!(
            Err(PerformanceError::WrongState(PerformanceState::Running)),
            perf.start(0, 2000)
        );
    }
}
