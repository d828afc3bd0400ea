use crate::config::{ConfigError, ScoreConfig};
use crate::midi::MidiChannel;
use crate::object::{
    Envelope, EnvelopeFault, MidiObject, MomentRecord, ObjectError, ObjectKind, Vertex,
};
use crate::performance::Performance;
use crate::region::{RegionDef, RegionError, RegionSequence};
use crate::track::Track;
use thiserror::*;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Track {track}, object at {position_ms} ms: {source}")]
    Object {
        track: usize,
        position_ms: u32,
        source: ObjectError,
    },

    #[error(
        "Track {track}, object at {position_ms} ms becomes too short at speed {speed}: \
         the speed is too high."
    )]
    SpeedTooHigh {
        track: usize,
        position_ms: u32,
        speed: f64,
    },

    #[error("Track {track}: expected an object at {expected_ms} ms, found one at {found_ms} ms.")]
    NonContiguous {
        track: usize,
        expected_ms: u32,
        found_ms: u32,
    },

    #[error("Track {track} ends at {end_ms} ms, past the last representable position.")]
    TooLong { track: usize, end_ms: u64 },

    #[error(transparent)]
    Region(#[from] RegionError),
}

/// One chord or rest as delivered by a score reader, in unscaled score ms.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub kind: ObjectKind,
    pub position_ms: u32,
    pub duration_ms: u32,
    pub moments: Vec<MomentRecord>,
    pub envelopes: Vec<Envelope>,
}

impl ObjectRecord {
    pub fn rest(position_ms: u32, duration_ms: u32) -> Self {
        ObjectRecord {
            kind: ObjectKind::Rest,
            position_ms,
            duration_ms,
            moments: Vec::new(),
            envelopes: Vec::new(),
        }
    }

    pub fn chord(position_ms: u32, duration_ms: u32, moments: Vec<MomentRecord>) -> Self {
        ObjectRecord {
            kind: ObjectKind::Chord,
            position_ms,
            duration_ms,
            moments,
            envelopes: Vec::new(),
        }
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelopes.push(envelope);
        self
    }

    /// Moves every position of the record to the given speed.
    ///
    /// Positions are scaled as absolute score positions and durations are
    /// taken as differences, so consecutive objects stay contiguous.
    fn scaled(self, config: &ScoreConfig) -> ObjectRecord {
        if config.speed == 1.0 {
            return self;
        }
        let start = self.position_ms;
        let position_ms = config.scale(start);
        let duration_ms = config.scale(start + self.duration_ms) - position_ms;
        let moments = self
            .moments
            .into_iter()
            .map(|record| MomentRecord {
                offset_ms: config.scale(start + record.offset_ms) - position_ms,
                ..record
            })
            .collect();
        let envelopes = self
            .envelopes
            .into_iter()
            .map(|envelope| {
                let mut vertex_start = start;
                let vertices = envelope
                    .vertices
                    .iter()
                    .map(|vertex| {
                        let vertex_end = vertex_start.saturating_add(vertex.span_ms);
                        let span_ms = config.scale(vertex_end) - config.scale(vertex_start);
                        vertex_start = vertex_end;
                        Vertex { span_ms, ..*vertex }
                    })
                    .collect();
                Envelope::new(envelope.controller, vertices)
            })
            .collect();
        ObjectRecord {
            kind: self.kind,
            position_ms,
            duration_ms,
            moments,
            envelopes,
        }
    }
}

/// The objects played on one channel, in score order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub channel: MidiChannel,
    pub objects: Vec<ObjectRecord>,
}

impl TrackRecord {
    pub fn new(channel: MidiChannel, objects: Vec<ObjectRecord>) -> Self {
        TrackRecord { channel, objects }
    }

    /// Unscaled end of the last object, checking that the objects follow
    /// each other without gaps from position 0.
    fn check_contiguous(&self, track: usize) -> Result<u32, ScoreError> {
        let mut expected: u64 = 0;
        for object in &self.objects {
            if u64::from(object.position_ms) != expected {
                return Err(ScoreError::NonContiguous {
                    track,
                    expected_ms: expected as u32,
                    found_ms: object.position_ms,
                });
            }
            if let Some(moment) = object
                .moments
                .iter()
                .find(|moment| moment.offset_ms > object.duration_ms)
            {
                return Err(ScoreError::Object {
                    track,
                    position_ms: object.position_ms,
                    source: ObjectError::MomentOutOfRange {
                        offset: moment.offset_ms,
                        duration: object.duration_ms,
                    },
                });
            }
            expected += u64::from(object.duration_ms);
            if expected >= u64::from(crate::END_OF_TRACK) {
                return Err(ScoreError::TooLong {
                    track,
                    end_ms: expected,
                });
            }
        }
        Ok(expected as u32)
    }
}

/// A fully built score: every track flattened into moments and the region
/// sequence, at the configured speed.
#[derive(Debug, Clone)]
pub struct Score {
    tracks: Vec<Track>,
    regions: RegionSequence,
    config: ScoreConfig,
}

impl Score {
    /// Builds every track of the score.
    ///
    /// `region_defs` and `sequence` use unscaled positions. With no region
    /// definitions, the whole score is a single region named `a`, played
    /// once unless `sequence` says otherwise.
    pub fn load(
        tracks: Vec<TrackRecord>,
        region_defs: Vec<RegionDef>,
        sequence: &str,
        config: &ScoreConfig,
    ) -> Result<Score, ScoreError> {
        config.validate()?;

        let mut score_end = 0;
        for (idx, record) in tracks.iter().enumerate() {
            score_end = score_end.max(record.check_contiguous(idx)?);
        }
        let regions = if region_defs.is_empty() {
            let whole = vec![RegionDef::new('a', 0, score_end.max(1))];
            if sequence.trim().is_empty() {
                RegionSequence::new(whole, "a")?
            } else {
                RegionSequence::new(whole, sequence)?
            }
        } else {
            RegionSequence::new(region_defs, sequence)?
        };
        let regions = regions.scaled(config);
        if let Some(def) = regions
            .definitions()
            .iter()
            .find(|def| def.start_ms >= def.end_ms)
        {
            return Err(RegionError::EmptyRegion {
                name: def.name,
                start_ms: def.start_ms,
                end_ms: def.end_ms,
            }
            .into());
        }

        let mut built = Vec::with_capacity(tracks.len());
        let mut object_count = 0;
        for (track_idx, record) in tracks.into_iter().enumerate() {
            let channel = record.channel;
            let objects = record
                .objects
                .into_iter()
                .map(|object| {
                    let unscaled_position = object.position_ms;
                    let object = object.scaled(config);
                    MidiObject::new(
                        object.kind,
                        channel,
                        object.duration_ms,
                        object.moments,
                        &object.envelopes,
                        config,
                    )
                    .map_err(|source| {
                        object_error(track_idx, unscaled_position, source, config)
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            object_count += objects.len();
            built.push(Track::new(channel, objects));
        }

        info!(
            "Loaded score: {} tracks, {} objects, {} regions in sequence, speed {}.",
            built.len(),
            object_count,
            regions.instances().len(),
            config.speed
        );
        Ok(Score {
            tracks: built,
            regions,
            config: *config,
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// The region sequence, at the score's speed.
    pub fn regions(&self) -> &RegionSequence {
        &self.regions
    }

    pub fn config(&self) -> &ScoreConfig {
        &self.config
    }

    /// Scaled end of the longest track.
    pub fn end_ms(&self) -> u32 {
        self.tracks
            .iter()
            .map(Track::end_in_score)
            .max()
            .unwrap_or(0)
    }

    pub fn into_performance(self) -> Performance {
        Performance::new(self.tracks, self.regions)
    }
}

fn object_error(
    track: usize,
    position_ms: u32,
    source: ObjectError,
    config: &ScoreConfig,
) -> ScoreError {
    let shrunk = match &source {
        ObjectError::DegenerateDuration { .. } => true,
        ObjectError::MalformedEnvelope {
            fault: EnvelopeFault::ZeroSpan { .. },
            ..
        } => true,
        _ => false,
    };
    if shrunk && config.speed > 1.0 {
        ScoreError::SpeedTooHigh {
            track,
            position_ms,
            speed: config.speed,
        }
    } else {
        ScoreError::Object {
            track,
            position_ms,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::ControllerKind;
    use crate::object::tests::chord_moments;

    fn simple_track() -> TrackRecord {
        TrackRecord::new(
            MidiChannel::default(),
            vec![
                ObjectRecord::chord(0, 1000, chord_moments(0, &[60], 1000)).with_envelope(
                    Envelope::new(
                        ControllerKind::PAN,
                        vec![Vertex::new(0, 300), Vertex::new(64, 700)],
                    ),
                ),
                ObjectRecord::rest(1000, 500),
                ObjectRecord::chord(1500, 500, chord_moments(0, &[64], 500)),
            ],
        )
    }

    #[test]
    fn test_load() {
        let score = Score::load(vec![simple_track()], Vec::new(), "", &ScoreConfig::default())
            .unwrap();
        assert_eq!(1, score.tracks().len());
        assert_eq!(2000, score.end_ms());
        assert_eq!(
            &[RegionDef::new('a', 0, 2000)],
            score.regions().instances()
        );

        let twice = Score::load(vec![simple_track()], Vec::new(), "aa", &ScoreConfig::default())
            .unwrap();
        assert_eq!(2, twice.regions().instances().len());
    }

    #[test]
    fn test_speed_scaling() {
        let config = ScoreConfig::default().with_speed(2.0);
        let score = Score::load(
            vec![simple_track()],
            vec![RegionDef::new('a', 0, 1500), RegionDef::new('b', 1500, 2000)],
            "ab",
            &config,
        )
        .unwrap();
        let track = &score.tracks()[0];
        let bounds: Vec<(u32, u32)> = track
            .objects()
            .iter()
            .map(|obj| (obj.position_in_score(), obj.duration_in_score()))
            .collect();
        assert_eq!(vec![(0, 500), (500, 250), (750, 250)], bounds);
        assert_eq!(1000, score.end_ms());
        assert_eq!(RegionDef::new('b', 750, 1000), score.regions().instances()[1]);

        let first = &track.objects()[0];
        let tail = first.moments().last().unwrap();
        assert_eq!(500, tail.offset_in_object());
        assert_eq!(1, tail.note_offs().len());
        // The pan vertex at 300 ms now starts at 150 ms.
        assert!(first
            .moments()
            .iter()
            .any(|moment| moment.offset_in_object() == 150 && !moment.envelope().is_empty()));
    }

    #[test]
    fn test_speed_too_high() {
        let track = TrackRecord::new(
            MidiChannel::default(),
            vec![ObjectRecord::rest(0, 1000), ObjectRecord::rest(1000, 1)],
        );
        let err = Score::load(
            vec![track],
            Vec::new(),
            "",
            &ScoreConfig::default().with_speed(4.0),
        )
        .unwrap_err();
        assert_eq!(
            ScoreError::SpeedTooHigh {
                track: 0,
                position_ms: 1000,
                speed: 4.0
            },
            err
        );
        assert!(err.to_string().contains("speed is too high"));
    }

    #[test]
    fn test_load_errors() {
        let gap = TrackRecord::new(
            MidiChannel::default(),
            vec![ObjectRecord::rest(0, 1000), ObjectRecord::rest(1200, 100)],
        );
        assert_eq!(
            Err(ScoreError::NonContiguous {
                track: 0,
                expected_ms: 1000,
                found_ms: 1200
            }),
            Score::load(vec![gap], Vec::new(), "", &ScoreConfig::default()).map(|_| ())
        );

        let empty = TrackRecord::new(MidiChannel::default(), vec![ObjectRecord::rest(0, 0)]);
        assert!(matches!(
            Score::load(vec![empty], Vec::new(), "", &ScoreConfig::default()),
            Err(ScoreError::Object {
                source: ObjectError::DegenerateDuration { .. },
                ..
            })
        ));

        assert!(matches!(
            Score::load(
                vec![simple_track()],
                vec![RegionDef::new('a', 0, 1000)],
                "ab",
                &ScoreConfig::default()
            ),
            Err(ScoreError::Region(RegionError::MissingRegion('b')))
        ));

        assert!(matches!(
            Score::load(
                vec![simple_track()],
                Vec::new(),
                "",
                &ScoreConfig::default().with_update_interval(0)
            ),
            Err(ScoreError::Config(ConfigError::ZeroUpdateInterval))
        ));
    }
}
