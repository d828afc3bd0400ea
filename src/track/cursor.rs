/// The playback position of a `Track`, at object granularity.
///
/// The moment within the object is tracked by the object's own
/// `MomentCursor`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TrackCursor {
    /// The object at this index holds the next moment to play.
    Active { object_index: usize },
    /// Nothing is left to play in the current region, or in the track.
    Ended,
}

impl TrackCursor {
    pub fn object_index(&self) -> Option<usize> {
        match *self {
            TrackCursor::Active { object_index } => Some(object_index),
            TrackCursor::Ended => None,
        }
    }

    pub fn is_ended(&self) -> bool {
        *self == TrackCursor::Ended
    }
}

/// Where playback of the current output span begins, cached so that a
/// restart does not need to search the track again.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StartMarker {
    At {
        object_index: usize,
        moment_index: usize,
    },
    /// The first region of the span has nothing to play on this track.
    Silent,
}
