use crate::midi::{ControllerKind, MidiChannel, MidiMessage};
use thiserror::*;

/// A breakpoint of a continuous controller envelope.
///
/// The controller ramps linearly from this vertex's value to the next
/// vertex's value over `span_ms`. The last vertex holds its value until
/// the end of the object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Vertex {
    pub value1: u8,
    pub value2: Option<u8>,
    pub span_ms: u32,
}

impl Vertex {
    pub const fn new(value1: u8, span_ms: u32) -> Self {
        Vertex {
            value1,
            value2: None,
            span_ms,
        }
    }

    pub const fn with_value2(self, value2: u8) -> Self {
        Vertex {
            value2: Some(value2),
            ..self
        }
    }
}

/// A piecewise-linear controller curve over the life of one `MidiObject`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Envelope {
    pub controller: ControllerKind,
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EnvelopeFault {
    #[error("the envelope has no vertices")]
    NoVertices,
    #[error("vertex {index} has value {value}, expected at most 127")]
    ValueOutOfRange { index: usize, value: u8 },
    #[error("vertex {index} has a zero span but is not the last vertex")]
    ZeroSpan { index: usize },
    #[error("the vertex spans add up to {total} ms but the object lasts {duration} ms")]
    SpanMismatch { total: u64, duration: u32 },
}

/// A point produced while sampling an envelope.
///
/// Grid points whose value did not change carry no message but still
/// become (empty) moments.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct EnvelopePoint {
    pub offset: u32,
    pub message: Option<MidiMessage>,
}

/// Interpolation state for one vertex span.
#[derive(Debug, Copy, Clone)]
struct Segment {
    start: u32,
    value1: f64,
    increment1: f64,
    value2: Option<(f64, f64)>,
}

impl Segment {
    fn values_at(&self, offset: u32) -> (u8, Option<u8>) {
        let elapsed = f64::from(offset - self.start);
        let value1 = to_data_byte(self.value1 + self.increment1 * elapsed);
        let value2 = self
            .value2
            .map(|(value, increment)| to_data_byte(value + increment * elapsed));
        (value1, value2)
    }
}

fn to_data_byte(raw: f64) -> u8 {
    raw.round().max(0.0).min(127.0) as u8
}

impl Envelope {
    pub fn new(controller: ControllerKind, vertices: Vec<Vertex>) -> Self {
        Envelope {
            controller,
            vertices,
        }
    }

    pub(crate) fn validate(&self, duration: u32) -> Result<(), EnvelopeFault> {
        if self.vertices.is_empty() {
            return Err(EnvelopeFault::NoVertices);
        }
        let last = self.vertices.len() - 1;
        let mut total: u64 = 0;
        for (index, vertex) in self.vertices.iter().enumerate() {
            for &value in std::iter::once(&vertex.value1).chain(vertex.value2.iter()) {
                if value > 127 {
                    return Err(EnvelopeFault::ValueOutOfRange { index, value });
                }
            }
            if vertex.span_ms == 0 && index != last {
                return Err(EnvelopeFault::ZeroSpan { index });
            }
            total += u64::from(vertex.span_ms);
        }
        if total != u64::from(duration) {
            return Err(EnvelopeFault::SpanMismatch { total, duration });
        }
        Ok(())
    }

    /// Segments for every vertex with a non-zero span. A final zero-span
    /// vertex only serves as the target of the previous segment.
    fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(self.vertices.len());
        let mut start = 0;
        for (index, vertex) in self.vertices.iter().enumerate() {
            if vertex.span_ms == 0 {
                continue;
            }
            let span = f64::from(vertex.span_ms);
            let next = self.vertices.get(index + 1);
            let value1 = f64::from(vertex.value1);
            let increment1 = next
                .map(|next| (f64::from(next.value1) - value1) / span)
                .unwrap_or(0.0);
            let value2 = vertex.value2.map(|own| {
                let own = f64::from(own);
                let increment = next
                    .and_then(|next| next.value2)
                    .map(|target| (f64::from(target) - own) / span)
                    .unwrap_or(0.0);
                (own, increment)
            });
            segments.push(Segment {
                start,
                value1,
                increment1,
                value2,
            });
            start += vertex.span_ms;
        }
        segments
    }

    /// The interpolated controller value at `offset` ms into the object.
    #[cfg(test)]
    fn values_at(&self, offset: u32) -> Option<(u8, Option<u8>)> {
        let segments = self.segments();
        let segment = segments.iter().rev().find(|seg| seg.start <= offset)?;
        Some(segment.values_at(offset))
    }

    /// Samples the envelope on the `interval` grid covering `0..duration`
    /// and adds a point at every vertex that does not fall on that grid.
    ///
    /// Must only be called once `validate(duration)` succeeded.
    pub(crate) fn sample(
        &self,
        channel: MidiChannel,
        duration: u32,
        interval: u32,
    ) -> Vec<EnvelopePoint> {
        let interval = interval.max(1);
        let segments = self.segments();
        let mut points = Vec::with_capacity((duration / interval) as usize + self.vertices.len());

        let mut segment_idx = 0;
        let mut previous_segment = None;
        let mut last_sent: Option<(u8, Option<u8>)> = None;
        let mut offset = 0u32;
        while offset < duration && !segments.is_empty() {
            while segment_idx + 1 < segments.len() && segments[segment_idx + 1].start <= offset {
                segment_idx += 1;
            }
            let values = segments[segment_idx].values_at(offset);
            let span_changed = previous_segment != Some(segment_idx);
            let message = if span_changed || last_sent != Some(values) {
                last_sent = Some(values);
                Some(self.controller.message(channel, values.0, values.1))
            } else {
                None
            };
            points.push(EnvelopePoint { offset, message });
            previous_segment = Some(segment_idx);
            offset = offset.saturating_add(interval);
        }

        // Vertices lying on the grid were sent above with their exact value.
        let mut vertex_start = 0u32;
        for vertex in &self.vertices {
            let on_grid = vertex_start < duration && vertex_start % interval == 0;
            if !on_grid {
                points.push(EnvelopePoint {
                    offset: vertex_start,
                    message: Some(
                        self.controller
                            .message(channel, vertex.value1, vertex.value2),
                    ),
                });
            }
            vertex_start += vertex.span_ms;
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_values(points: &[EnvelopePoint]) -> Vec<(u32, u8)> {
        points
            .iter()
            .filter_map(|point| {
                point
                    .message
                    .as_ref()
                    .map(|msg| (point.offset, msg.bytes()[2]))
            })
            .collect()
    }

    #[test]
    fn test_validate() {
        let env = Envelope::new(ControllerKind::PAN, vec![]);
        assert_eq!(Err(EnvelopeFault::NoVertices), env.validate(100));

        let env = Envelope::new(ControllerKind::PAN, vec![Vertex::new(0, 0), Vertex::new(3, 100)]);
        assert_eq!(Err(EnvelopeFault::ZeroSpan { index: 0 }), env.validate(100));

        let env = Envelope::new(ControllerKind::PAN, vec![Vertex::new(200, 100)]);
        assert_eq!(
            Err(EnvelopeFault::ValueOutOfRange {
                index: 0,
                value: 200
            }),
            env.validate(100)
        );

        let env = Envelope::new(ControllerKind::PAN, vec![Vertex::new(0, 60), Vertex::new(3, 0)]);
        assert_eq!(
            Err(EnvelopeFault::SpanMismatch {
                total: 60,
                duration: 100
            }),
            env.validate(100)
        );
        assert_eq!(Ok(()), env.validate(60));
    }

    #[test]
    fn test_constant_sends_once() {
        let env = Envelope::new(ControllerKind::PAN, vec![Vertex::new(0, 1000)]);
        let points = env.sample(MidiChannel::default(), 1000, 100);
        let offsets: Vec<u32> = points.iter().map(|point| point.offset).collect();
        assert_eq!((0..10).map(|n| n * 100).collect::<Vec<_>>(), offsets);
        assert_eq!(vec![(0, 0)], sent_values(&points));
    }

    #[test]
    fn test_ramp_with_target_vertex() {
        let env = Envelope::new(
            ControllerKind::VOLUME,
            vec![Vertex::new(0, 1000), Vertex::new(100, 0)],
        );
        let points = env.sample(MidiChannel::default(), 1000, 100);
        let expected: Vec<(u32, u8)> = (0..10)
            .map(|n| (n * 100, (n * 10) as u8))
            .chain(std::iter::once((1000, 100)))
            .collect();
        assert_eq!(expected, sent_values(&points));
    }

    #[test]
    fn test_off_grid_vertex() {
        let env = Envelope::new(
            ControllerKind::EXPRESSION,
            vec![Vertex::new(0, 250), Vertex::new(50, 750)],
        );
        let points = env.sample(MidiChannel::default(), 1000, 100);
        assert_eq!(
            vec![(0, 0), (100, 20), (200, 40), (300, 50), (250, 50)],
            sent_values(&points)
        );
    }

    #[test]
    fn test_vertex_on_grid_wins() {
        // The vertex at 200 coincides with a grid point, so it is sent by the
        // grid walk with its exact value and not a second time.
        let env = Envelope::new(
            ControllerKind::PAN,
            vec![Vertex::new(0, 200), Vertex::new(100, 800)],
        );
        let points = env.sample(MidiChannel::default(), 1000, 100);
        assert_eq!(vec![(0, 0), (100, 50), (200, 100)], sent_values(&points));
        assert_eq!(10, points.len());
    }

    #[test]
    fn test_span_change_is_sent_even_without_value_change() {
        let env = Envelope::new(
            ControllerKind::PAN,
            vec![Vertex::new(10, 300), Vertex::new(10, 300)],
        );
        let points = env.sample(MidiChannel::default(), 600, 100);
        assert_eq!(vec![(0, 10), (300, 10)], sent_values(&points));
    }

    #[test]
    fn test_value2_interpolation() {
        let env = Envelope::new(
            ControllerKind::PitchWheel,
            vec![
                Vertex::new(0, 100).with_value2(64),
                Vertex::new(0, 0).with_value2(74),
            ],
        );
        assert_eq!(Some((0, Some(64))), env.values_at(0));
        assert_eq!(Some((0, Some(69))), env.values_at(50));
        let points = env.sample(MidiChannel::default(), 100, 50);
        let bytes: Vec<Vec<u8>> = points
            .iter()
            .filter_map(|point| point.message.as_ref().map(|msg| msg.bytes()))
            .collect();
        assert_eq!(
            vec![vec![0xE0, 0, 64], vec![0xE0, 0, 69], vec![0xE0, 0, 74]],
            bytes
        );
    }
}
