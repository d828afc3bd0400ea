use crate::config::ScoreConfig;
use thiserror::*;

mod parser;
pub use parser::*;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum RegionError {
    #[error("No regions were defined.")]
    NoRegions,
    #[error("The first region ({name:?}) must start at 0, but starts at {start_ms} ms.")]
    FirstRegionNotAtZero { name: char, start_ms: u32 },
    #[error("Region {name:?} is empty: it starts at {start_ms} ms and ends at {end_ms} ms.")]
    EmptyRegion {
        name: char,
        start_ms: u32,
        end_ms: u32,
    },
    #[error("Region {0:?} is defined more than once.")]
    DuplicateRegion(char),
    #[error("The region sequence refers to region {0:?}, which is not defined.")]
    MissingRegion(char),
    #[error("The region sequence is empty.")]
    EmptySequence,
    #[error("Could not parse regions: {0}")]
    Parse(String),
}

/// A named span of score time, `start_ms..end_ms`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RegionDef {
    pub name: char,
    pub start_ms: u32,
    pub end_ms: u32,
}

impl RegionDef {
    pub const fn new(name: char, start_ms: u32, end_ms: u32) -> Self {
        RegionDef {
            name,
            start_ms,
            end_ms,
        }
    }
}

/// The ordered list of regions a performance plays, possibly repeating
/// some of them (`"aabada"`).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RegionSequence {
    definitions: Vec<RegionDef>,
    instances: Vec<RegionDef>,
}

impl RegionSequence {
    /// Resolves every name in `sequence` against `definitions`.
    /// Whitespace in the sequence is ignored.
    pub fn new(definitions: Vec<RegionDef>, sequence: &str) -> Result<Self, RegionError> {
        let names = parse_region_sequence(sequence)?;
        Self::from_names(definitions, &names)
    }

    pub fn from_names(definitions: Vec<RegionDef>, names: &[char]) -> Result<Self, RegionError> {
        let first = definitions.first().ok_or(RegionError::NoRegions)?;
        if first.start_ms != 0 {
            return Err(RegionError::FirstRegionNotAtZero {
                name: first.name,
                start_ms: first.start_ms,
            });
        }
        for (idx, def) in definitions.iter().enumerate() {
            if def.start_ms >= def.end_ms {
                return Err(RegionError::EmptyRegion {
                    name: def.name,
                    start_ms: def.start_ms,
                    end_ms: def.end_ms,
                });
            }
            if definitions[..idx].iter().any(|other| other.name == def.name) {
                return Err(RegionError::DuplicateRegion(def.name));
            }
        }
        if names.is_empty() {
            return Err(RegionError::EmptySequence);
        }
        let instances = names
            .iter()
            .map(|name| {
                definitions
                    .iter()
                    .find(|def| def.name == *name)
                    .copied()
                    .ok_or(RegionError::MissingRegion(*name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RegionSequence {
            definitions,
            instances,
        })
    }

    /// A single region `'a'` covering the whole score, for scores that
    /// define no regions of their own.
    pub fn whole(end_ms: u32) -> Self {
        let def = RegionDef::new('a', 0, end_ms.max(1));
        RegionSequence {
            definitions: vec![def],
            instances: vec![def],
        }
    }

    pub fn definitions(&self) -> &[RegionDef] {
        &self.definitions
    }

    /// The regions in playing order.
    pub fn instances(&self) -> &[RegionDef] {
        &self.instances
    }

    /// The same sequence with every boundary moved to the given speed.
    pub fn scaled(&self, config: &ScoreConfig) -> Self {
        let scale = |def: &RegionDef| RegionDef {
            name: def.name,
            start_ms: config.scale(def.start_ms),
            end_ms: config.scale(def.end_ms),
        };
        RegionSequence {
            definitions: self.definitions.iter().map(scale).collect(),
            instances: self.instances.iter().map(scale).collect(),
        }
    }

    /// Works out which region instances a performance from `start_ms` to
    /// `end_ms` plays.
    ///
    /// The performance starts in the first instance that has not ended by
    /// `start_ms` and runs through the last instance of the sequence, which
    /// the end marker cuts short. When the end marker lies before the last
    /// instance even starts, the performance stops in the first instance
    /// that contains it instead.
    ///
    /// # Panics
    ///
    /// If `start_ms >= end_ms`, or if `start_ms` lies after every region.
    pub fn output_span(&self, start_ms: u32, end_ms: u32) -> OutputSpan {
        assert!(
            start_ms < end_ms,
            "output span must start before it ends ({} >= {})",
            start_ms,
            end_ms
        );
        let first = self
            .instances
            .iter()
            .position(|def| def.end_ms > start_ms)
            .unwrap_or_else(|| panic!("start position {} ms lies after every region", start_ms));
        let final_idx = self.instances.len() - 1;
        let last = if self.instances[final_idx].start_ms < end_ms {
            final_idx
        } else {
            (first..self.instances.len())
                .find(|&idx| {
                    let def = &self.instances[idx];
                    def.start_ms < end_ms && end_ms <= def.end_ms
                })
                .unwrap_or(final_idx)
        };

        let mut regions: Vec<RegionSpan> = self.instances[first..=last]
            .iter()
            .map(|def| RegionSpan {
                name: def.name,
                start_ms: def.start_ms,
                end_ms: def.end_ms,
            })
            .collect();
        let count = regions.len();
        regions[0].start_ms = regions[0].start_ms.max(start_ms);
        regions[count - 1].end_ms = regions[count - 1].end_ms.min(end_ms);
        assert!(
            regions.iter().all(|region| region.start_ms < region.end_ms),
            "output span {}..{} ms leaves an empty region",
            start_ms,
            end_ms
        );
        OutputSpan {
            first_instance: first,
            regions,
        }
    }
}

/// One region instance as played in a performance, with the start and end
/// markers applied to the first and last instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RegionSpan {
    pub name: char,
    pub start_ms: u32,
    pub end_ms: u32,
}

impl RegionSpan {
    pub fn duration_ms(&self) -> u32 {
        self.end_ms - self.start_ms
    }
}

/// The region instances covered by one performance.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OutputSpan {
    first_instance: usize,
    regions: Vec<RegionSpan>,
}

impl OutputSpan {
    pub fn start_ms(&self) -> u32 {
        self.regions[0].start_ms
    }

    pub fn end_ms(&self) -> u32 {
        self.regions[self.regions.len() - 1].end_ms
    }

    /// Index of the first played instance within the full `RegionSequence`.
    pub fn first_instance(&self) -> usize {
        self.first_instance
    }

    /// The played regions; indices into this slice are the region indices
    /// used during the performance.
    pub fn regions(&self) -> &[RegionSpan] {
        &self.regions
    }

    /// Total performance time, in ms.
    pub fn duration_ms(&self) -> u64 {
        self.regions
            .iter()
            .map(|region| u64::from(region.duration_ms()))
            .sum()
    }
}

/// Where a track picks up when its region ends.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NextRegion {
    /// This is the last region of the performance.
    Final,
    /// The next region has no playable moment on this track.
    Silent,
    /// The next region starts at this object and moment.
    Enter(RegionEntry),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RegionEntry {
    pub object_index: usize,
    pub moment_index: usize,
    /// Number of objects, starting at `object_index`, that the next region
    /// overlaps. Objects straddling a boundary count for both regions.
    pub object_count: usize,
}

/// Precomputed navigation data from one region to the next, for one track.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RegionLink {
    pub end_of_region_ms: u32,
    pub next: NextRegion,
}
