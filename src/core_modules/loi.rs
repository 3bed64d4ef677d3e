// THEORY:
// Locations of interest exist at two levels. A `LoiPoint` is the raw result of
// region analysis: where a moving object is in the image and how near it is. A `Loi`
// is that point after classification: it names the volume of interest it fell into
// and records when. Both are immutable snapshots; nothing downstream edits them.

use crate::core_modules::geometry::Point;
use crate::core_modules::voi::Voi;
use std::sync::Arc;
use std::time::SystemTime;

/// A detected point of motion with its representative depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoiPoint {
    pub location: Point,
    pub depth: u8,
}

impl LoiPoint {
    pub const fn new(location: Point, depth: u8) -> Self {
        Self { location, depth }
    }
}

/// A `LoiPoint` classified into a volume of interest.
#[derive(Debug, Clone)]
pub struct Loi {
    id: String,
    timestamp: SystemTime,
    point: LoiPoint,
    volume: Arc<Voi>,
}

impl Loi {
    pub fn new(point: LoiPoint, volume: Arc<Voi>, timestamp: SystemTime) -> Self {
        Self {
            id: volume.id().to_string(),
            timestamp,
            point,
            volume,
        }
    }

    /// Id of the matching volume.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn point(&self) -> LoiPoint {
        self.point
    }

    /// The volume as it was when the point was classified.
    pub fn volume(&self) -> &Arc<Voi> {
        &self.volume
    }
}
