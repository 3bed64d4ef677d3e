// THEORY:
// The `LocationHandler` is the classification layer. Every detected point is tested
// against every registered volume; each (point, volume) pair that matches becomes one
// `Loi`. Overlapping volumes produce several Lois for a single point, and nothing is
// deduplicated here: resolving competing volumes is the debouncer's job.
//
// Output order is point-major, then registration order, which is the order the
// debouncer's tie-break depends on.

use crate::core_modules::loi::{Loi, LoiPoint};
use crate::core_modules::voi::VoiRegistry;
use std::sync::Arc;
use std::time::SystemTime;

pub struct LocationHandler {
    volumes: VoiRegistry,
}

impl LocationHandler {
    pub fn new(volumes: VoiRegistry) -> Self {
        Self { volumes }
    }

    pub fn volumes(&self) -> &VoiRegistry {
        &self.volumes
    }

    pub fn volumes_mut(&mut self) -> &mut VoiRegistry {
        &mut self.volumes
    }

    /// Classifies one frame's points, stamping every match with `timestamp`.
    pub fn classify(&self, points: &[LoiPoint], timestamp: SystemTime) -> Vec<Loi> {
        let mut lois = Vec::new();
        for point in points {
            for volume in self.volumes.iter().filter(|v| v.contains(point)) {
                log::debug!(
                    "loi at ({}, {}) depth {} in '{}'",
                    point.location.x,
                    point.location.y,
                    point.depth,
                    volume.id()
                );
                lois.push(Loi::new(*point, Arc::clone(volume), timestamp));
            }
        }
        lois
    }
}
