// THEORY:
// A volume of interest (Voi) is a named piece of physical space, e.g. "kitchen".
// Image coordinates stand in for the two planar axes and the byte depth for the
// third; smaller depth means nearer to the sensor.
//
// Two shapes exist:
// - `Box`: axis aligned. Its near face sits at depth `z` and its far face at
//   `z - depth`. The planar test is strict on all four sides, the depth test is
//   inclusive.
// - `Frustum`: the sensor sees a room in perspective, so a real box appears larger
//   near the camera than far from it. A frustum holds one face rectangle at a near
//   depth and one at a far depth, and interpolates linearly between them. All of its
//   bounds are inclusive.
//
// The `VoiRegistry` is an ordered list. Ids are unique and fixed; shapes may be
// replaced at any time. Volumes are shared through `Arc`, so a classified location
// keeps the shape its volume had when the point was classified, even if the shape
// is replaced later.

use crate::core_modules::loi::LoiPoint;
use crate::error::{LocationError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A planar rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Face {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn lerp(&self, other: &Face, t: f32) -> Face {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        let (left, top) = (mix(self.x, other.x), mix(self.y, other.y));
        let right = mix(self.x + self.width, other.x + other.width);
        let bottom = mix(self.y + self.height, other.y + other.height);
        Face::new(left, top, right - left, bottom - top)
    }
}

/// Geometry of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoiShape {
    Box {
        x: f32,
        y: f32,
        /// Depth of the near face.
        z: f32,
        face_width: f32,
        face_height: f32,
        /// Extent from the near face towards the sensor.
        depth: f32,
    },
    Frustum {
        near: Face,
        near_depth: f32,
        far: Face,
        far_depth: f32,
    },
}

impl VoiShape {
    pub const fn cuboid(x: f32, y: f32, z: f32, face_width: f32, face_height: f32, depth: f32) -> Self {
        VoiShape::Box {
            x,
            y,
            z,
            face_width,
            face_height,
            depth,
        }
    }

    pub fn contains_coords(&self, px: f32, py: f32, pdepth: f32) -> bool {
        match *self {
            VoiShape::Box {
                x,
                y,
                z,
                face_width,
                face_height,
                depth,
            } => {
                if pdepth < z - depth || pdepth > z {
                    return false;
                }
                px > x && px < x + face_width && py > y && py < y + face_height
            }
            VoiShape::Frustum {
                near,
                near_depth,
                far,
                far_depth,
            } => {
                if pdepth < near_depth || pdepth > far_depth {
                    return false;
                }
                let span = far_depth - near_depth;
                let t = if span > 0.0 { (pdepth - near_depth) / span } else { 0.0 };
                let face = near.lerp(&far, t);
                px >= face.x && px <= face.x + face.width && py >= face.y && py <= face.y + face.height
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = match self {
            VoiShape::Box {
                face_width,
                face_height,
                depth,
                ..
            } => *face_width >= 0.0 && *face_height >= 0.0 && *depth >= 0.0,
            VoiShape::Frustum {
                near,
                near_depth,
                far,
                far_depth,
            } => {
                near_depth <= far_depth
                    && [near, far].iter().all(|f| f.width >= 0.0 && f.height >= 0.0)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(LocationError::InvalidConfig(format!(
                "volume has negative extent: {self:?}"
            )))
        }
    }
}

/// A named volume of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voi {
    id: String,
    shape: VoiShape,
}

impl Voi {
    pub fn new(id: impl Into<String>, shape: VoiShape) -> Self {
        Self {
            id: id.into(),
            shape,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn shape(&self) -> &VoiShape {
        &self.shape
    }

    /// Pure containment test for a detected point.
    pub fn contains(&self, point: &LoiPoint) -> bool {
        self.shape.contains_coords(
            point.location.x as f32,
            point.location.y as f32,
            point.depth as f32,
        )
    }
}

/// Insertion-ordered set of volumes with unique ids.
#[derive(Debug, Clone, Default)]
pub struct VoiRegistry {
    volumes: Vec<Arc<Voi>>,
}

impl VoiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry, failing on the first duplicate id.
    pub fn from_volumes(volumes: impl IntoIterator<Item = Voi>) -> Result<Self> {
        let mut registry = Self::new();
        for voi in volumes {
            registry.register(voi)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, voi: Voi) -> Result<()> {
        if self.get(voi.id()).is_some() {
            return Err(LocationError::DuplicateVolume(voi.id));
        }
        voi.shape.validate()?;
        log::debug!("registered volume '{}'", voi.id);
        self.volumes.push(Arc::new(voi));
        Ok(())
    }

    /// Replaces a volume's geometry. Locations classified earlier keep the old one.
    pub fn update_shape(&mut self, id: &str, shape: VoiShape) -> Result<()> {
        shape.validate()?;
        let slot = self
            .volumes
            .iter_mut()
            .find(|v| v.id() == id)
            .ok_or_else(|| LocationError::UnknownVolume(id.to_string()))?;
        Arc::make_mut(slot).shape = shape;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Voi>> {
        self.volumes.iter().find(|v| v.id() == id)
    }

    /// The first registered volume containing `point`.
    pub fn first_containing(&self, point: &LoiPoint) -> Option<&Arc<Voi>> {
        self.volumes.iter().find(|v| v.contains(point))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Voi>> {
        self.volumes.iter()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Point;

    fn point(x: i32, y: i32, depth: u8) -> LoiPoint {
        LoiPoint::new(Point::new(x, y), depth)
    }

    fn room() -> Voi {
        Voi::new("room", VoiShape::cuboid(10.0, 20.0, 255.0, 100.0, 50.0, 90.0))
    }

    #[test]
    fn depth_range_is_inclusive_and_measured_towards_the_sensor() {
        let shape = room().shape;
        assert!(shape.contains_coords(50.0, 40.0, 200.0));
        assert!(shape.contains_coords(50.0, 40.0, 165.0));
        assert!(shape.contains_coords(50.0, 40.0, 255.0));
        assert!(!shape.contains_coords(50.0, 40.0, 164.0));
        assert!(!shape.contains_coords(50.0, 40.0, 256.0));
    }

    #[test]
    fn planar_faces_are_excluded() {
        let voi = room();
        assert!(!voi.contains(&point(10, 40, 200)));
        assert!(voi.contains(&point(11, 40, 200)));
        assert!(!voi.contains(&point(110, 40, 200)));
        assert!(voi.contains(&point(109, 40, 200)));
        assert!(!voi.contains(&point(50, 20, 200)));
        assert!(!voi.contains(&point(50, 70, 200)));
    }

    #[test]
    fn containment_is_repeatable() {
        let voi = room();
        let p = point(60, 30, 180);
        let first = voi.contains(&p);
        assert!((0..10).all(|_| voi.contains(&p) == first));
    }

    #[test]
    fn frustum_interpolates_between_faces() {
        let shape = VoiShape::Frustum {
            near: Face::new(0.0, 0.0, 100.0, 100.0),
            near_depth: 50.0,
            far: Face::new(40.0, 40.0, 20.0, 20.0),
            far_depth: 150.0,
        };
        // Half way the face spans 20..80.
        assert!(shape.contains_coords(20.0, 50.0, 100.0));
        assert!(!shape.contains_coords(19.0, 50.0, 100.0));
        assert!(shape.contains_coords(5.0, 5.0, 50.0));
        assert!(!shape.contains_coords(5.0, 5.0, 150.0));
        assert!(!shape.contains_coords(50.0, 50.0, 151.0));
    }

    #[test]
    fn flat_frustum_uses_its_near_face() {
        let face = Face::new(0.0, 0.0, 10.0, 10.0);
        let shape = VoiShape::Frustum {
            near: face,
            near_depth: 80.0,
            far: face,
            far_depth: 80.0,
        };
        assert!(shape.contains_coords(10.0, 0.0, 80.0));
        assert!(!shape.contains_coords(5.0, 5.0, 81.0));
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let mut registry = VoiRegistry::new();
        registry.register(room()).unwrap();
        assert_eq!(
            registry.register(room()),
            Err(LocationError::DuplicateVolume("room".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_shape_leaves_earlier_snapshots_alone() {
        let mut registry = VoiRegistry::from_volumes([room()]).unwrap();
        let before = Arc::clone(registry.get("room").unwrap());
        registry
            .update_shape("room", VoiShape::cuboid(0.0, 0.0, 100.0, 10.0, 10.0, 10.0))
            .unwrap();

        assert_eq!(before.shape(), room().shape());
        assert!(registry.get("room").unwrap().contains(&point(5, 5, 95)));
        assert_eq!(
            registry.update_shape("hall", room().shape),
            Err(LocationError::UnknownVolume("hall".to_string()))
        );
    }

    #[test]
    fn first_containing_follows_registration_order() {
        let registry = VoiRegistry::from_volumes([
            Voi::new("a", VoiShape::cuboid(0.0, 0.0, 200.0, 50.0, 50.0, 100.0)),
            Voi::new("b", VoiShape::cuboid(0.0, 0.0, 200.0, 50.0, 50.0, 100.0)),
        ])
        .unwrap();
        let hit = registry.first_containing(&point(10, 10, 150)).unwrap();
        assert_eq!(hit.id(), "a");
        assert!(registry.first_containing(&point(10, 10, 20)).is_none());
    }

    #[test]
    fn negative_extents_are_invalid() {
        let mut registry = VoiRegistry::new();
        let bad = Voi::new("bad", VoiShape::cuboid(0.0, 0.0, 100.0, -1.0, 10.0, 10.0));
        assert!(matches!(registry.register(bad), Err(LocationError::InvalidConfig(_))));
    }

    #[test]
    fn shapes_deserialize_from_tagged_json() {
        let voi: Voi = serde_json::from_str(
            r#"{"id":"kitchen","shape":{"kind":"box","x":1,"y":2,"z":200,"face_width":30,"face_height":40,"depth":90}}"#,
        )
        .unwrap();
        assert_eq!(voi.id(), "kitchen");
        assert_eq!(voi.shape(), &VoiShape::cuboid(1.0, 2.0, 200.0, 30.0, 40.0, 90.0));
    }
}
