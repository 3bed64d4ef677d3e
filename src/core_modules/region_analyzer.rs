// THEORY:
// The `RegionAnalyzer` reduces one candidate region to a single location of
// interest: a point in the image plus the depth of the nearest genuine surface the
// moving object presents there.
//
// Steps for each region:
// 1.  **Centroid**: First-order moments of the region's polygon give its centre of
//     mass. A zero-area polygon has no centroid and the region is dropped.
// 2.  **Sanity check**: A centroid on or outside the region's own bounding box means
//     the contour was malformed, so the region is dropped.
// 3.  **Isolation**: The outline is drawn on an empty canvas and flood-filled from the
//     centroid. The fill isolates exactly this region's interior, even when another
//     region's bounding box overlaps it.
// 4.  **Masking**: Inside the bounding box, a depth sample survives only where it is
//     inside the fill AND the frame difference shows strong motion (a stricter level
//     than the motion mask uses).
// 5.  **Depth**: The representative depth is the smallest surviving sample above the
//     depth floor. Samples at or below the floor are background leakage or dropouts.
//     A region with no such sample is dropped.
//
// Dropped regions are not errors; they are logged at trace level and skipped.

use crate::core_modules::geometry::{Point, Rect};
use crate::core_modules::loi::LoiPoint;
use crate::core_modules::motion_extractor::MotionMask;
use crate::core_modules::raster;
use crate::core_modules::region_segmenter::Region;
use image::{GrayImage, Luma};

const FILLED: u8 = 255;

/// Tunables for region analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    /// Minimum frame difference for a pixel to count as strong motion.
    pub strong_motion_threshold: u8,
    /// Depths at or below this value never become the representative depth.
    pub depth_floor: u8,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            strong_motion_threshold: 20,
            depth_floor: 20,
        }
    }
}

/// Zeroth and first order polygon moments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Moments of the closed polygon through `points` (Green's theorem).
    pub fn of_polygon(points: &[Point]) -> Self {
        let (mut a00, mut a10, mut a01) = (0.0f64, 0.0f64, 0.0f64);
        if let Some(last) = points.last() {
            let (mut xp, mut yp) = (last.x as f64, last.y as f64);
            for p in points {
                let (x, y) = (p.x as f64, p.y as f64);
                let cross = xp * y - x * yp;
                a00 += cross;
                a10 += cross * (xp + x);
                a01 += cross * (yp + y);
                (xp, yp) = (x, y);
            }
        }
        // Orientation only flips the sign of every moment.
        let sign = if a00 < 0.0 { -1.0 } else { 1.0 };
        Self {
            m00: sign * a00 / 2.0,
            m10: sign * a10 / 6.0,
            m01: sign * a01 / 6.0,
        }
    }

    /// `(M10 / M00, M01 / M00)` truncated to pixels, or `None` for zero area.
    pub fn centroid(&self) -> Option<Point> {
        if self.m00.abs() < f64::EPSILON {
            return None;
        }
        Some(Point::new(
            (self.m10 / self.m00) as i32,
            (self.m01 / self.m00) as i32,
        ))
    }
}

/// The full result for one region, including the masked depth crop used for
/// visualization.
#[derive(Debug, Clone)]
pub struct RegionAnalysis {
    pub point: LoiPoint,
    pub bounding_box: Rect,
    /// Depth samples that survived masking, cropped to `bounding_box`.
    pub masked: GrayImage,
}

pub struct RegionAnalyzer {
    settings: AnalyzerSettings,
}

impl RegionAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Extracts the region's location of interest from the current filtered frame.
    pub fn analyze(&self, region: &Region, current: &[u8], motion: &MotionMask) -> Option<LoiPoint> {
        self.analyze_with_floor(region, current, motion, self.settings.depth_floor)
            .map(|analysis| analysis.point)
    }

    /// Like [`analyze`](Self::analyze) with an explicit depth floor, returning the
    /// masked crop as well.
    pub fn analyze_with_floor(
        &self,
        region: &Region,
        current: &[u8],
        motion: &MotionMask,
        depth_floor: u8,
    ) -> Option<RegionAnalysis> {
        let (width, height) = (motion.width(), motion.height());
        if current.len() != width as usize * height as usize {
            log::warn!("frame and motion mask sizes differ, skipping region");
            return None;
        }

        let bounds = region.bounding_box();
        let Some(centroid) = Moments::of_polygon(region.points()).centroid() else {
            log::trace!("dropping zero-area region {bounds:?}");
            return None;
        };
        if !bounds.strictly_contains(centroid) {
            log::trace!("dropping region {bounds:?}: centroid {centroid:?} outside its box");
            return None;
        }
        let bounds = bounds.clamp_to(width, height)?;

        let interior = fill_interior(region, bounds, centroid);
        let masked = self.mask_depth(bounds, current, motion, &interior, width);

        let min_depth = masked.iter().copied().filter(|&d| d > depth_floor).min();
        let Some(depth) = min_depth else {
            log::trace!("dropping region {bounds:?}: no depth above {depth_floor}");
            return None;
        };

        Some(RegionAnalysis {
            point: LoiPoint::new(centroid, depth),
            bounding_box: bounds,
            masked,
        })
    }

    fn mask_depth(
        &self,
        bounds: Rect,
        current: &[u8],
        motion: &MotionMask,
        interior: &GrayImage,
        width: u32,
    ) -> GrayImage {
        let difference = motion.difference().as_raw();
        let strong = self.settings.strong_motion_threshold;
        GrayImage::from_fn(bounds.width as u32, bounds.height as u32, |lx, ly| {
            let index = (bounds.y as u32 + ly) as usize * width as usize + (bounds.x as u32 + lx) as usize;
            let inside = interior.get_pixel(lx + 1, ly + 1)[0] == FILLED;
            let moving = difference[index] >= strong;
            Luma([if inside && moving { current[index] } else { 0 }])
        })
    }
}

/// Fills the region's outline from `seed` on a canvas covering `bounds` plus a
/// one-pixel empty margin, so the fill can flow around the outline when the seed
/// lies outside it, exactly as it would on a full-frame canvas.
fn fill_interior(region: &Region, bounds: Rect, seed: Point) -> GrayImage {
    let mut canvas = GrayImage::new(bounds.width as u32 + 2, bounds.height as u32 + 2);
    let offset = Point::new(1 - bounds.x, 1 - bounds.y);
    raster::draw_closed_polyline(&mut canvas, region.points(), offset, FILLED);
    raster::flood_fill(
        &mut canvas,
        Point::new(seed.x + offset.x, seed.y + offset.y),
        FILLED,
    );
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::motion_extractor::MotionExtractor;

    const W: u32 = 40;
    const H: u32 = 40;

    fn square_region(x0: i32, y0: i32, size: i32) -> Region {
        let x1 = x0 + size - 1;
        let y1 = y0 + size - 1;
        Region::from_points(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
        .unwrap()
    }

    fn frames_with_square(x0: u32, y0: u32, size: u32, depth: u8) -> (Vec<u8>, MotionMask) {
        let mut current = vec![0u8; (W * H) as usize];
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                current[(y * W + x) as usize] = depth;
            }
        }
        let motion = MotionExtractor::new(W, H, 5, 5, Some(1)).unwrap();
        let mask = motion.diff(&current, &vec![0; current.len()]);
        (current, mask)
    }

    #[test]
    fn square_moments_give_its_centre() {
        let moments = Moments::of_polygon(square_region(10, 10, 11).points());
        assert_eq!(moments.m00, 100.0);
        assert_eq!(moments.centroid(), Some(Point::new(15, 15)));
    }

    #[test]
    fn moments_ignore_orientation() {
        let clockwise = Moments::of_polygon(square_region(0, 0, 5).points());
        let mut reversed = square_region(0, 0, 5).points().to_vec();
        reversed.reverse();
        assert_eq!(clockwise, Moments::of_polygon(&reversed));
    }

    #[test]
    fn degenerate_polygon_has_no_centroid() {
        let line = [Point::new(1, 1), Point::new(9, 9)];
        assert_eq!(Moments::of_polygon(&line).centroid(), None);
        assert_eq!(Moments::of_polygon(&[]).centroid(), None);
    }

    #[test]
    fn picks_nearest_depth_inside_the_region() {
        let (mut current, mask) = frames_with_square(10, 10, 12, 150);
        current[(15 * W + 15) as usize] = 90;
        // Dropout-level depth is ignored.
        current[(16 * W + 16) as usize] = 12;
        let analyzer = RegionAnalyzer::new(AnalyzerSettings::default());
        let point = analyzer
            .analyze(&square_region(10, 10, 12), &current, &mask)
            .unwrap();
        assert_eq!(point.location, Point::new(15, 15));
        assert_eq!(point.depth, 90);
    }

    #[test]
    fn pixels_without_strong_motion_are_masked_out() {
        let (mut current, _) = frames_with_square(10, 10, 12, 150);
        let motion = MotionExtractor::new(W, H, 5, 5, Some(1)).unwrap();
        // The previous frame differs only slightly at one near pixel.
        let mut previous = current.clone();
        for v in previous.iter_mut().filter(|v| **v == 150) {
            *v = 0;
        }
        current[(12 * W + 12) as usize] = 60;
        previous[(12 * W + 12) as usize] = 50;
        let mask = motion.diff(&current, &previous);

        let analyzer = RegionAnalyzer::new(AnalyzerSettings::default());
        let analysis = analyzer
            .analyze_with_floor(&square_region(10, 10, 12), &current, &mask, 20)
            .unwrap();
        assert_eq!(analysis.point.depth, 150);
        assert_eq!(analysis.masked.get_pixel(2, 2)[0], 0);
    }

    #[test]
    fn region_without_depth_above_the_floor_is_dropped() {
        let (current, mask) = frames_with_square(10, 10, 12, 40);
        let analyzer = RegionAnalyzer::new(AnalyzerSettings::default());
        let region = square_region(10, 10, 12);
        assert!(analyzer.analyze_with_floor(&region, &current, &mask, 70).is_none());
        assert_eq!(
            analyzer.analyze_with_floor(&region, &current, &mask, 20).map(|a| a.point.depth),
            Some(40)
        );
    }

    #[test]
    fn overlapping_neighbour_does_not_leak_into_the_fill() {
        let (mut current, _) = frames_with_square(10, 10, 12, 150);
        // An L-shaped region whose box covers a nearer object it does not contain.
        for y in 10..14 {
            for x in 18..22 {
                current[(y * W + x) as usize] = 30;
            }
        }
        let motion = MotionExtractor::new(W, H, 5, 5, Some(1)).unwrap();
        let mask = motion.diff(&current, &vec![0; current.len()]);
        let l_shape = Region::from_points(vec![
            Point::new(10, 10),
            Point::new(16, 10),
            Point::new(16, 16),
            Point::new(21, 16),
            Point::new(21, 21),
            Point::new(10, 21),
        ])
        .unwrap();
        let analyzer = RegionAnalyzer::new(AnalyzerSettings::default());
        let point = analyzer.analyze(&l_shape, &current, &mask).unwrap();
        assert_eq!(point.depth, 150);
    }

    #[test]
    fn zero_area_region_is_dropped() {
        let (current, mask) = frames_with_square(10, 10, 12, 150);
        let line = Region::from_points(vec![Point::new(10, 10), Point::new(30, 10)]).unwrap();
        let analyzer = RegionAnalyzer::new(AnalyzerSettings::default());
        assert!(analyzer.analyze(&line, &current, &mask).is_none());
    }
}
