// THEORY:
// The `RegionSegmenter` is the spatial grouping layer. It turns the per-pixel
// motion mask into a short list of candidate regions, one per moving object.
//
// Algorithm, in order:
// 1.  **Smoothing**: The mask is halved with a Gaussian pyramid step, mean-blurred
//     with a large kernel so fragments of one physical object merge into one blob,
//     expanded back to full size and re-binarized to restore crisp edges.
// 2.  **Erosion**: A few 3x3 erosions shrink each blob and cut the thin bridges that
//     sensor noise builds between unrelated blobs.
// 3.  **External contours**: Borders are followed with `imageproc`'s contour
//     tracer. Only top-level outer borders are kept (holes and anything nested
//     inside a hole are ignored), and straight runs are compressed to their end
//     points, as only the polygon shape matters later.
// 4.  **Filtering**: Tiny regions are noise. Regions reaching into the top or left
//     margin of the frame come from sensor artifacts at the frame edge on the
//     reference hardware, so they are dropped as well.
//
// The segmenter is stateless: one mask in, one list of regions out.

use crate::core_modules::geometry::{Point, Rect};
use crate::core_modules::motion_extractor::MotionMask;
use crate::core_modules::raster;
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};

/// A candidate motion region: a closed outer boundary and its bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    points: Vec<Point>,
    bounding_box: Rect,
}

impl Region {
    /// Builds a region from boundary points. Returns `None` for an empty boundary.
    pub fn from_points(points: Vec<Point>) -> Option<Self> {
        let bounding_box = Rect::bounding(&points)?;
        Some(Self {
            points,
            bounding_box,
        })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn bounding_box(&self) -> Rect {
        self.bounding_box
    }
}

/// Tunables for segmentation, in full-resolution pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmenterSettings {
    /// Level at which the blurred mask counts as motion again.
    pub binarize_threshold: u8,
    /// Mean-blur kernel size at full resolution; halved for the reduced image.
    pub blur_kernel: u32,
    pub erode_iterations: u32,
    /// Regions narrower *and* shorter than this are dropped.
    pub min_region_size: u32,
    /// Regions whose box starts within this many pixels of the top or left edge are dropped.
    pub edge_margin: u32,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            binarize_threshold: 5,
            blur_kernel: 15,
            erode_iterations: 2,
            min_region_size: 20,
            edge_margin: 10,
        }
    }
}

/// Everything one segmentation pass produced.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// The smoothed, eroded binary image the contours were traced on.
    pub smoothed: GrayImage,
    /// Every external contour found, before filtering.
    pub contours: Vec<Region>,
    /// The contours that survived the size and edge filters.
    pub regions: Vec<Region>,
}

pub struct RegionSegmenter {
    settings: SegmenterSettings,
}

impl RegionSegmenter {
    pub fn new(settings: SegmenterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SegmenterSettings {
        &self.settings
    }

    /// Smooths the mask and extracts the candidate regions.
    pub fn segment(&self, mask: &MotionMask) -> Segmentation {
        let smoothed = self.smooth(mask.binary());
        let contours: Vec<Region> = find_external_contours(&smoothed)
            .into_iter()
            .filter_map(Region::from_points)
            .collect();
        let regions = contours
            .iter()
            .filter(|region| self.accepts(region))
            .cloned()
            .collect();
        Segmentation {
            smoothed,
            contours,
            regions,
        }
    }

    /// Steps 1 and 2: reduce, blur, expand, re-binarize, erode.
    pub fn smooth(&self, binary: &GrayImage) -> GrayImage {
        let (width, height) = binary.dimensions();
        let reduced = raster::pyr_down(binary);
        let blurred = raster::box_blur(&reduced, reduced_kernel(self.settings.blur_kernel));
        let expanded = raster::pyr_up(&blurred, width, height);
        let crisp = raster::threshold(&expanded, self.settings.binarize_threshold);
        raster::erode(&crisp, self.settings.erode_iterations)
    }

    fn accepts(&self, region: &Region) -> bool {
        let bounds = region.bounding_box();
        let min = self.settings.min_region_size as i32;
        if bounds.width < min && bounds.height < min {
            log::trace!("dropping small region {bounds:?}");
            return false;
        }
        let margin = self.settings.edge_margin as i32;
        if bounds.y < margin || bounds.x < margin {
            log::trace!("dropping edge region {bounds:?}");
            return false;
        }
        true
    }
}

/// The blur kernel for the half-resolution image; always odd so it stays centred.
pub fn reduced_kernel(full_resolution: u32) -> u32 {
    (full_resolution / 2).max(1) | 1
}

/// The outer border of every 8-connected blob of non-zero pixels that is not nested
/// inside a hole of another blob. Each border starts at its blob's top-left pixel,
/// with straight runs compressed to their end points.
pub fn find_external_contours(binary: &GrayImage) -> Vec<Vec<Point>> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none())
        .map(|contour| compress(contour.points.iter().map(|p| Point::new(p.x, p.y)).collect()))
        .collect()
}

/// Drops repeated points and points that lie in the middle of a straight run.
fn compress(mut border: Vec<Point>) -> Vec<Point> {
    border.dedup();
    while border.len() > 1 && border.first() == border.last() {
        border.pop();
    }
    let n = border.len();
    if n < 3 {
        return border;
    }
    let step = |a: Point, b: Point| (b.x - a.x, b.y - a.y);
    (0..n)
        .filter(|&i| {
            let prev = border[(i + n - 1) % n];
            let next = border[(i + 1) % n];
            step(prev, border[i]) != step(border[i], next)
        })
        .map(|i| border[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::motion_extractor::MotionExtractor;
    use image::Luma;

    fn blank(width: u32, height: u32) -> GrayImage {
        GrayImage::new(width, height)
    }

    fn fill_rect(image: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                image.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn mask_for(current: Vec<u8>, width: u32, height: u32) -> MotionMask {
        let motion = MotionExtractor::new(width, height, 5, 5, Some(1)).unwrap();
        let previous = vec![0; current.len()];
        motion.diff(&current, &previous)
    }

    #[test]
    fn rectangle_contour_compresses_to_its_corners() {
        let mut image = blank(10, 10);
        fill_rect(&mut image, 2, 3, 4, 3);
        let contours = find_external_contours(&image);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0][0], Point::new(2, 3));
        let mut corners = contours[0].clone();
        corners.sort_by_key(|p| (p.y, p.x));
        assert_eq!(
            corners,
            vec![
                Point::new(2, 3),
                Point::new(5, 3),
                Point::new(2, 5),
                Point::new(5, 5)
            ]
        );
    }

    #[test]
    fn single_pixel_is_a_one_point_contour() {
        let mut image = blank(5, 5);
        image.put_pixel(2, 2, Luma([255]));
        assert_eq!(find_external_contours(&image), vec![vec![Point::new(2, 2)]]);
    }

    #[test]
    fn holes_and_islands_inside_them_are_ignored() {
        let mut image = blank(20, 20);
        fill_rect(&mut image, 2, 2, 15, 15);
        for y in 5..14 {
            for x in 5..14 {
                image.put_pixel(x, y, Luma([0]));
            }
        }
        fill_rect(&mut image, 8, 8, 3, 3);
        let contours = find_external_contours(&image);
        assert_eq!(contours.len(), 1);
        assert_eq!(Rect::bounding(&contours[0]), Some(Rect::new(2, 2, 15, 15)));
    }

    #[test]
    fn separate_blobs_give_separate_contours() {
        let mut image = blank(30, 10);
        fill_rect(&mut image, 1, 1, 5, 5);
        fill_rect(&mut image, 20, 2, 6, 6);
        let boxes: Vec<Rect> = find_external_contours(&image)
            .iter()
            .filter_map(|c| Rect::bounding(c))
            .collect();
        assert_eq!(boxes, vec![Rect::new(1, 1, 5, 5), Rect::new(20, 2, 6, 6)]);
    }

    #[test]
    fn diagonal_blob_traces_every_turn() {
        let mut image = blank(6, 6);
        for i in 1..5 {
            image.put_pixel(i, i, Luma([255]));
        }
        let contours = find_external_contours(&image);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0], vec![Point::new(1, 1), Point::new(4, 4)]);
    }

    #[test]
    fn compress_drops_repeats_and_closing_point() {
        let border = vec![
            Point::new(0, 0),
            Point::new(1, 0),
            Point::new(1, 0),
            Point::new(2, 0),
            Point::new(2, 1),
            Point::new(0, 1),
            Point::new(0, 0),
        ];
        assert_eq!(
            compress(border),
            vec![
                Point::new(0, 0),
                Point::new(2, 0),
                Point::new(2, 1),
                Point::new(0, 1)
            ]
        );
    }

    #[test]
    fn blob_touching_the_frame_edge_is_traced() {
        let mut image = blank(8, 8);
        fill_rect(&mut image, 0, 0, 3, 8);
        let contours = find_external_contours(&image);
        assert_eq!(contours.len(), 1);
        assert_eq!(Rect::bounding(&contours[0]), Some(Rect::new(0, 0, 3, 8)));
    }

    #[test]
    fn reduced_kernel_stays_odd() {
        assert_eq!(reduced_kernel(15), 7);
        assert_eq!(reduced_kernel(10), 5);
        assert_eq!(reduced_kernel(1), 1);
    }

    #[test]
    fn square_of_motion_becomes_one_region() {
        let (width, height) = (64u32, 64u32);
        let mut current = vec![0u8; (width * height) as usize];
        for y in 22..52 {
            for x in 22..52 {
                current[(y * width + x) as usize] = 150;
            }
        }
        let segmentation = RegionSegmenter::new(SegmenterSettings::default())
            .segment(&mask_for(current, width, height));
        assert_eq!(segmentation.regions.len(), 1);
        let bounds = segmentation.regions[0].bounding_box();
        assert!(bounds.x >= 10 && bounds.x <= 22, "{bounds:?}");
        assert!(bounds.y >= 10 && bounds.y <= 22, "{bounds:?}");
        assert!(bounds.right() >= 52 && bounds.bottom() >= 52, "{bounds:?}");
    }

    #[test]
    fn empty_mask_yields_nothing() {
        let segmentation = RegionSegmenter::new(SegmenterSettings::default())
            .segment(&mask_for(vec![0; 64 * 64], 64, 64));
        assert!(segmentation.contours.is_empty());
        assert!(segmentation.regions.is_empty());
    }

    #[test]
    fn small_and_edge_regions_are_dropped() {
        let segmenter = RegionSegmenter::new(SegmenterSettings::default());
        let small = Region::from_points(vec![Point::new(30, 30), Point::new(40, 40)]).unwrap();
        let wide = Region::from_points(vec![Point::new(30, 30), Point::new(60, 32)]).unwrap();
        let near_top = Region::from_points(vec![Point::new(30, 5), Point::new(60, 40)]).unwrap();
        let near_left = Region::from_points(vec![Point::new(9, 30), Point::new(60, 60)]).unwrap();
        assert!(!segmenter.accepts(&small));
        assert!(segmenter.accepts(&wide));
        assert!(!segmenter.accepts(&near_top));
        assert!(!segmenter.accepts(&near_left));
    }
}
