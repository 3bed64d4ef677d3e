// THEORY:
// Optional renderings of the pipeline's intermediate state. Nothing in the
// detection path reads these images; they exist so a consumer (a window, a file
// dump, a debugging session) can see what each stage did.
//
// - Contours: every traced outline, plus the bounding box of each contour large
//   enough to be a real detection.
// - LoI points: the masked depth samples each analysed region kept, pasted into an
//   otherwise black frame with the region's box drawn around them.
// - Locations: the depth frame in gray, with every pixel that falls into a volume
//   painted in that volume's colour. Colours are assigned in registration order
//   from a fixed palette; where volumes overlap the first registered one wins.

use crate::core_modules::depth_frame::DepthFrame;
use crate::core_modules::geometry::Point;
use crate::core_modules::loi::LoiPoint;
use crate::core_modules::raster;
use crate::core_modules::region_analyzer::RegionAnalysis;
use crate::core_modules::region_segmenter::Region;
use crate::core_modules::voi::VoiRegistry;
use image::{GrayImage, Rgb, RgbImage};
use rayon::prelude::*;

const OUTLINE: u8 = 255;

pub const PALETTE: [Rgb<u8>; 7] = [
    Rgb([255, 0, 0]),
    Rgb([255, 255, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([255, 0, 255]),
    Rgb([0, 255, 255]),
    Rgb([125, 125, 255]),
];

/// Colour of the volume registered at `index`; the palette wraps around.
pub fn volume_color(index: usize) -> Rgb<u8> {
    PALETTE[index % PALETTE.len()]
}

/// The images a pipeline run produced, each present only when enabled.
#[derive(Debug, Clone, Default)]
pub struct PipelineVisualization {
    pub downsampled: Option<GrayImage>,
    pub contours: Option<GrayImage>,
    pub loi_points: Option<GrayImage>,
}

impl PipelineVisualization {
    pub fn is_empty(&self) -> bool {
        self.downsampled.is_none() && self.contours.is_none() && self.loi_points.is_none()
    }
}

/// Draws all outlines, and the boxes of those wider and taller than `min_box`.
pub fn render_contours(width: u32, height: u32, contours: &[Region], min_box: u32) -> GrayImage {
    let mut canvas = GrayImage::new(width, height);
    let min_box = min_box as i32;
    for region in contours {
        raster::draw_closed_polyline(&mut canvas, region.points(), Point::default(), OUTLINE);
        let bounds = region.bounding_box();
        if bounds.width > min_box && bounds.height > min_box {
            raster::draw_rect(&mut canvas, &bounds, OUTLINE);
        }
    }
    canvas
}

/// Pastes each region's masked depth crop at its bounding box.
pub fn render_loi_points(width: u32, height: u32, analyses: &[RegionAnalysis]) -> GrayImage {
    let mut canvas = GrayImage::new(width, height);
    for analysis in analyses {
        let origin = analysis.bounding_box;
        for (lx, ly, pixel) in analysis.masked.enumerate_pixels() {
            let (x, y) = (origin.x + lx as i32, origin.y + ly as i32);
            if pixel[0] == 0 || x < 0 || y < 0 {
                continue;
            }
            if let Some(target) = canvas.get_pixel_mut_checked(x as u32, y as u32) {
                *target = *pixel;
            }
        }
        raster::draw_rect(&mut canvas, &origin, OUTLINE);
    }
    canvas
}

/// Colours every pixel of `frame` by the first volume containing it.
pub fn render_locations(frame: &DepthFrame, volumes: &VoiRegistry) -> RgbImage {
    let (width, height) = frame.dimensions();
    let row = width as usize;
    let mut data = vec![0u8; row * height as usize * 3];
    let colored: Vec<_> = volumes.iter().enumerate().map(|(i, v)| (v, volume_color(i))).collect();

    data.par_chunks_mut(row * 3)
        .zip(frame.as_bytes().par_chunks(row))
        .enumerate()
        .for_each(|(y, (out, depths))| {
            for (x, (rgb, &depth)) in out.chunks_mut(3).zip(depths).enumerate() {
                let point = LoiPoint::new(Point::new(x as i32, y as i32), depth);
                let color = colored
                    .iter()
                    .find(|(volume, _)| volume.contains(&point))
                    .map_or(Rgb([depth, depth, depth]), |(_, color)| *color);
                rgb.copy_from_slice(&color.0);
            }
        });

    RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
}
