// THEORY:
// Small, allocation-per-call raster operations over 8-bit grayscale images. They are
// the building blocks of spatial segmentation and region isolation, kept free of
// any engine state so each can be tested on a handful of pixels.
//
// Thresholding, erosion, mean blur and outline drawing are thin wrappers over
// `imageproc` that pin down the conventions the pipeline relies on. The Gaussian
// pyramid steps and the seeded flood fill have no `imageproc` counterpart and are
// written out here.
//
// Border conventions:
// - Pyramid filters mirror the image about its edge pixel ("reflect-101": index -1
//   reads index 1), so edges are not darkened. The mean blur replicates the edge.
// - Erosion ignores neighbours outside the image, so blobs touching the frame edge
//   are not eaten from the outside.
// - Flood fill is 4-connected.

use crate::core_modules::geometry::{Point, Rect};
use image::{GrayImage, Luma};
use imageproc::contrast::{self, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_hollow_polygon_mut, draw_hollow_rect_mut};
use imageproc::filter;
use imageproc::morphology;
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect as PixelRect;

const PYRAMID_TAPS: [u32; 5] = [1, 4, 6, 4, 1];

#[inline]
fn reflect101(i: i64, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as i64;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Gaussian-weighted 2x reduction. The result is `ceil(w / 2) x ceil(h / 2)`.
pub fn pyr_down(src: &GrayImage) -> GrayImage {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let (dw, dh) = (w.div_ceil(2), h.div_ceil(2));
    let data = src.as_raw();

    // Horizontal pass, full height.
    let mut rows = vec![0u32; dw * h];
    for y in 0..h {
        let line = &data[y * w..(y + 1) * w];
        for x in 0..dw {
            let cx = 2 * x as i64;
            rows[y * dw + x] = PYRAMID_TAPS
                .iter()
                .enumerate()
                .map(|(k, &t)| t * line[reflect101(cx + k as i64 - 2, w)] as u32)
                .sum();
        }
    }

    let mut out = vec![0u8; dw * dh];
    for y in 0..dh {
        let cy = 2 * y as i64;
        for x in 0..dw {
            let sum: u32 = PYRAMID_TAPS
                .iter()
                .enumerate()
                .map(|(k, &t)| t * rows[reflect101(cy + k as i64 - 2, h) * dw + x])
                .sum();
            out[y * dw + x] = ((sum + 128) >> 8) as u8;
        }
    }
    from_vec(dw, dh, out)
}

/// 2x expansion with Gaussian interpolation, sized to exactly `width x height`
/// (normally twice the source, or one less when the original dimension was odd).
pub fn pyr_up(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let (w, h) = (width as usize, height as usize);
    let data = src.as_raw();

    // Interpolates position `j` of the expanded axis; weights sum to 8.
    let expand = |j: usize, n: usize, read: &dyn Fn(usize) -> u32| -> u32 {
        let i = (j / 2).min(n - 1) as i64;
        if j % 2 == 0 {
            read(reflect101(i - 1, n)) + 6 * read(i as usize) + read(reflect101(i + 1, n))
        } else {
            4 * read(i as usize) + 4 * read(reflect101(i + 1, n))
        }
    };

    let mut rows = vec![0u32; w * sh];
    for y in 0..sh {
        let line = &data[y * sw..(y + 1) * sw];
        for x in 0..w {
            rows[y * w + x] = expand(x, sw, &|i: usize| line[i] as u32);
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let sum = expand(y, sh, &|i: usize| rows[i * w + x]);
            out[y * w + x] = ((sum + 32) >> 6).min(255) as u8;
        }
    }
    from_vec(w, h, out)
}

/// Normalized `kernel x kernel` mean filter. Edge pixels are replicated.
pub fn box_blur(src: &GrayImage, kernel: u32) -> GrayImage {
    let radius = kernel.max(1) / 2;
    if radius == 0 {
        return src.clone();
    }
    filter::box_filter(src, radius, radius)
}

/// `255` where the value reaches `level`, otherwise `0`.
pub fn threshold(src: &GrayImage, level: u8) -> GrayImage {
    match level.checked_sub(1) {
        Some(below) => contrast::threshold(src, below, ThresholdType::Binary),
        None => GrayImage::from_pixel(src.width(), src.height(), Luma([255])),
    }
}

/// 3x3 minimum filter applied `iterations` times on a binary image.
pub fn erode(src: &GrayImage, iterations: u32) -> GrayImage {
    if iterations == 0 {
        return src.clone();
    }
    // `iterations` passes of a 3x3 minimum reach exactly the L-infinity ball of that radius.
    morphology::erode(src, Norm::LInf, iterations.min(u8::MAX as u32) as u8)
}

/// Draws the closed outline through `points`, shifted by `offset`.
pub fn draw_closed_polyline(canvas: &mut GrayImage, points: &[Point], offset: Point, value: u8) {
    let shifted: Vec<PixelPoint<f32>> = points
        .iter()
        .map(|p| PixelPoint::new((p.x + offset.x) as f32, (p.y + offset.y) as f32))
        .collect();
    match shifted.as_slice() {
        [] => {}
        [only] => {
            if only.x >= 0.0 && only.y >= 0.0 {
                if let Some(pixel) = canvas.get_pixel_mut_checked(only.x as u32, only.y as u32) {
                    *pixel = Luma([value]);
                }
            }
        }
        _ => draw_hollow_polygon_mut(canvas, &shifted, Luma([value])),
    }
}

/// Draws the one-pixel outline of an axis-aligned rectangle.
pub fn draw_rect(canvas: &mut GrayImage, rect: &Rect, value: u8) {
    if rect.width <= 0 || rect.height <= 0 {
        return;
    }
    let outline = PixelRect::at(rect.x, rect.y).of_size(rect.width as u32, rect.height as u32);
    draw_hollow_rect_mut(canvas, outline, Luma([value]));
}

/// Replaces the 4-connected run of pixels sharing the seed's value with `value`.
/// Returns the number of pixels filled (zero when the seed is outside the image).
pub fn flood_fill(canvas: &mut GrayImage, seed: Point, value: u8) -> usize {
    let (w, h) = (canvas.width() as i32, canvas.height() as i32);
    if seed.x < 0 || seed.y < 0 || seed.x >= w || seed.y >= h {
        return 0;
    }
    let target = canvas.get_pixel(seed.x as u32, seed.y as u32)[0];
    let mut visited = vec![false; (w * h) as usize];
    let mut queue = vec![seed];
    visited[(seed.y * w + seed.x) as usize] = true;
    let mut filled = 0;

    while let Some(current) = queue.pop() {
        canvas.put_pixel(current.x as u32, current.y as u32, Luma([value]));
        filled += 1;

        for (dx, dy) in [(0, 1), (0, -1), (1, 0), (-1, 0)] {
            let (nx, ny) = (current.x + dx, current.y + dy);
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let index = (ny * w + nx) as usize;
            if !visited[index] && canvas.get_pixel(nx as u32, ny as u32)[0] == target {
                visited[index] = true;
                queue.push(Point::new(nx, ny));
            }
        }
    }
    filled
}

fn from_vec(width: usize, height: usize, data: Vec<u8>) -> GrayImage {
    GrayImage::from_raw(width as u32, height as u32, data)
        .unwrap_or_else(|| GrayImage::new(width as u32, height as u32))
}
