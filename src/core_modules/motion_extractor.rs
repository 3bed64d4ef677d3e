// THEORY:
// The `MotionExtractor` is the temporal layer of the engine and its hottest loop. It
// runs once per frame over every pixel and answers one question: which pixels
// changed depth since the previous frame?
//
// Key architectural principles:
// 1.  **Two buffers, allocated once**: It owns exactly one "current" and one
//     "previous" filtered frame. Each cycle the buffers swap roles and the new
//     current buffer is overwritten wholesale, so no partial state ever leaks from
//     one frame into the next.
// 2.  **Single-frame dropout suppression**: Depth sensors drop individual readings to
//     (near) zero for a frame at a time. A pixel whose new reading falls below the
//     noise threshold while its previous filtered value was above it keeps the
//     previous value. Only the immediately preceding filtered frame is consulted.
// 3.  **Per-pixel independence**: Filtering, differencing and thresholding never read
//     a neighbouring pixel, so the work is split across a dedicated worker pool in
//     row-sized bands. Every band writes only its own output slots; no locks.
// 4.  **Two outputs**: The absolute-difference magnitudes are kept alongside the
//     binary motion mask, because region analysis later re-thresholds the
//     magnitudes at a stricter level to keep only strong motion.

use crate::core_modules::depth_frame::DepthFrame;
use crate::error::{LocationError, Result};
use image::GrayImage;
use rayon::prelude::*;

/// Value written to the mask for a moving pixel.
pub const MOTION: u8 = 255;

/// The per-frame motion result: difference magnitudes plus their binarization.
#[derive(Debug, Clone)]
pub struct MotionMask {
    difference: GrayImage,
    binary: GrayImage,
}

impl MotionMask {
    pub fn width(&self) -> u32 {
        self.binary.width()
    }

    pub fn height(&self) -> u32 {
        self.binary.height()
    }

    /// `|current - previous|` per pixel.
    pub fn difference(&self) -> &GrayImage {
        &self.difference
    }

    /// `255` where the difference reached the motion threshold, else `0`.
    pub fn binary(&self) -> &GrayImage {
        &self.binary
    }

    pub fn motion_pixel_count(&self) -> usize {
        self.binary.as_raw().iter().filter(|&&v| v == MOTION).count()
    }

    pub fn has_motion(&self) -> bool {
        self.binary.as_raw().contains(&MOTION)
    }
}

/// Filters incoming frames and differences them against the previous one.
pub struct MotionExtractor {
    width: u32,
    height: u32,
    noise_threshold: u8,
    motion_threshold: u8,
    current: Vec<u8>,
    previous: Vec<u8>,
    pool: rayon::ThreadPool,
}

impl MotionExtractor {
    /// Allocates both frame buffers and a worker pool of `worker_threads` threads
    /// (one per logical CPU when `None`).
    pub fn new(
        width: u32,
        height: u32,
        noise_threshold: u8,
        motion_threshold: u8,
        worker_threads: Option<usize>,
    ) -> Result<Self> {
        let len = width as usize * height as usize;
        if len == 0 {
            return Err(LocationError::InvalidConfig(
                "frame dimensions must be non-zero".to_string(),
            ));
        }
        let threads = worker_threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("loi-motion-{i}"))
            .build()
            .map_err(|e| LocationError::ThreadPool(e.to_string()))?;
        log::debug!("motion extractor: {width}x{height}, {threads} worker threads");

        Ok(Self {
            width,
            height,
            noise_threshold,
            motion_threshold,
            current: vec![0; len],
            previous: vec![0; len],
            pool,
        })
    }

    /// The current filtered frame.
    pub fn current(&self) -> &[u8] {
        &self.current
    }

    /// The filtered frame from the cycle before.
    pub fn previous(&self) -> &[u8] {
        &self.previous
    }

    /// Runs one full cycle: filter `raw` into the current buffer, then difference
    /// it against the previous one.
    pub fn extract(&mut self, raw: &DepthFrame) -> Result<MotionMask> {
        self.filter(raw)?;
        Ok(self.diff(&self.current, &self.previous))
    }

    /// Rotates the buffers and writes the noise-filtered version of `raw` into the
    /// new current buffer.
    pub fn filter(&mut self, raw: &DepthFrame) -> Result<&[u8]> {
        if raw.dimensions() != (self.width, self.height) {
            return Err(LocationError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: raw.dimensions(),
            });
        }

        std::mem::swap(&mut self.current, &mut self.previous);

        let threshold = self.noise_threshold;
        let row = self.width as usize;
        let (current, previous) = (&mut self.current, &self.previous);
        self.pool.install(|| {
            current
                .par_chunks_mut(row)
                .zip(previous.par_chunks(row))
                .zip(raw.as_bytes().par_chunks(row))
                .for_each(|((out, prev), new)| {
                    for ((o, &p), &n) in out.iter_mut().zip(prev).zip(new) {
                        *o = filter_sample(n, p, threshold);
                    }
                });
        });

        Ok(&self.current)
    }

    /// Differences two equally sized filtered frames and binarizes the result.
    pub fn diff(&self, current: &[u8], previous: &[u8]) -> MotionMask {
        let len = self.width as usize * self.height as usize;
        let mut difference = vec![0u8; len];
        let mut binary = vec![0u8; len];

        let threshold = self.motion_threshold;
        let row = self.width as usize;
        self.pool.install(|| {
            difference
                .par_chunks_mut(row)
                .zip(binary.par_chunks_mut(row))
                .zip(current.par_chunks(row).zip(previous.par_chunks(row)))
                .for_each(|((diff_row, bin_row), (cur_row, prev_row))| {
                    for (((d, b), &c), &p) in diff_row
                        .iter_mut()
                        .zip(bin_row.iter_mut())
                        .zip(cur_row)
                        .zip(prev_row)
                    {
                        *d = c.abs_diff(p);
                        *b = if *d >= threshold { MOTION } else { 0 };
                    }
                });
        });

        MotionMask {
            difference: gray(self.width, self.height, difference),
            binary: gray(self.width, self.height, binary),
        }
    }
}

/// Dropout suppression for a single pixel.
#[inline]
pub fn filter_sample(new: u8, previous: u8, threshold: u8) -> u8 {
    if new < threshold && previous > threshold {
        previous
    } else {
        new
    }
}

fn gray(width: u32, height: u32, data: Vec<u8>) -> GrayImage {
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(width: u32, height: u32) -> MotionExtractor {
        MotionExtractor::new(width, height, 5, 5, Some(2)).unwrap()
    }

    #[test]
    fn dropout_keeps_previous_value() {
        assert_eq!(filter_sample(2, 100, 5), 100);
        assert_eq!(filter_sample(2, 4, 5), 2);
        assert_eq!(filter_sample(60, 100, 5), 60);
    }

    #[test]
    fn filtering_uses_only_the_previous_filtered_frame() {
        let mut motion = extractor(2, 1);
        motion.filter(&DepthFrame::new(vec![100, 50], 2, 1).unwrap()).unwrap();
        let filtered = motion
            .filter(&DepthFrame::new(vec![2, 7], 2, 1).unwrap())
            .unwrap()
            .to_vec();
        assert_eq!(filtered, vec![100, 7]);
        assert_eq!(motion.previous(), &[100, 50]);
    }

    #[test]
    fn identical_frames_produce_an_empty_mask() {
        let mut motion = extractor(16, 8);
        let frame = DepthFrame::new((0..128u32).map(|v| v as u8).collect(), 16, 8).unwrap();
        motion.extract(&frame).unwrap();
        let mask = motion.extract(&frame).unwrap();
        assert!(!mask.has_motion());
        assert!(mask.binary().as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn difference_at_threshold_counts_as_motion() {
        let motion = extractor(4, 1);
        let mask = motion.diff(&[10, 14, 15, 0], &[10, 10, 10, 200]);
        assert_eq!(mask.difference().as_raw(), &vec![0, 4, 5, 200]);
        assert_eq!(mask.binary().as_raw(), &vec![0, 0, 255, 255]);
        assert_eq!(mask.motion_pixel_count(), 2);
    }

    #[test]
    fn rejects_frames_of_another_size() {
        let mut motion = extractor(4, 4);
        let err = motion.filter(&DepthFrame::blank(8, 2).unwrap()).unwrap_err();
        assert_eq!(
            err,
            LocationError::FrameSizeMismatch {
                expected: (4, 4),
                actual: (8, 2)
            }
        );
    }
}
