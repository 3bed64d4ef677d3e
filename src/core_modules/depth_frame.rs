// THEORY:
// The `depth_frame` module holds the engine's most basic data: a single-byte depth
// reading per pixel. It is the depth-camera counterpart of a plain pixel container:
// "dumb" data with just enough behaviour to validate and address itself.
//
// Key principles:
// 1.  **Pre-mapped depth**: The engine never sees raw 16-bit sensor values. Whatever
//     acquires frames maps them into `0..=255` first (`map_depth_to_byte` is the
//     mapping the reference sensor uses). `0` always means "no reliable reading";
//     smaller non-zero values are nearer to the sensor.
// 2.  **Validated once**: A `DepthFrame` can only be built with a buffer whose length
//     is exactly `width * height`, so every later stage may index it freely.
// 3.  **Row-major**: Sample `(x, y)` lives at `y * width + x`.

use crate::error::{LocationError, Result};
use rayon::prelude::*;

/// Millimetres of raw depth represented by one step of the byte scale.
pub const MAP_DEPTH_TO_BYTE: u16 = 8000 / 256;

/// One depth reading together with the pixel it was read at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthSample {
    pub x: u32,
    pub y: u32,
    pub depth: u8,
}

/// A full frame of byte depth samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// The nearest depth (byte scale) the sensor reports reliably for this frame.
    min_reliable_depth: u8,
}

impl DepthFrame {
    /// Wraps an already range-mapped buffer.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected || expected == 0 {
            return Err(LocationError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            min_reliable_depth: 0,
        })
    }

    /// An all-zero ("nothing reliable") frame.
    pub fn blank(width: u32, height: u32) -> Result<Self> {
        Self::new(vec![0; width as usize * height as usize], width, height)
    }

    /// Maps raw 16-bit sensor depth (millimetres) onto the byte scale. Readings
    /// outside `min_reliable..=max_reliable` become `0`.
    pub fn from_raw_depth(
        raw: &[u16],
        width: u32,
        height: u32,
        min_reliable: u16,
        max_reliable: u16,
    ) -> Result<Self> {
        let expected = width as usize * height as usize;
        if raw.len() != expected {
            return Err(LocationError::InvalidFrame {
                expected,
                actual: raw.len(),
            });
        }
        let data: Vec<u8> = raw
            .par_iter()
            .map(|&depth| map_depth_to_byte(depth, min_reliable, max_reliable))
            .collect();
        let mut frame = Self::new(data, width, height)?;
        frame.min_reliable_depth = map_depth_to_byte(min_reliable, min_reliable, max_reliable);
        Ok(frame)
    }

    pub fn with_min_reliable_depth(mut self, min_reliable_depth: u8) -> Self {
        self.min_reliable_depth = min_reliable_depth;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn min_reliable_depth(&self) -> u8 {
        self.min_reliable_depth
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The sample at `(x, y)`, or `None` outside the frame.
    pub fn sample(&self, x: u32, y: u32) -> Option<DepthSample> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let depth = self.data[(y * self.width + x) as usize];
        Some(DepthSample { x, y, depth })
    }

    /// Every sample in row-major order.
    pub fn samples(&self) -> impl Iterator<Item = DepthSample> + '_ {
        let width = self.width;
        self.data.iter().enumerate().map(move |(i, &depth)| DepthSample {
            x: i as u32 % width,
            y: i as u32 / width,
            depth,
        })
    }
}

/// Maps one raw depth reading (millimetres) onto the byte scale.
pub fn map_depth_to_byte(depth: u16, min_reliable: u16, max_reliable: u16) -> u8 {
    if depth >= min_reliable && depth <= max_reliable {
        (depth / MAP_DEPTH_TO_BYTE).min(u8::MAX as u16) as u8
    } else {
        0
    }
}
