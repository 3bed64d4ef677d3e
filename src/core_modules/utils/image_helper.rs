use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::ImageEncoder;
use image::{GrayImage, RgbImage};
use std::path::Path;

/// Writes a raw buffer as PNG. `buffer` must hold `width * height` pixels of `color`.
pub fn save(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    buffer: &[u8],
    color: image::ExtendedColorType,
) -> Result<(), ImageError> {
    let expected = width as u64 * height as u64 * color.bits_per_pixel() as u64 / 8;
    if buffer.len() as u64 != expected {
        return Err(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        )));
    }
    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);

    encoder.write_image(buffer, width, height, color)?;

    Ok(())
}

pub fn save_gray(path: impl AsRef<Path>, image: &GrayImage) -> Result<(), ImageError> {
    save(
        path,
        image.width(),
        image.height(),
        image.as_raw(),
        image::ExtendedColorType::L8,
    )
}

pub fn save_rgb(path: impl AsRef<Path>, image: &RgbImage) -> Result<(), ImageError> {
    save(
        path,
        image.width(),
        image.height(),
        image.as_raw(),
        image::ExtendedColorType::Rgb8,
    )
}
