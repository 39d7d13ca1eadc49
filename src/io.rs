// ============================================================================
// IMAGE FILE I/O - decode into rasters, encode merged output
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

use crate::error::Result;
use crate::raster::Raster;

/// Default JPEG quality when the caller does not pick one.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decode any supported image file into a straight-alpha RGBA raster.
pub fn load_image(path: &Path) -> Result<Raster> {
    let image = image::open(path)?.to_rgba8();
    tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "image loaded");
    Ok(Raster::from_image(image))
}

/// Encode `raster` to `path`, choosing the format from the file extension (PNG when the
/// extension is missing or unknown).
pub fn save_image(raster: &Raster, path: &Path) -> Result<()> {
    save_image_with_quality(raster, path, DEFAULT_JPEG_QUALITY)
}

pub fn save_image_with_quality(raster: &Raster, path: &Path, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    let image = raster.as_image();

    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut writer = BufWriter::new(File::create(path)?);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)?;
        }
        _ => {
            image.save_with_format(path, format)?;
        }
    }
    tracing::debug!(path = %path.display(), ?format, "image saved");
    Ok(())
}
