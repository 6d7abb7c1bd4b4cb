use crate::error::AppError;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// JPEG writes are lossy; this is the one quality used everywhere.
pub const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

impl ImageHeader {
    pub fn longer_edge(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Sniffs the container format and reads dimensions without decoding pixels.
pub fn read_header(path: &Path) -> Option<ImageHeader> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| log::debug!("Could not open {:?}: {}", path, e))
        .ok()?;
    let format = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| log::debug!("Could not read dimensions of {:?}: {}", path, e))
        .ok()?;

    Some(ImageHeader { width, height, format })
}

pub fn dimensions(path: &Path) -> (Option<u32>, Option<u32>) {
    match read_header(path) {
        Some(header) => (Some(header.width), Some(header.height)),
        None => (None, None),
    }
}

/// Decode/encode support for one raster type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    format: ImageFormat,
}

/// The codec for `format`, or `None` when the type can only be copied.
pub fn codec_for(format: Option<ImageFormat>) -> Option<Codec> {
    match format? {
        format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif) => Some(Codec { format }),
        _ => None,
    }
}

impl Codec {
    pub fn decode(&self, path: &Path) -> Result<DynamicImage, AppError> {
        let mut reader = ImageReader::open(path)?;
        reader.set_format(self.format);
        Ok(reader.decode()?)
    }

    /// Encodes `image` in this codec's format. `dpi` is honoured where the
    /// format can carry it and ignored otherwise.
    pub fn encode(&self, image: &DynamicImage, dpi: Option<u16>) -> Result<Vec<u8>, AppError> {
        let mut bytes = Vec::new();
        match self.format {
            ImageFormat::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
                if let Some(dpi) = dpi {
                    encoder.set_pixel_density(PixelDensity::dpi(dpi));
                }
                encoder.encode_image(&image.to_rgb8())?;
            }
            ImageFormat::Gif => {
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Gif)?;
            }
            format => image.write_to(&mut Cursor::new(&mut bytes), format)?,
        }
        Ok(bytes)
    }

    pub fn save(&self, image: &DynamicImage, path: &Path, dpi: Option<u16>) -> Result<(), AppError> {
        let bytes = self.encode(image, dpi)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
