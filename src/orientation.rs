//! Bakes EXIF orientation into pixels. Codes follow the EXIF definition: 5 is
//! a transpose and 7 a transverse.

use crate::error::AppError;
use crate::exif_reader::read_exif;
use crate::exif_rewrite::reset_orientation;
use crate::fraction::fraction_to_f64;
use crate::jpeg::{extract_app1_segment, replace_app1_segment};
use crate::metadata::{ExifMap, ExifScalar, ExifValue};
use crate::raster::{codec_for, read_header};
use image::metadata::Orientation;
use image::{DynamicImage, ImageBuffer, Pixel};
use serde::Deserialize;
use std::path::Path;

/// How pixel data is re-oriented, chosen once from configuration.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrientationStrategy {
    /// The raster library's own EXIF orientation support.
    #[default]
    Native,
    /// Explicit flips and quarter turns.
    Manual,
}

pub trait Reorient {
    /// Returns the image as it should be displayed for EXIF orientation `code`,
    /// or `None` for codes outside 2..=8.
    fn reorient(&self, image: DynamicImage, code: u16) -> Option<DynamicImage>;
}

pub struct NativeReorient;

impl Reorient for NativeReorient {
    fn reorient(&self, mut image: DynamicImage, code: u16) -> Option<DynamicImage> {
        let orientation = Orientation::from_exif(u8::try_from(code).ok()?)?;
        if orientation == Orientation::NoTransforms {
            return None;
        }
        image.apply_orientation(orientation);
        Some(image)
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn mirror<P: Pixel>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    axis: Axis,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let (width, height) = src.dimensions();
    let mut out = ImageBuffer::new(width, height);
    match axis {
        Axis::Horizontal => {
            for x in 0..width {
                for y in 0..height {
                    out.put_pixel(width - x - 1, y, *src.get_pixel(x, y));
                }
            }
        }
        Axis::Vertical => {
            for y in 0..height {
                for x in 0..width {
                    out.put_pixel(x, height - y - 1, *src.get_pixel(x, y));
                }
            }
        }
    }
    out
}

macro_rules! mirror_each_variant {
    ($image:expr, $axis:expr, $($variant:ident),+) => {
        match $image {
            $(DynamicImage::$variant(buffer) => DynamicImage::$variant(mirror(&buffer, $axis)),)+
            other => DynamicImage::ImageRgba32F(mirror(&other.to_rgba32f(), $axis)),
        }
    };
}

fn flip(image: DynamicImage, axis: Axis) -> DynamicImage {
    mirror_each_variant!(
        image,
        axis,
        ImageLuma8,
        ImageLumaA8,
        ImageRgb8,
        ImageRgba8,
        ImageLuma16,
        ImageLumaA16,
        ImageRgb16,
        ImageRgba16,
        ImageRgb32F,
        ImageRgba32F
    )
}

pub struct ManualReorient;

impl Reorient for ManualReorient {
    // Quarter turns are clockwise.
    fn reorient(&self, image: DynamicImage, code: u16) -> Option<DynamicImage> {
        let image = match code {
            2 => flip(image, Axis::Horizontal),
            3 => image.rotate180(),
            4 => flip(image, Axis::Vertical),
            5 => flip(image, Axis::Horizontal).rotate270(),
            6 => image.rotate90(),
            7 => flip(image, Axis::Horizontal).rotate90(),
            8 => image.rotate270(),
            _ => return None,
        };
        Some(image)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub changed: bool,
    pub exif: ExifMap,
}

impl Normalized {
    fn unchanged(exif: &ExifMap) -> Self {
        Normalized { changed: false, exif: exif.clone() }
    }
}

pub fn orientation_code(exif: &ExifMap) -> Option<u16> {
    let code = fraction_to_f64(exif.get("Orientation")?.first()?)?;
    u16::try_from(code as i64).ok()
}

/// Bakes EXIF orientation into the pixels of an original, in place.
pub struct OrientationNormalizer {
    reorient: Box<dyn Reorient>,
}

impl OrientationNormalizer {
    pub fn new(strategy: OrientationStrategy) -> Self {
        let reorient: Box<dyn Reorient> = match strategy {
            OrientationStrategy::Native => Box::new(NativeReorient),
            OrientationStrategy::Manual => Box::new(ManualReorient),
        };
        log::debug!("Orientation strategy: {:?}", strategy);
        OrientationNormalizer { reorient }
    }

    /// Rotates/flips `path` so it displays correctly with orientation 1 and
    /// rewrites its EXIF orientation to match.
    ///
    /// On success the returned map is the file's EXIF as re-read from disk,
    /// with `Orientation` set to 1. On any failure the file is untouched and
    /// the input map is returned as-is.
    pub fn normalize(&self, path: &Path, exif: &ExifMap) -> Normalized {
        let code = match orientation_code(exif) {
            Some(code) if code > 1 => code,
            _ => return Normalized::unchanged(exif),
        };

        match self.rewrite(path, code) {
            Ok(true) => {
                let mut refreshed = read_exif(path);
                refreshed.insert("Orientation".to_string(), ExifValue::Scalar(ExifScalar::Int(1)));
                log::info!("Normalized orientation {} of {:?}", code, path);
                Normalized { changed: true, exif: refreshed }
            }
            Ok(false) => Normalized::unchanged(exif),
            Err(e) => {
                log::warn!("Could not normalize orientation of {:?}: {}", path, e);
                Normalized::unchanged(exif)
            }
        }
    }

    fn rewrite(&self, path: &Path, code: u16) -> Result<bool, AppError> {
        let original = std::fs::read(path)?;
        let segment = extract_app1_segment(&original);

        let Some(codec) = read_header(path).and_then(|h| codec_for(h.format)) else {
            log::debug!("No codec to reorient {:?}", path);
            return Ok(false);
        };

        let image = codec.decode(path)?;
        let Some(image) = self.reorient.reorient(image, code) else {
            log::debug!("Orientation code {} of {:?} is not a transform", code, path);
            return Ok(false);
        };

        let mut bytes = codec.encode(&image, None)?;
        if let Some(updated) = segment.and_then(reset_orientation) {
            if let Some(spliced) = replace_app1_segment(&bytes, &updated) {
                bytes = spliced;
            }
        }

        write_replacing(path, &bytes)?;
        Ok(true)
    }
}

/// Writes next to `path` and renames over it, so a failed write leaves the
/// original intact.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| AppError::Invalid(format!("{:?} has no file name", path)))?;
    let temp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    if let Err(e) = std::fs::write(&temp, bytes).and_then(|_| std::fs::rename(&temp, path)) {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}
