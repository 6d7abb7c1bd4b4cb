use crate::error::AppError;
use crate::raster::{codec_for, read_header, ImageHeader};
use image::imageops::FilterType;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    Resampled,
    /// The original already fits, so it was copied verbatim.
    CopiedOriginal,
    /// No codec for the source type; the original was copied verbatim.
    CopiedUnsupported,
    AlreadyPresent,
}

impl ThumbnailOutcome {
    /// Whether this call wrote a new derivative.
    pub fn generated(&self) -> bool {
        !matches!(self, ThumbnailOutcome::AlreadyPresent)
    }
}

/// Keeps `[A-Za-z0-9_-]` only.
pub fn sanitize_size_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn extension_suffix(extension: &str) -> String {
    let extension = extension.trim_start_matches('.').to_lowercase();
    if extension.is_empty() {
        String::new()
    } else {
        format!(".{}", extension)
    }
}

/// `{id}_{size}.{ext}` inside `directory`.
pub fn derivative_path(directory: &Path, id: &str, size_name: &str, extension: &str) -> PathBuf {
    directory.join(format!(
        "{}_{}{}",
        id,
        sanitize_size_name(size_name),
        extension_suffix(extension)
    ))
}

fn prepare(source: &Path, dest: &Path) -> Result<Option<ImageHeader>, AppError> {
    if !source.is_file() {
        return Err(AppError::NotFound(source.display().to_string()));
    }
    if dest.is_file() || source == dest {
        return Ok(None);
    }

    let header = read_header(source)
        .ok_or_else(|| AppError::Invalid(format!("cannot read image header of {:?}", source)))?;
    if header.width == 0 || header.height == 0 {
        return Err(AppError::Invalid(format!("{:?} has no pixels", source)));
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            log::debug!("Created thumbnail directory: {:?}", parent);
        }
    }
    Ok(Some(header))
}

fn copy_verbatim(source: &Path, dest: &Path, outcome: ThumbnailOutcome) -> Result<ThumbnailOutcome, AppError> {
    fs::copy(source, dest)?;
    log::debug!("Copied {:?} to {:?} verbatim", source, dest);
    Ok(outcome)
}

/// Writes `dest` scaled so its longer edge is `max_edge`. Originals that
/// already fit are copied byte for byte instead of re-encoded.
pub fn generate_scaled(source: &Path, dest: &Path, max_edge: u32) -> Result<ThumbnailOutcome, AppError> {
    if max_edge == 0 {
        return Err(AppError::Invalid("thumbnail edge must be positive".into()));
    }
    let Some(header) = prepare(source, dest)? else {
        return Ok(ThumbnailOutcome::AlreadyPresent);
    };

    let longer = header.longer_edge();
    if max_edge >= longer {
        return copy_verbatim(source, dest, ThumbnailOutcome::CopiedOriginal);
    }

    let scale = max_edge as f64 / longer as f64;
    let width = ((header.width as f64 * scale).round() as u32).max(1);
    let height = ((header.height as f64 * scale).round() as u32).max(1);

    let Some(codec) = codec_for(header.format) else {
        log::warn!("No codec for {:?}; copying the original as its thumbnail", source);
        return copy_verbatim(source, dest, ThumbnailOutcome::CopiedUnsupported);
    };

    let image = codec.decode(source)?;
    let thumbnail = image.resize_exact(width, height, RESAMPLE_FILTER);
    codec.save(&thumbnail, dest, None)?;
    log::debug!("Thumbnail {}x{} saved to: {:?}", width, height, dest);
    Ok(ThumbnailOutcome::Resampled)
}

/// Writes `dest` as an `edge`×`edge` resample of the largest centred square
/// of `source`.
pub fn generate_square(
    source: &Path,
    dest: &Path,
    edge: u32,
    dpi: Option<u16>,
) -> Result<ThumbnailOutcome, AppError> {
    if edge == 0 {
        return Err(AppError::Invalid("thumbnail edge must be positive".into()));
    }
    let Some(header) = prepare(source, dest)? else {
        return Ok(ThumbnailOutcome::AlreadyPresent);
    };

    let Some(codec) = codec_for(header.format) else {
        log::warn!("No codec for {:?}; copying the original as its square thumbnail", source);
        return copy_verbatim(source, dest, ThumbnailOutcome::CopiedUnsupported);
    };

    let side = header.width.min(header.height);
    let x = (header.width - side) / 2;
    let y = (header.height - side) / 2;

    let image = codec.decode(source)?;
    let square = image.crop_imm(x, y, side, side).resize_exact(edge, edge, RESAMPLE_FILTER);
    codec.save(&square, dest, dpi)?;
    log::debug!("Square thumbnail {}px (crop {}+{}) saved to: {:?}", edge, x, y, dest);
    Ok(ThumbnailOutcome::Resampled)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Derivative {
    pub size: String,
    pub path: PathBuf,
    /// `None` when generation failed.
    pub outcome: Option<ThumbnailOutcome>,
}

/// Materialises every configured derivative of an original.
#[derive(Debug, Clone)]
pub struct ThumbnailEngine {
    directory: PathBuf,
    sizes: BTreeMap<String, u32>,
    square_sizes: BTreeSet<String>,
    square_dpi: Option<u16>,
}

impl ThumbnailEngine {
    pub fn new(
        directory: impl Into<PathBuf>,
        sizes: BTreeMap<String, u32>,
        square_sizes: impl IntoIterator<Item = String>,
        square_dpi: Option<u16>,
    ) -> Self {
        ThumbnailEngine {
            directory: directory.into(),
            sizes,
            square_sizes: square_sizes.into_iter().collect(),
            square_dpi,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, id: &str, size_name: &str, extension: &str) -> PathBuf {
        derivative_path(&self.directory, id, size_name, extension)
    }

    /// Generates whichever derivatives of `source` are missing.
    pub fn ensure_thumbnails(&self, source: &Path, id: &str, extension: &str) -> Vec<Derivative> {
        let mut derivatives = Vec::with_capacity(self.sizes.len());
        for (size, &edge) in &self.sizes {
            if edge == 0 {
                continue;
            }
            let path = self.path_for(id, size, extension);
            let result = if self.square_sizes.contains(size) {
                generate_square(source, &path, edge, self.square_dpi)
            } else {
                generate_scaled(source, &path, edge)
            };

            let outcome = match result {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    log::warn!("Could not generate {} thumbnail for {:?}: {}", size, source, e);
                    None
                }
            };
            derivatives.push(Derivative { size: size.clone(), path, outcome });
        }
        derivatives
    }

    /// Deletes every derivative of `id`, including the legacy
    /// `{size}_{filename}` naming when `legacy_filename` is given.
    pub fn clear_thumbnails(&self, id: &str, extension: &str, legacy_filename: Option<&str>) {
        for size in self.sizes.keys() {
            let mut paths = vec![self.path_for(id, size, extension)];
            if let Some(filename) = legacy_filename {
                paths.push(self.directory.join(format!("{}_{}", sanitize_size_name(size), filename)));
            }
            for path in paths {
                if path.is_file() {
                    match fs::remove_file(&path) {
                        Ok(()) => log::debug!("Removed stale thumbnail {:?}", path),
                        Err(e) => log::warn!("Could not remove {:?}: {}", path, e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::dimensions;
    use crate::test_support::{gradient_rgba, write_plain_jpeg, write_png};
    use image::{Rgb, RgbImage};

    fn sizes(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn naming_sanitizes_and_lowercases() {
        let path = derivative_path(Path::new("photos"), "abc123", "thumb square!", ".JPG");
        assert_eq!(path, Path::new("photos").join("abc123_thumbsquare.jpg"));
        assert_eq!(
            derivative_path(Path::new("p"), "x", "large", ""),
            Path::new("p").join("x_large")
        );
    }

    #[test]
    fn scaled_output_fits_requested_edge() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.jpg");
        write_plain_jpeg(&source, 40, 20);
        let dest = dir.path().join("out").join("wide_small.jpg");

        assert_eq!(generate_scaled(&source, &dest, 10).unwrap(), ThumbnailOutcome::Resampled);
        assert_eq!(dimensions(&dest), (Some(10), Some(5)));
    }

    #[test]
    fn scaled_never_upscales_and_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("small.png");
        write_png(&source, &gradient_rgba(4, 3));
        let dest = dir.path().join("small_large.png");

        assert_eq!(generate_scaled(&source, &dest, 4).unwrap(), ThumbnailOutcome::CopiedOriginal);
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&source).unwrap());
    }

    #[test]
    fn tiny_scale_keeps_at_least_one_pixel() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("strip.png");
        write_png(&source, &gradient_rgba(6, 1));
        let dest = dir.path().join("strip_t.png");

        generate_scaled(&source, &dest, 2).unwrap();
        assert_eq!(dimensions(&dest), (Some(2), Some(1)));
    }

    #[test]
    fn existing_destination_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        write_plain_jpeg(&source, 40, 20);
        let dest = dir.path().join("a_t.jpg");
        fs::write(&dest, b"keep me").unwrap();

        assert_eq!(generate_scaled(&source, &dest, 10).unwrap(), ThumbnailOutcome::AlreadyPresent);
        assert_eq!(generate_square(&source, &dest, 10, None).unwrap(), ThumbnailOutcome::AlreadyPresent);
        assert_eq!(fs::read(&dest).unwrap(), b"keep me");
    }

    #[test]
    fn missing_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("t.jpg");
        assert!(generate_scaled(&dir.path().join("nowhere.jpg"), &dest, 100).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn square_crops_the_centre() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        // Blue outer quarters fall outside the centred 40x40 crop.
        let image = RgbImage::from_fn(80, 40, |x, _| match x {
            0..=19 | 60..=79 => Rgb([0, 0, 255]),
            20..=39 => Rgb([0, 255, 0]),
            _ => Rgb([255, 0, 0]),
        });
        image.save(&source).unwrap();
        let dest = dir.path().join("thumbsquare.png");

        assert_eq!(generate_square(&source, &dest, 30, Some(144)).unwrap(), ThumbnailOutcome::Resampled);
        let thumb = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(thumb.dimensions(), (30, 30));

        for pixel in thumb.pixels() {
            assert!(pixel[2] < 100, "no blue from outside the crop: {:?}", pixel);
        }
        let left = thumb.get_pixel(3, 15);
        let right = thumb.get_pixel(26, 15);
        assert!(left[1] > left[0], "left keeps the green quarter");
        assert!(right[0] > right[1], "right keeps the red quarter");
    }

    #[test]
    fn square_keeps_alpha_for_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("alpha.png");
        write_png(&source, &gradient_rgba(6, 4));
        let dest = dir.path().join("alpha_sq.png");

        generate_square(&source, &dest, 2, None).unwrap();
        let thumb = image::open(&dest).unwrap();
        assert!(thumb.color().has_alpha());
        assert_eq!(thumb.to_rgba8().dimensions(), (2, 2));
    }

    #[test]
    fn unsupported_type_falls_back_to_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("really-bmp.jpg");
        image::DynamicImage::ImageRgba8(gradient_rgba(6, 4))
            .to_rgb8()
            .save_with_format(&source, image::ImageFormat::Bmp)
            .unwrap();

        let scaled = dir.path().join("s.jpg");
        assert_eq!(generate_scaled(&source, &scaled, 3).unwrap(), ThumbnailOutcome::CopiedUnsupported);
        assert_eq!(fs::read(&scaled).unwrap(), fs::read(&source).unwrap());

        let square = dir.path().join("q.jpg");
        assert_eq!(generate_square(&source, &square, 3, None).unwrap(), ThumbnailOutcome::CopiedUnsupported);
    }

    #[test]
    fn engine_fills_gaps_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        write_plain_jpeg(&source, 40, 20);
        let engine = ThumbnailEngine::new(
            dir.path().join("photos"),
            sizes(&[("thumbnail", 10), ("thumbsquare", 8), ("skipped", 0)]),
            vec!["thumbsquare".to_string()],
            Some(144),
        );

        let first = engine.ensure_thumbnails(&source, "abc123", "JPG");
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|d| d.outcome == Some(ThumbnailOutcome::Resampled)));
        assert_eq!(dimensions(&engine.path_for("abc123", "thumbsquare", "jpg")), (Some(8), Some(8)));

        let second = engine.ensure_thumbnails(&source, "abc123", "jpg");
        assert!(second.iter().all(|d| d.outcome == Some(ThumbnailOutcome::AlreadyPresent)));

        let legacy = engine.directory().join("thumbnail_a.jpg");
        fs::write(&legacy, b"old").unwrap();
        engine.clear_thumbnails("abc123", "jpg", Some("a.jpg"));
        assert!(first.iter().all(|d| !d.path.exists()));
        assert!(!legacy.exists());
    }
}
