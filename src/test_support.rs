//! Fixture builders shared by the unit tests.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct ExifFixture {
    pub orientation: Option<u16>,
    pub gps: bool,
}

impl ExifFixture {
    pub fn orientation(code: u16) -> Self {
        ExifFixture { orientation: Some(code), gps: false }
    }

    pub fn with_gps(code: u16) -> Self {
        ExifFixture { orientation: Some(code), gps: true }
    }
}

fn entry(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: [u8; 4]) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&value);
}

fn rationals(out: &mut Vec<u8>, values: &[(u32, u32)]) {
    for (num, den) in values {
        out.extend_from_slice(&num.to_le_bytes());
        out.extend_from_slice(&den.to_le_bytes());
    }
}

/// A little-endian APP1 segment with an optional orientation and the
/// 37°48'30"N 122°25'12"W GPS position.
pub fn exif_segment(fixture: &ExifFixture) -> Vec<u8> {
    let ifd0_entries = fixture.orientation.is_some() as u32 + fixture.gps as u32;
    let ifd0_len = 2 + 12 * ifd0_entries + 4;
    let gps_ifd = 8 + ifd0_len;
    let gps_data = gps_ifd + 2 + 12 * 4 + 4;

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"II");
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&8u32.to_le_bytes());

    tiff.extend_from_slice(&(ifd0_entries as u16).to_le_bytes());
    if let Some(code) = fixture.orientation {
        let [lo, hi] = code.to_le_bytes();
        entry(&mut tiff, 0x0112, 3, 1, [lo, hi, 0, 0]);
    }
    if fixture.gps {
        entry(&mut tiff, 0x8825, 4, 1, gps_ifd.to_le_bytes());
    }
    tiff.extend_from_slice(&0u32.to_le_bytes());

    if fixture.gps {
        tiff.extend_from_slice(&4u16.to_le_bytes());
        entry(&mut tiff, 0x0001, 2, 2, [b'N', 0, 0, 0]);
        entry(&mut tiff, 0x0002, 5, 3, gps_data.to_le_bytes());
        entry(&mut tiff, 0x0003, 2, 2, [b'W', 0, 0, 0]);
        entry(&mut tiff, 0x0004, 5, 3, (gps_data + 24).to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        rationals(&mut tiff, &[(37, 1), (48, 1), (3000, 100)]);
        rationals(&mut tiff, &[(122, 1), (25, 1), (1200, 100)]);
    }

    let mut segment = vec![0xFF, 0xE1];
    segment.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
    segment.extend_from_slice(b"Exif\0\0");
    segment.extend_from_slice(&tiff);
    segment
}

/// Left half red, right half blue.
pub fn split_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    })
}

/// Every pixel distinct so flips and rotations can be told apart.
pub fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 40) as u8, (y * 40) as u8, ((x + y) * 10) as u8, 200 + x as u8])
    })
}

pub fn jpeg_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 95)
        .encode_image(image)
        .expect("encode fixture jpeg");
    bytes
}

/// Writes a `width`×`height` split-colour JPEG carrying `segment` right after SOI.
pub fn write_jpeg_with_exif(path: &Path, width: u32, height: u32, segment: &[u8]) {
    let plain = jpeg_bytes(&split_rgb(width, height));
    let mut bytes = plain[..2].to_vec();
    bytes.extend_from_slice(segment);
    bytes.extend_from_slice(&plain[2..]);
    std::fs::write(path, bytes).expect("write fixture jpeg");
}

pub fn write_plain_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(&split_rgb(width, height))).expect("write fixture jpeg");
}

pub fn write_png(path: &Path, image: &RgbaImage) {
    image
        .save_with_format(path, ImageFormat::Png)
        .expect("write fixture png");
}
