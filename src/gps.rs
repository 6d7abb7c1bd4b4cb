use crate::fraction::{fraction_to_f64, value_to_f64};
use crate::metadata::{ExifMap, ExifScalar, ExifValue};
use serde::{Deserialize, Serialize};

const COMPASS_POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Converts a degrees/minutes/seconds triple plus hemisphere letter into
/// signed decimal degrees.
pub fn coordinate_to_decimal(coordinate: &ExifValue, hemisphere: &str) -> Option<f64> {
    let parts = coordinate.as_list()?;
    if parts.len() < 3 {
        return None;
    }

    let degrees = fraction_to_f64(&parts[0])?;
    let minutes = fraction_to_f64(&parts[1])?;
    let seconds = fraction_to_f64(&parts[2])?;

    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;
    match hemisphere.trim().to_ascii_uppercase().as_str() {
        "S" | "W" => Some(-decimal),
        _ => Some(decimal),
    }
}

pub fn extract_gps_coordinates(exif: &ExifMap) -> Option<GpsCoordinates> {
    let latitude = exif.get("GPSLatitude")?;
    let latitude_ref = exif.get("GPSLatitudeRef")?.to_text()?;
    let longitude = exif.get("GPSLongitude")?;
    let longitude_ref = exif.get("GPSLongitudeRef")?.to_text()?;

    Some(GpsCoordinates {
        latitude: coordinate_to_decimal(latitude, &latitude_ref)?,
        longitude: coordinate_to_decimal(longitude, &longitude_ref)?,
    })
}

/// Splits the magnitude of `decimal` into whole degrees, whole minutes and
/// fractional seconds. Seconds that would display as 60.00 roll over.
pub fn decimal_to_dms(decimal: f64) -> (f64, f64, f64) {
    let decimal = decimal.abs();
    let mut degrees = decimal.floor();
    let minutes_full = (decimal - degrees) * 60.0;
    let mut minutes = minutes_full.floor();
    let mut seconds = (minutes_full - minutes) * 60.0;

    if seconds >= 59.995 {
        seconds = 0.0;
        minutes += 1.0;
    }
    if minutes >= 60.0 {
        minutes = 0.0;
        degrees += 1.0;
    }

    (degrees, minutes, seconds)
}

/// EXIF-shaped `(GPSLatitude, GPSLatitudeRef)` or longitude pair for a
/// decimal coordinate, seconds kept to hundredths.
pub fn dms_to_exif(decimal: f64, is_latitude: bool) -> (ExifValue, ExifValue) {
    let hemisphere = match (is_latitude, decimal >= 0.0) {
        (true, true) => "N",
        (true, false) => "S",
        (false, true) => "E",
        (false, false) => "W",
    };
    let (degrees, minutes, seconds) = decimal_to_dms(decimal);
    let components = vec![
        ExifScalar::Text(format!("{}/1", degrees as i64)),
        ExifScalar::Text(format!("{}/1", minutes as i64)),
        ExifScalar::Text(format!("{}/100", (seconds * 100.0).round() as i64)),
    ];
    (
        ExifValue::List(components),
        ExifValue::Scalar(ExifScalar::text(hemisphere)),
    )
}

/// `GPSImgDirection` in degrees, normalised into `[0, 360)`.
pub fn image_direction(exif: &ExifMap) -> Option<f64> {
    let angle = value_to_f64(exif.get("GPSImgDirection")?)?;
    let angle = angle % 360.0;
    Some(if angle < 0.0 { angle + 360.0 } else { angle })
}

pub fn compass_point(angle: f64) -> &'static str {
    let index = ((angle / 45.0).round() as i64).rem_euclid(8) as usize;
    COMPASS_POINTS[index]
}
