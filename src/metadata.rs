// src/metadata.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flattened EXIF tags of one file, keyed by tag name.
pub type ExifMap = BTreeMap<String, ExifValue>;

/// A single EXIF value as kept in the catalog.
///
/// Rationals read from files are stored as `"num/den"` text; the `Ratio`
/// shape is accepted from hand-edited catalogs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExifScalar {
    Int(i64),
    Float(f64),
    Text(String),
    Ratio { num: f64, den: f64 },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ExifValue {
    Scalar(ExifScalar),
    List(Vec<ExifScalar>),
}

impl ExifScalar {
    pub fn text(value: impl Into<String>) -> Self {
        ExifScalar::Text(value.into())
    }
}

impl fmt::Display for ExifScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExifScalar::Int(n) => write!(f, "{}", n),
            ExifScalar::Float(n) => write!(f, "{}", n),
            ExifScalar::Text(s) => f.write_str(s),
            ExifScalar::Ratio { num, den } => write!(f, "{}/{}", num, den),
        }
    }
}

impl ExifValue {
    pub fn as_scalar(&self) -> Option<&ExifScalar> {
        match self {
            ExifValue::Scalar(s) => Some(s),
            ExifValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ExifScalar]> {
        match self {
            ExifValue::List(items) => Some(items),
            ExifValue::Scalar(_) => None,
        }
    }

    /// Scalar value, or the first element of a sequence.
    pub fn first(&self) -> Option<&ExifScalar> {
        match self {
            ExifValue::Scalar(s) => Some(s),
            ExifValue::List(items) => items.first(),
        }
    }

    /// Text form of a scalar tag such as `GPSLatitudeRef` or `DateTimeOriginal`.
    pub fn to_text(&self) -> Option<String> {
        self.first().map(|s| s.to_string())
    }
}

impl From<ExifScalar> for ExifValue {
    fn from(value: ExifScalar) -> Self {
        ExifValue::Scalar(value)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date_taken: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Hash of the file as first seen, when orientation normalisation has
    /// since rewritten it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<String>,
    #[serde(default)]
    pub exif: ExifMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_img_direction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_img_direction_ref: Option<String>,
}

impl PhotoRecord {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        PhotoRecord {
            id: id.into(),
            filename: filename.into(),
            title: String::new(),
            description: String::new(),
            date_taken: String::new(),
            author: String::new(),
            license: String::new(),
            width: None,
            height: None,
            hash: None,
            original_hash: None,
            exif: ExifMap::new(),
            gps_latitude: None,
            gps_longitude: None,
            gps_img_direction: None,
            gps_img_direction_ref: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exif_values_keep_their_shape_in_json() {
        let mut exif = ExifMap::new();
        exif.insert("Orientation".into(), ExifScalar::Int(6).into());
        exif.insert(
            "GPSLatitude".into(),
            ExifValue::List(vec![
                ExifScalar::text("37/1"),
                ExifScalar::text("48/1"),
                ExifScalar::text("3000/100"),
            ]),
        );
        exif.insert("ExposureBias".into(), ExifScalar::Ratio { num: 1.0, den: 3.0 }.into());

        let json = serde_json::to_string(&exif).unwrap();
        assert!(json.contains(r#""Orientation":6"#));
        assert!(json.contains(r#""GPSLatitude":["37/1","48/1","3000/100"]"#));

        let restored: ExifMap = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, exif);
    }

    #[test]
    fn first_reads_scalars_and_sequences() {
        let list = ExifValue::List(vec![ExifScalar::text("N")]);
        assert_eq!(list.to_text().as_deref(), Some("N"));
        assert_eq!(ExifValue::List(vec![]).first(), None);
        assert_eq!(ExifValue::from(ExifScalar::Int(3)).to_text().as_deref(), Some("3"));
    }
}
