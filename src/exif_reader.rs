use crate::error::AppError;
use crate::metadata::{ExifMap, ExifScalar, ExifValue};
use exif::{Field, Reader, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reads every EXIF field of `path` into one flat map. The first value seen
/// for a tag name wins, so IFD0 shadows the thumbnail IFD.
///
/// Unreadable files, files without EXIF and decode failures all give an
/// empty map.
pub fn read_exif(path: &Path) -> ExifMap {
    match try_read_exif(path) {
        Ok(exif) => exif,
        Err(e) => {
            log::debug!("No EXIF read from {:?}: {}", path, e);
            ExifMap::new()
        }
    }
}

fn try_read_exif(path: &Path) -> Result<ExifMap, AppError> {
    let file = File::open(path)?;
    let mut buf_reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut buf_reader)?;

    let mut flattened = ExifMap::new();
    for field in exif.fields() {
        let name = field.tag.to_string();
        if flattened.contains_key(&name) {
            continue;
        }
        if let Some(value) = convert_field(field) {
            log::trace!("EXIF {} = {:?}", name, value);
            flattened.insert(name, value);
        }
    }
    Ok(flattened)
}

fn convert_field(field: &Field) -> Option<ExifValue> {
    let items: Vec<ExifScalar> = match &field.value {
        Value::Byte(v) => v.iter().map(|n| ExifScalar::Int(*n as i64)).collect(),
        Value::Short(v) => v.iter().map(|n| ExifScalar::Int(*n as i64)).collect(),
        Value::Long(v) => v.iter().map(|n| ExifScalar::Int(*n as i64)).collect(),
        Value::SByte(v) => v.iter().map(|n| ExifScalar::Int(*n as i64)).collect(),
        Value::SShort(v) => v.iter().map(|n| ExifScalar::Int(*n as i64)).collect(),
        Value::SLong(v) => v.iter().map(|n| ExifScalar::Int(*n as i64)).collect(),
        Value::Float(v) => v.iter().map(|n| ExifScalar::Float(*n as f64)).collect(),
        Value::Double(v) => v.iter().map(|n| ExifScalar::Float(*n)).collect(),
        Value::Rational(v) => v
            .iter()
            .map(|r| ExifScalar::Text(format!("{}/{}", r.num, r.denom)))
            .collect(),
        Value::SRational(v) => v
            .iter()
            .map(|r| ExifScalar::Text(format!("{}/{}", r.num, r.denom)))
            .collect(),
        Value::Ascii(v) => v
            .iter()
            .map(|bytes| {
                let text = String::from_utf8_lossy(bytes);
                ExifScalar::Text(text.trim_end_matches('\0').trim().to_string())
            })
            .collect(),
        Value::Undefined(..) => vec![ExifScalar::Text(field.display_value().to_string())],
        Value::Unknown(..) => return None,
    };

    match items.len() {
        0 => None,
        1 => items.into_iter().next().map(ExifValue::Scalar),
        _ => Some(ExifValue::List(items)),
    }
}
