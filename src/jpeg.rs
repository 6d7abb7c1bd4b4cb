//! JPEG marker segment scanning.
//!
//! Only the header region between SOI and SOS is walked. Everything from
//! the Start-Of-Scan marker on is treated as opaque entropy-coded data.

use std::ops::Range;

pub const SOI: [u8; 2] = [0xFF, 0xD8];
const MARKER_PREFIX: u8 = 0xFF;
const MARKER_SOS: u8 = 0xDA;
pub const MARKER_APP1: u8 = 0xE1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// A complete marker segment: marker code and its byte range, header included.
    Segment(u8, Range<usize>),
    /// Start-Of-Scan at this offset; the walk ends here.
    Scan(usize),
    /// Bytes from this offset on could not be parsed as a segment.
    Tail(usize),
}

struct SegmentWalker<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> SegmentWalker<'a> {
    fn new(data: &'a [u8]) -> Self {
        SegmentWalker { data, offset: SOI.len(), done: false }
    }
}

impl Iterator for SegmentWalker<'_> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        if self.done {
            return None;
        }
        let data = self.data;
        let offset = self.offset;

        if offset >= data.len() {
            self.done = true;
            return None;
        }
        if offset + 4 > data.len() || data[offset] != MARKER_PREFIX {
            self.done = true;
            return Some(Step::Tail(offset));
        }

        let marker = data[offset + 1];
        if marker == MARKER_SOS {
            self.done = true;
            return Some(Step::Scan(offset));
        }

        let length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let end = offset + 2 + length;
        if length < 2 || end > data.len() {
            log::trace!("Truncated JPEG segment 0x{:02X} at offset {}", marker, offset);
            self.done = true;
            return Some(Step::Tail(offset));
        }

        self.offset = end;
        Some(Step::Segment(marker, offset..end))
    }
}

pub fn is_jpeg(data: &[u8]) -> bool {
    data.starts_with(&SOI)
}

/// Returns the first APP1 segment (marker, length and payload) found before SOS.
pub fn extract_app1_segment(data: &[u8]) -> Option<&[u8]> {
    if !is_jpeg(data) {
        return None;
    }

    SegmentWalker::new(data).find_map(|step| match step {
        Step::Segment(MARKER_APP1, range) => Some(&data[range]),
        _ => None,
    })
}

/// Copies `data` with every APP1 segment before SOS dropped. Input that is
/// not a JPEG is returned unchanged.
pub fn remove_app1_segments(data: &[u8]) -> Vec<u8> {
    if !is_jpeg(data) {
        return data.to_vec();
    }

    let mut output = Vec::with_capacity(data.len());
    output.extend_from_slice(&SOI);
    for step in SegmentWalker::new(data) {
        match step {
            Step::Segment(MARKER_APP1, range) => {
                log::trace!("Dropping APP1 segment at {:?}", range);
            }
            Step::Segment(_, range) => output.extend_from_slice(&data[range]),
            Step::Scan(offset) | Step::Tail(offset) => output.extend_from_slice(&data[offset..]),
        }
    }
    output
}

/// Replaces whatever APP1 segments `data` carries with `segment`, placed
/// immediately after SOI. Returns `None` when `data` is not a JPEG.
pub fn replace_app1_segment(data: &[u8], segment: &[u8]) -> Option<Vec<u8>> {
    if !is_jpeg(data) {
        return None;
    }

    let clean = remove_app1_segments(data);
    let mut output = Vec::with_capacity(clean.len() + segment.len());
    output.extend_from_slice(&clean[..SOI.len()]);
    output.extend_from_slice(segment);
    output.extend_from_slice(&clean[SOI.len()..]);
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let length = (payload.len() + 2) as u16;
        let mut bytes = vec![0xFF, marker];
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn jpeg(segments: &[Vec<u8>], scan: &[u8]) -> Vec<u8> {
        let mut data = SOI.to_vec();
        for s in segments {
            data.extend_from_slice(s);
        }
        data.extend_from_slice(&[0xFF, 0xDA]);
        data.extend_from_slice(scan);
        data
    }

    #[test]
    fn finds_first_app1() {
        let app0 = segment(0xE0, b"JFIF\0");
        let exif = segment(0xE1, b"Exif\0\0abc");
        let xmp = segment(0xE1, b"http://ns.adobe.com/xap/1.0/");
        let data = jpeg(&[app0, exif.clone(), xmp], b"scan");

        assert_eq!(extract_app1_segment(&data), Some(exif.as_slice()));
    }

    #[test]
    fn stops_at_start_of_scan() {
        let mut data = jpeg(&[segment(0xE0, b"JFIF\0")], b"");
        data.extend_from_slice(&segment(0xE1, b"Exif\0\0"));

        assert_eq!(extract_app1_segment(&data), None);
    }

    #[test]
    fn non_jpeg_is_opaque() {
        let data = b"\x89PNG\r\n\x1a\n".to_vec();
        assert_eq!(extract_app1_segment(&data), None);
        assert_eq!(remove_app1_segments(&data), data);
        assert_eq!(replace_app1_segment(&data, b"x"), None);
    }

    #[test]
    fn removal_keeps_other_segments_and_scan_data() {
        let app0 = segment(0xE0, b"JFIF\0");
        let dqt = segment(0xDB, &[1, 2, 3]);
        let data = jpeg(
            &[app0.clone(), segment(0xE1, b"Exif\0\0"), dqt.clone(), segment(0xE1, b"xmp")],
            &[0x12, 0xFF, 0xE1, 0x00, 0x04, 0xFF, 0xD9],
        );

        let expected = jpeg(&[app0, dqt], &[0x12, 0xFF, 0xE1, 0x00, 0x04, 0xFF, 0xD9]);
        assert_eq!(remove_app1_segments(&data), expected);
    }

    #[test]
    fn replacement_goes_right_after_soi() {
        let app0 = segment(0xE0, b"JFIF\0");
        let data = jpeg(&[app0.clone(), segment(0xE1, b"old")], b"scan");
        let fresh = segment(0xE1, b"new");

        let replaced = replace_app1_segment(&data, &fresh).unwrap();
        assert_eq!(replaced, jpeg(&[fresh.clone(), app0], b"scan"));
        assert_eq!(extract_app1_segment(&replaced), Some(fresh.as_slice()));
    }

    #[test]
    fn truncated_segment_is_not_extracted() {
        let mut data = SOI.to_vec();
        data.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x40, b'E', b'x']);

        assert_eq!(extract_app1_segment(&data), None);
        assert_eq!(remove_app1_segments(&data), data);
    }
}
