use crate::jpeg::MARKER_APP1;

const EXIF_SIGNATURE: &[u8; 6] = b"Exif\0\0";
/// Marker (2) + length (2) + signature (6).
const TIFF_START: usize = 10;
const IFD_ENTRY_LEN: usize = 12;
const TAG_ORIENTATION: u16 = 0x0112;
const TYPE_SHORT: u16 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            b"II" => Some(ByteOrder::Little),
            b"MM" => Some(ByteOrder::Big),
            _ => None,
        }
    }

    fn u16_at(self, data: &[u8], offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn u32_at(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        })
    }

    /// SHORT value 1 left-justified in a 4-byte value field.
    fn short_one(self) -> [u8; 4] {
        match self {
            ByteOrder::Little => [0x01, 0x00, 0x00, 0x00],
            ByteOrder::Big => [0x00, 0x01, 0x00, 0x00],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OrientationEntry {
    order: ByteOrder,
    /// Offset of the entry's 4-byte value field within the segment.
    value_offset: usize,
    field_type: u16,
    count: u32,
}

/// Locates the IFD0 Orientation entry of an APP1 segment.
fn find_orientation(segment: &[u8]) -> Option<OrientationEntry> {
    if segment.get(4..TIFF_START)? != EXIF_SIGNATURE {
        return None;
    }
    if segment.len() < TIFF_START + 8 {
        return None;
    }

    let order = ByteOrder::from_marker(&segment[TIFF_START..TIFF_START + 2])?;
    let ifd_offset = order.u32_at(segment, TIFF_START + 4)? as usize;
    let ifd_pos = TIFF_START.checked_add(ifd_offset)?;
    let entries = order.u16_at(segment, ifd_pos)?;

    let mut entry_pos = ifd_pos + 2;
    for _ in 0..entries {
        if entry_pos + IFD_ENTRY_LEN > segment.len() {
            log::trace!("IFD0 truncated at offset {}", entry_pos);
            return None;
        }
        if order.u16_at(segment, entry_pos)? == TAG_ORIENTATION {
            return Some(OrientationEntry {
                order,
                value_offset: entry_pos + 8,
                field_type: order.u16_at(segment, entry_pos + 2)?,
                count: order.u32_at(segment, entry_pos + 4)?,
            });
        }
        entry_pos += IFD_ENTRY_LEN;
    }
    None
}

/// Rewrites the Orientation tag of an APP1 EXIF segment to 1 (top-left).
///
/// Returns `None` when `segment` is not an APP1 segment at all. Anything else
/// that cannot be parsed, or has no SHORT orientation entry, comes back
/// unchanged.
pub fn reset_orientation(segment: &[u8]) -> Option<Vec<u8>> {
    if segment.len() < TIFF_START || segment[0] != 0xFF || segment[1] != MARKER_APP1 {
        return None;
    }

    let mut updated = segment.to_vec();
    match find_orientation(segment) {
        Some(entry) if entry.field_type == TYPE_SHORT && entry.count >= 1 => {
            let offset = entry.value_offset;
            updated[offset..offset + 4].copy_from_slice(&entry.order.short_one());
        }
        Some(entry) => {
            log::debug!(
                "Orientation entry has type {} count {}; leaving segment untouched",
                entry.field_type,
                entry.count
            );
        }
        None => log::trace!("No rewritable orientation entry in EXIF segment"),
    }
    Some(updated)
}

/// Orientation code stored in an APP1 segment's IFD0, if any.
pub fn read_orientation(segment: &[u8]) -> Option<u16> {
    let entry = find_orientation(segment)?;
    if entry.field_type != TYPE_SHORT || entry.count == 0 {
        return None;
    }
    entry.order.u16_at(segment, entry.value_offset)
}
