//! Bounds-checked little-endian field readers and UTF-16LE helpers.
//!
//! Every numeric value in the NTFS structures handled here is little-endian.
//! The readers return `None` instead of panicking when the slice is too
//! short, so decoders can treat a truncated structure as "not a record".

#[inline]
#[must_use]
pub fn le_u16(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

#[inline]
#[must_use]
pub fn le_u32(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
#[must_use]
pub fn le_u64(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

/// Reads `len` bytes (0..=8) as an unsigned little-endian integer.
#[must_use]
pub fn le_uint(data: &[u8], offset: usize, len: usize) -> Option<u64> {
    if len > 8 {
        return None;
    }
    let bytes = data.get(offset..offset + len)?;
    let mut value = 0u64;
    for (i, &b) in bytes.iter().enumerate() {
        value |= (b as u64) << (i * 8);
    }
    Some(value)
}

/// Reads `len` bytes (1..=8) as a sign-extended little-endian integer.
///
/// Data-run offsets are two's-complement in widths the header chooses, so
/// the sign extension has to be explicit.
#[must_use]
pub fn le_int(data: &[u8], offset: usize, len: usize) -> Option<i64> {
    if len == 0 || len > 8 {
        return None;
    }
    let raw = le_uint(data, offset, len)?;
    let shift = 64 - len * 8;
    Some(((raw << shift) as i64) >> shift)
}

/// Decodes UTF-16LE, substituting U+FFFD for unpaired surrogates.
#[must_use]
pub fn utf16le_lossy(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Decodes UTF-16LE strictly; `None` on any unpaired surrogate.
#[must_use]
pub fn utf16le(data: &[u8]) -> Option<String> {
    let units = data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]));
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_readers_in_bounds() {
        let data = [0x34, 0x12, 0x78, 0x56, 0xAA, 0xBB, 0xCC, 0xDD];
        assert_eq!(le_u16(&data, 0), Some(0x1234));
        assert_eq!(le_u32(&data, 0), Some(0x5678_1234));
        assert_eq!(le_u64(&data, 0), Some(0xDDCC_BBAA_5678_1234));
    }

    #[test]
    fn le_readers_out_of_bounds() {
        let data = [0x01, 0x02];
        assert_eq!(le_u16(&data, 1), None);
        assert_eq!(le_u32(&data, 0), None);
        assert_eq!(le_u64(&data, 0), None);
    }

    #[test]
    fn le_int_sign_extends() {
        // 0xFF0000 as a signed 24-bit value is -65536.
        assert_eq!(le_int(&[0x00, 0x00, 0xFF], 0, 3), Some(-65536));
        assert_eq!(le_int(&[0x01], 0, 1), Some(1));
        assert_eq!(le_int(&[0xFF], 0, 1), Some(-1));
        assert_eq!(
            le_int(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F], 0, 8),
            Some(i64::MAX)
        );
    }

    #[test]
    fn le_uint_partial_widths() {
        assert_eq!(le_uint(&[0x00, 0x00, 0x01], 0, 3), Some(0x010000));
        assert_eq!(le_uint(&[], 0, 0), Some(0));
        assert_eq!(le_uint(&[0x01], 0, 2), None);
    }

    #[test]
    fn utf16_decoding() {
        let name: Vec<u8> = "A.TXT".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(utf16le(&name).as_deref(), Some("A.TXT"));
        assert_eq!(utf16le_lossy(&name), "A.TXT");

        // Lone high surrogate.
        let bad = [0x00, 0xD8];
        assert_eq!(utf16le(&bad), None);
        assert_eq!(utf16le_lossy(&bad), "\u{FFFD}");
    }
}
