//! MFT entry decoding: signature check, fixup application, attribute walk.

use crate::bytes::{le_u16, le_u32};
use crate::fixup::apply_fixup;
use crate::mft::attribute::Attribute;
use crate::types::{attr_type, MftRecordFlags};

/// Default fixed entry size; the boot sector can override it.
pub const MFT_ENTRY_SIZE: usize = 1024;

const SIGNATURE_FILE: &[u8; 4] = b"FILE";
const SIGNATURE_BAAD: &[u8; 4] = b"BAAD";

/// A parsed MFT entry: header fields plus its decoded attributes.
#[derive(Debug, Clone)]
pub struct MftEntry {
    pub entry_number: u64,
    pub sequence: u16,
    pub flags: MftRecordFlags,
    pub attributes: Vec<Attribute>,
}

impl MftEntry {
    /// Decodes one fixed-size entry. Zeroed, `BAAD` and torn (fixup
    /// mismatch) entries yield `None` and are expected to be skipped.
    #[must_use]
    pub fn parse(raw: &[u8], entry_number: u64) -> Option<MftEntry> {
        if raw.len() < 48 {
            return None;
        }
        if &raw[0..4] == SIGNATURE_BAAD {
            tracing::debug!(entry_number, "skipping BAAD entry");
            return None;
        }
        if &raw[0..4] != SIGNATURE_FILE {
            return None;
        }

        let mut data = raw.to_vec();
        let fixup_offset = le_u16(&data, 4)? as usize;
        let fixup_count = le_u16(&data, 6)? as usize;
        if !apply_fixup(&mut data, fixup_offset, fixup_count) {
            tracing::debug!(entry_number, "fixup mismatch, rejecting torn entry");
            return None;
        }

        let sequence = le_u16(&data, 16)?;
        let attr_offset = le_u16(&data, 20)? as usize;
        let flags = MftRecordFlags::from_bits_truncate(le_u16(&data, 22)?);
        let used_size = le_u32(&data, 24)? as usize;

        let attributes = walk_attributes(&data, attr_offset, used_size);
        Some(MftEntry {
            entry_number,
            sequence,
            flags,
            attributes,
        })
    }

    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.flags.contains(MftRecordFlags::IN_USE)
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.flags.contains(MftRecordFlags::DIRECTORY)
    }

    /// First attribute with the given type code and exact name.
    #[must_use]
    pub fn find_attribute(&self, type_code: u32, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.type_code == type_code && a.name == name)
    }
}

/// Walks attributes from `start`, stopping at the end marker, a zero or
/// overlong length, or the header-declared used size.
fn walk_attributes(data: &[u8], start: usize, used_size: usize) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    let mut offset = start;

    while offset + 4 <= data.len() && offset < used_size {
        let Some(type_code) = le_u32(data, offset) else {
            break;
        };
        if type_code == attr_type::END {
            break;
        }
        let Some(length) = le_u32(data, offset + 4) else {
            break;
        };
        let length = length as usize;
        if length == 0 || length > data.len() - offset {
            break;
        }
        if let Some(attribute) = Attribute::parse(type_code, &data[offset..offset + length]) {
            attributes.push(attribute);
        }
        offset += length;
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mft::testutil::{attr_end, resident_attribute, MftEntryBuilder};

    #[test]
    fn empty_entry_is_rejected() {
        let raw = vec![0u8; MFT_ENTRY_SIZE];
        assert!(MftEntry::parse(&raw, 0).is_none());
    }

    #[test]
    fn baad_entry_is_rejected_silently() {
        let mut raw = vec![0u8; MFT_ENTRY_SIZE];
        raw[0..4].copy_from_slice(b"BAAD");
        assert!(MftEntry::parse(&raw, 7).is_none());
    }

    #[test]
    fn torn_entry_is_rejected() {
        let mut raw = MftEntryBuilder::new(12).in_use(true).build();
        // Corrupt the tail of the second sector after the builder stamped
        // the update sequence: the signature no longer matches.
        raw[1022] ^= 0x5A;
        assert!(MftEntry::parse(&raw, 12).is_none());
    }

    #[test]
    fn valid_entry_walks_attributes() {
        let raw = MftEntryBuilder::new(30)
            .in_use(true)
            .directory(false)
            .sequence(4)
            .push_attribute(resident_attribute(0x10, "", &[0u8; 48]))
            .push_attribute(resident_attribute(0x80, "", b"data"))
            .build();

        let entry = MftEntry::parse(&raw, 30).expect("valid entry");
        assert_eq!(entry.sequence, 4);
        assert!(entry.is_in_use());
        assert!(!entry.is_directory());
        assert_eq!(entry.attributes.len(), 2);
        assert_eq!(entry.attributes[1].type_code, 0x80);
        assert_eq!(entry.attributes[1].resident_data(), b"data");
    }

    #[test]
    fn walk_stops_on_zero_length() {
        let mut attrs = resident_attribute(0x10, "", &[0u8; 48]);
        // A zero-length attribute header before the end marker.
        attrs.extend_from_slice(&0x30u32.to_le_bytes());
        attrs.extend_from_slice(&0u32.to_le_bytes());
        attrs.extend_from_slice(&attr_end());

        let raw = MftEntryBuilder::new(3).raw_attributes(attrs).build();
        let entry = MftEntry::parse(&raw, 3).expect("valid entry");
        assert_eq!(entry.attributes.len(), 1);
    }

    #[test]
    fn fixup_restores_sector_tails() {
        // Put an attribute whose content straddles the first sector tail and
        // check the decoded bytes carry the original values, not the
        // signature word.
        let mut content = vec![0u8; 500];
        for (i, b) in content.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let raw = MftEntryBuilder::new(9)
            .push_attribute(resident_attribute(0x80, "", &content))
            .build();

        let entry = MftEntry::parse(&raw, 9).expect("valid entry");
        assert_eq!(entry.attributes[0].resident_data(), &content[..]);
    }
}
