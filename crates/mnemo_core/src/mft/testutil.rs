//! Builders for synthetic MFT entries used across the decoder tests.

use crate::types::MftRecordFlags;

pub const FIXUP_OFFSET: usize = 48;
pub const ATTR_OFFSET: usize = 56;

/// Serializes a resident attribute, 8-byte aligned.
pub fn resident_attribute(type_code: u32, name: &str, content: &[u8]) -> Vec<u8> {
    let name_units: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let name_offset = 24usize;
    let content_offset = name_offset + name_units.len();
    let total = (content_offset + content.len() + 7) & !7;

    let mut data = vec![0u8; total];
    data[0..4].copy_from_slice(&type_code.to_le_bytes());
    data[4..8].copy_from_slice(&(total as u32).to_le_bytes());
    data[8] = 0;
    data[9] = name.encode_utf16().count() as u8;
    data[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    data[16..20].copy_from_slice(&(content.len() as u32).to_le_bytes());
    data[20..22].copy_from_slice(&(content_offset as u16).to_le_bytes());
    data[name_offset..content_offset].copy_from_slice(&name_units);
    data[content_offset..content_offset + content.len()].copy_from_slice(content);
    data
}

/// Serializes a non-resident attribute around an encoded run list.
pub fn non_resident_attribute(
    type_code: u32,
    name: &str,
    start_vcn: u64,
    end_vcn: u64,
    allocated_size: u64,
    real_size: u64,
    runs: &[u8],
) -> Vec<u8> {
    let name_units: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let name_offset = 64usize;
    let run_offset = name_offset + name_units.len();
    let total = (run_offset + runs.len() + 7) & !7;

    let mut data = vec![0u8; total];
    data[0..4].copy_from_slice(&type_code.to_le_bytes());
    data[4..8].copy_from_slice(&(total as u32).to_le_bytes());
    data[8] = 1;
    data[9] = name.encode_utf16().count() as u8;
    data[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    data[16..24].copy_from_slice(&start_vcn.to_le_bytes());
    data[24..32].copy_from_slice(&end_vcn.to_le_bytes());
    data[32..34].copy_from_slice(&(run_offset as u16).to_le_bytes());
    data[40..48].copy_from_slice(&allocated_size.to_le_bytes());
    data[48..56].copy_from_slice(&real_size.to_le_bytes());
    data[56..64].copy_from_slice(&real_size.to_le_bytes());
    data[name_offset..run_offset].copy_from_slice(&name_units);
    data[run_offset..run_offset + runs.len()].copy_from_slice(runs);
    data
}

/// Serializes a $FILE_NAME content blob.
pub fn file_name_content(parent_ref: u64, created: u64, namespace: u8, name: &str) -> Vec<u8> {
    let name_units: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let mut data = vec![0u8; 66 + name_units.len()];
    data[0..8].copy_from_slice(&parent_ref.to_le_bytes());
    data[8..16].copy_from_slice(&created.to_le_bytes());
    data[64] = name.encode_utf16().count() as u8;
    data[65] = namespace;
    data[66..].copy_from_slice(&name_units);
    data
}

/// Serializes a $STANDARD_INFORMATION content blob.
pub fn standard_info_content(created: u64, modified: u64, flags: u32) -> Vec<u8> {
    let mut data = vec![0u8; 48];
    data[0..8].copy_from_slice(&created.to_le_bytes());
    data[8..16].copy_from_slice(&modified.to_le_bytes());
    data[16..24].copy_from_slice(&modified.to_le_bytes());
    data[24..32].copy_from_slice(&modified.to_le_bytes());
    data[32..36].copy_from_slice(&flags.to_le_bytes());
    data
}

pub fn attr_end() -> [u8; 4] {
    [0xFF; 4]
}

pub struct MftEntryBuilder {
    entry_number: u64,
    sequence: u16,
    flags: MftRecordFlags,
    attributes: Vec<u8>,
    raw_attributes: Option<Vec<u8>>,
    size: usize,
}

impl MftEntryBuilder {
    pub fn new(entry_number: u64) -> MftEntryBuilder {
        MftEntryBuilder {
            entry_number,
            sequence: 1,
            flags: MftRecordFlags::IN_USE,
            attributes: Vec::new(),
            raw_attributes: None,
            size: 1024,
        }
    }

    pub fn sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn in_use(mut self, in_use: bool) -> Self {
        self.flags.set(MftRecordFlags::IN_USE, in_use);
        self
    }

    pub fn directory(mut self, directory: bool) -> Self {
        self.flags.set(MftRecordFlags::DIRECTORY, directory);
        self
    }

    pub fn push_attribute(mut self, attribute: Vec<u8>) -> Self {
        self.attributes.extend_from_slice(&attribute);
        self
    }

    /// Uses a pre-built attribute region verbatim (must include its own end
    /// marker).
    pub fn raw_attributes(mut self, raw: Vec<u8>) -> Self {
        self.raw_attributes = Some(raw);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = vec![0u8; self.size];
        data[0..4].copy_from_slice(b"FILE");
        data[4..6].copy_from_slice(&(FIXUP_OFFSET as u16).to_le_bytes());
        data[6..8].copy_from_slice(&3u16.to_le_bytes());
        data[16..18].copy_from_slice(&self.sequence.to_le_bytes());
        data[20..22].copy_from_slice(&(ATTR_OFFSET as u16).to_le_bytes());
        data[22..24].copy_from_slice(&self.flags.bits().to_le_bytes());
        data[44..48].copy_from_slice(&(self.entry_number as u32).to_le_bytes());

        let attrs = match self.raw_attributes {
            Some(raw) => raw,
            None => {
                let mut attrs = self.attributes;
                attrs.extend_from_slice(&attr_end());
                attrs.extend_from_slice(&[0u8; 4]);
                attrs
            }
        };
        let used_size = ATTR_OFFSET + attrs.len();
        assert!(used_size <= self.size, "attributes overflow the entry");
        data[24..28].copy_from_slice(&(used_size as u32).to_le_bytes());
        data[ATTR_OFFSET..used_size].copy_from_slice(&attrs);

        stamp_update_sequence(&mut data, FIXUP_OFFSET, 3);
        data
    }
}

/// Writes a valid update sequence: saves each sector tail into the array and
/// substitutes the signature word, the inverse of fixup application.
pub fn stamp_update_sequence(data: &mut [u8], offset: usize, count: usize) {
    let signature = [0x37, 0x13];
    data[offset..offset + 2].copy_from_slice(&signature);
    for i in 1..count {
        let tail = i * 512 - 2;
        let original = [data[tail], data[tail + 1]];
        data[offset + i * 2..offset + i * 2 + 2].copy_from_slice(&original);
        data[tail..tail + 2].copy_from_slice(&signature);
    }
}
