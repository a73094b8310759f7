//! MFT attribute decoding: resident/non-resident bodies, data runs,
//! $ATTRIBUTE_LIST entries and the $STANDARD_INFORMATION / $FILE_NAME
//! content structures.

use crate::bytes::{le_int, le_u16, le_u32, le_u64, le_uint, utf16le};
use crate::time::Filetime;
use crate::types::FileReference;

/// One extent of a non-resident attribute. `start_lcn` is `None` for sparse
/// runs; otherwise it is the absolute LCN after accumulating the signed
/// per-run deltas (and can go negative on corrupt input).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRun {
    pub start_lcn: Option<i64>,
    /// Run length in clusters.
    pub length: u64,
}

impl DataRun {
    #[must_use]
    pub const fn is_sparse(&self) -> bool {
        self.start_lcn.is_none()
    }
}

/// Decodes a run list.
///
/// Each run starts with a header byte: low nibble is the length field width,
/// high nibble the offset field width. The offset is a signed delta from the
/// previous run's LCN; width zero marks a sparse run with no cluster delta.
/// A zero header byte terminates the list.
#[must_use]
pub fn decode_data_runs(data: &[u8]) -> Vec<DataRun> {
    let mut runs = Vec::new();
    let mut offset = 0usize;
    let mut current_lcn: i64 = 0;

    while offset < data.len() {
        let header = data[offset];
        if header == 0 {
            break;
        }
        let length_size = (header & 0x0F) as usize;
        let offset_size = (header >> 4) as usize;
        if length_size == 0 || length_size > 8 || offset_size > 8 {
            break;
        }
        if offset + 1 + length_size + offset_size > data.len() {
            break;
        }

        let Some(length) = le_uint(data, offset + 1, length_size) else {
            break;
        };
        if offset_size > 0 {
            let Some(delta) = le_int(data, offset + 1 + length_size, offset_size) else {
                break;
            };
            current_lcn = current_lcn.wrapping_add(delta);
            runs.push(DataRun {
                start_lcn: Some(current_lcn),
                length,
            });
        } else {
            runs.push(DataRun {
                start_lcn: None,
                length,
            });
        }

        offset += 1 + length_size + offset_size;
    }

    runs
}

/// Attribute payload: the resident/non-resident split is a second tag over
/// the type code.
#[derive(Debug, Clone)]
pub enum AttributeBody {
    Resident {
        data: Vec<u8>,
    },
    NonResident {
        start_vcn: u64,
        end_vcn: u64,
        allocated_size: u64,
        /// Only stored on disk for the VCN-0 extent; continuation extents
        /// fall back to the allocated size.
        real_size: u64,
        initialized_size: u64,
        compression_unit: u16,
        runs: Vec<DataRun>,
    },
}

/// A decoded attribute from an MFT entry.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub type_code: u32,
    /// UTF-16-decoded attribute name; empty for the default stream.
    pub name: String,
    pub flags: u16,
    pub id: u16,
    pub body: AttributeBody,
}

impl Attribute {
    /// Parses one attribute from its full on-disk slice.
    #[must_use]
    pub fn parse(type_code: u32, data: &[u8]) -> Option<Attribute> {
        if data.len() < 16 {
            return None;
        }
        let non_resident = data[8] != 0;
        let name_length = data[9] as usize;
        let name_offset = le_u16(data, 10)? as usize;
        let flags = le_u16(data, 12)?;
        let id = le_u16(data, 14)?;

        let name = if name_length > 0 {
            data.get(name_offset..name_offset + name_length * 2)
                .and_then(utf16le)
                .unwrap_or_default()
        } else {
            String::new()
        };

        let body = if non_resident {
            Self::parse_non_resident(data)?
        } else {
            Self::parse_resident(data)
        };

        Some(Attribute {
            type_code,
            name,
            flags,
            id,
            body,
        })
    }

    fn parse_resident(data: &[u8]) -> AttributeBody {
        let content_size = le_u32(data, 16).unwrap_or(0) as usize;
        let content_offset = le_u16(data, 20).unwrap_or(0) as usize;
        let content = data
            .get(content_offset..content_offset.saturating_add(content_size))
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        AttributeBody::Resident { data: content }
    }

    fn parse_non_resident(data: &[u8]) -> Option<AttributeBody> {
        if data.len() < 48 {
            return None;
        }
        let start_vcn = le_u64(data, 16)?;
        let end_vcn = le_u64(data, 24)?;
        let run_offset = le_u16(data, 32)? as usize;
        let compression_unit = le_u16(data, 34)?;
        let allocated_size = le_u64(data, 40)?;
        let (real_size, initialized_size) = if start_vcn == 0 && data.len() >= 64 {
            (le_u64(data, 48)?, le_u64(data, 56)?)
        } else {
            (allocated_size, allocated_size)
        };
        let runs = if run_offset < data.len() {
            decode_data_runs(&data[run_offset..])
        } else {
            Vec::new()
        };
        Some(AttributeBody::NonResident {
            start_vcn,
            end_vcn,
            allocated_size,
            real_size,
            initialized_size,
            compression_unit,
            runs,
        })
    }

    /// Resident content bytes; empty for non-resident attributes.
    #[must_use]
    pub fn resident_data(&self) -> &[u8] {
        match &self.body {
            AttributeBody::Resident { data } => data,
            AttributeBody::NonResident { .. } => &[],
        }
    }

    #[must_use]
    pub fn is_non_resident(&self) -> bool {
        matches!(self.body, AttributeBody::NonResident { .. })
    }
}

/// $STANDARD_INFORMATION content (type 0x10).
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardInfo {
    pub created: Filetime,
    pub modified: Filetime,
    pub mft_modified: Filetime,
    pub accessed: Filetime,
    pub dos_flags: u32,
}

impl StandardInfo {
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<StandardInfo> {
        if data.len() < 48 {
            return None;
        }
        Some(StandardInfo {
            created: Filetime(le_u64(data, 0)?),
            modified: Filetime(le_u64(data, 8)?),
            mft_modified: Filetime(le_u64(data, 16)?),
            accessed: Filetime(le_u64(data, 24)?),
            dos_flags: le_u32(data, 32)?,
        })
    }
}

/// $FILE_NAME content (type 0x30). The same layout is embedded in $I30 index
/// entries and shows up inside $LogFile redo/undo payloads.
#[derive(Debug, Clone, Default)]
pub struct FileNameAttr {
    pub parent: FileReference,
    pub created: Filetime,
    pub modified: Filetime,
    pub mft_modified: Filetime,
    pub accessed: Filetime,
    pub allocated_size: u64,
    pub real_size: u64,
    pub flags: u32,
    pub namespace: u8,
    pub name: String,
}

impl FileNameAttr {
    /// Fixed-size header before the UTF-16LE name.
    pub const HEADER_LEN: usize = 66;

    #[must_use]
    pub fn parse(data: &[u8]) -> Option<FileNameAttr> {
        if data.len() < Self::HEADER_LEN {
            return None;
        }
        let name_length = data[64] as usize;
        let namespace = data[65];
        let name = data
            .get(66..66 + name_length * 2)
            .and_then(utf16le)
            .unwrap_or_default();
        Some(FileNameAttr {
            parent: FileReference(le_u64(data, 0)?),
            created: Filetime(le_u64(data, 8)?),
            modified: Filetime(le_u64(data, 16)?),
            mft_modified: Filetime(le_u64(data, 24)?),
            accessed: Filetime(le_u64(data, 32)?),
            allocated_size: le_u64(data, 40)?,
            real_size: le_u64(data, 48)?,
            flags: le_u32(data, 56)?,
            namespace,
            name,
        })
    }
}

/// One $ATTRIBUTE_LIST entry: which MFT entry holds an attribute extent.
#[derive(Debug, Clone)]
pub struct AttributeListEntry {
    pub type_code: u32,
    pub name: String,
    pub start_vcn: u64,
    pub mft_reference: FileReference,
}

/// Parses resident $ATTRIBUTE_LIST content into its entries.
#[must_use]
pub fn parse_attribute_list(data: &[u8]) -> Vec<AttributeListEntry> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset + 26 <= data.len() {
        let Some(type_code) = le_u32(data, offset) else {
            break;
        };
        let record_length = le_u16(data, offset + 4).unwrap_or(0) as usize;
        if record_length == 0 || offset + record_length > data.len() {
            break;
        }
        let name_length = data[offset + 6] as usize;
        let name_offset = data[offset + 7] as usize;
        let start_vcn = le_u64(data, offset + 8).unwrap_or(0);
        let mft_reference = FileReference(le_u64(data, offset + 16).unwrap_or(0));
        let name = if name_length > 0 {
            data.get(offset + name_offset..offset + name_offset + name_length * 2)
                .and_then(utf16le)
                .unwrap_or_default()
        } else {
            String::new()
        };

        entries.push(AttributeListEntry {
            type_code,
            name,
            start_vcn,
            mft_reference,
        });
        offset += record_length;
    }

    entries
}
