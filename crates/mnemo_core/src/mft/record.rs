//! The flattened per-entry record: best $FILE_NAME, $STANDARD_INFORMATION
//! timestamps and default-stream summary.

use crate::mft::attribute::{AttributeBody, FileNameAttr, StandardInfo};
use crate::mft::entry::MftEntry;
use crate::time::Filetime;
use crate::types::{attr_type, FileReference};

/// One row of decoded MFT output.
#[derive(Debug, Clone, Default)]
pub struct MftRecord {
    pub entry_number: u64,
    pub sequence: u16,
    pub in_use: bool,
    pub is_directory: bool,

    pub si_created: Filetime,
    pub si_modified: Filetime,
    pub si_mft_modified: Filetime,
    pub si_accessed: Filetime,
    pub si_flags: u32,

    pub filename: String,
    pub parent_ref: FileReference,
    pub fn_created: Filetime,
    pub fn_modified: Filetime,
    pub fn_mft_modified: Filetime,
    pub fn_accessed: Filetime,
    pub fn_flags: u32,
    pub fn_allocated_size: u64,
    pub fn_real_size: u64,

    pub data_size: u64,
    pub is_resident: bool,

    /// Filled in by the path cache when path annotation is requested.
    pub full_path: String,
}

/// Namespace preference: Win32 and Win32+DOS tie at the top, then POSIX,
/// then DOS; first occurrence wins a tie.
fn namespace_rank(namespace: u8) -> u8 {
    match namespace {
        1 | 3 => 3,
        0 => 2,
        2 => 1,
        _ => 0,
    }
}

impl MftRecord {
    #[must_use]
    pub fn from_entry(entry: &MftEntry) -> MftRecord {
        let mut record = MftRecord {
            entry_number: entry.entry_number,
            sequence: entry.sequence,
            in_use: entry.is_in_use(),
            is_directory: entry.is_directory(),
            is_resident: true,
            ..MftRecord::default()
        };

        for attr in &entry.attributes {
            if attr.type_code != attr_type::STANDARD_INFORMATION {
                continue;
            }
            if let Some(si) = StandardInfo::parse(attr.resident_data()) {
                record.si_created = si.created;
                record.si_modified = si.modified;
                record.si_mft_modified = si.mft_modified;
                record.si_accessed = si.accessed;
                record.si_flags = si.dos_flags;
            }
            break;
        }

        let mut best: Option<FileNameAttr> = None;
        let mut best_rank = 0u8;
        for attr in &entry.attributes {
            if attr.type_code != attr_type::FILE_NAME {
                continue;
            }
            let Some(fn_attr) = FileNameAttr::parse(attr.resident_data()) else {
                continue;
            };
            let rank = namespace_rank(fn_attr.namespace);
            if best.is_none() || rank > best_rank {
                best_rank = rank;
                best = Some(fn_attr);
            }
        }
        if let Some(fn_attr) = best {
            record.filename = fn_attr.name;
            record.parent_ref = fn_attr.parent;
            record.fn_created = fn_attr.created;
            record.fn_modified = fn_attr.modified;
            record.fn_mft_modified = fn_attr.mft_modified;
            record.fn_accessed = fn_attr.accessed;
            record.fn_flags = fn_attr.flags;
            record.fn_allocated_size = fn_attr.allocated_size;
            record.fn_real_size = fn_attr.real_size;
        }

        for attr in &entry.attributes {
            if attr.type_code != attr_type::DATA || !attr.name.is_empty() {
                continue;
            }
            match &attr.body {
                AttributeBody::Resident { data } => {
                    record.is_resident = true;
                    record.data_size = data.len() as u64;
                }
                AttributeBody::NonResident { real_size, .. } => {
                    record.is_resident = false;
                    record.data_size = *real_size;
                }
            }
            break;
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mft::testutil::{
        file_name_content, non_resident_attribute, resident_attribute, standard_info_content,
        MftEntryBuilder,
    };
    use crate::mft::MftEntry;

    const CREATED: u64 = 132_223_104_000_000_000;

    #[test]
    fn record_flattens_si_and_filename() {
        let raw = MftEntryBuilder::new(64)
            .sequence(2)
            .in_use(true)
            .push_attribute(resident_attribute(
                0x10,
                "",
                &standard_info_content(CREATED, CREATED + 600_000_000, 0x20),
            ))
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(0x0002_0000_0000_0005, CREATED, 1, "report.docx"),
            ))
            .push_attribute(resident_attribute(0x80, "", b"0123456789"))
            .build();

        let entry = MftEntry::parse(&raw, 64).unwrap();
        let record = MftRecord::from_entry(&entry);

        assert_eq!(record.entry_number, 64);
        assert_eq!(record.sequence, 2);
        assert!(record.in_use);
        assert_eq!(record.si_created.0, CREATED);
        assert_eq!(record.si_flags, 0x20);
        assert_eq!(record.filename, "report.docx");
        assert_eq!(record.parent_ref.entry(), 5);
        assert_eq!(record.fn_created.0, CREATED);
        assert_eq!(record.data_size, 10);
        assert!(record.is_resident);
    }

    #[test]
    fn win32_name_beats_dos_name_regardless_of_order() {
        let raw = MftEntryBuilder::new(70)
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(5, CREATED, 2, "REPORT~1.DOC"),
            ))
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(5, CREATED, 1, "report of the year.docx"),
            ))
            .build();

        let entry = MftEntry::parse(&raw, 70).unwrap();
        let record = MftRecord::from_entry(&entry);
        assert_eq!(record.filename, "report of the year.docx");
    }

    #[test]
    fn posix_name_beats_dos_name() {
        let raw = MftEntryBuilder::new(71)
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(5, CREATED, 2, "SHORT~1"),
            ))
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(5, CREATED, 0, "posix:name"),
            ))
            .build();

        let entry = MftEntry::parse(&raw, 71).unwrap();
        let record = MftRecord::from_entry(&entry);
        assert_eq!(record.filename, "posix:name");
    }

    #[test]
    fn first_win32_name_wins_ties() {
        let raw = MftEntryBuilder::new(72)
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(5, CREATED, 3, "both.txt"),
            ))
            .push_attribute(resident_attribute(
                0x30,
                "",
                &file_name_content(5, CREATED, 1, "later.txt"),
            ))
            .build();

        let entry = MftEntry::parse(&raw, 72).unwrap();
        let record = MftRecord::from_entry(&entry);
        assert_eq!(record.filename, "both.txt");
    }

    #[test]
    fn non_resident_data_size_comes_from_real_size() {
        let raw = MftEntryBuilder::new(80)
            .push_attribute(non_resident_attribute(
                0x80,
                "",
                0,
                7,
                0x8000,
                0x7654,
                &[0x21, 0x08, 0x00, 0x10, 0x00],
            ))
            .build();

        let entry = MftEntry::parse(&raw, 80).unwrap();
        let record = MftRecord::from_entry(&entry);
        assert!(!record.is_resident);
        assert_eq!(record.data_size, 0x7654);
    }

    #[test]
    fn named_streams_do_not_shadow_the_default_stream() {
        let raw = MftEntryBuilder::new(81)
            .push_attribute(resident_attribute(0x80, "Zone.Identifier", b"[ZoneTransfer]"))
            .push_attribute(resident_attribute(0x80, "", b"body"))
            .build();

        let entry = MftEntry::parse(&raw, 81).unwrap();
        let record = MftRecord::from_entry(&entry);
        assert_eq!(record.data_size, 4);
    }
}
