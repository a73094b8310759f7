//! Shared NTFS constants, flag sets and the 64-bit file reference.

use bitflags::bitflags;
use std::fmt;

/// Well-known MFT entry indices for the NTFS system files.
pub mod well_known {
    pub const MFT: u64 = 0;
    pub const MFT_MIRROR: u64 = 1;
    pub const LOG_FILE: u64 = 2;
    pub const VOLUME: u64 = 3;
    pub const ROOT: u64 = 5;
    pub const EXTEND: u64 = 11;
}

/// NTFS attribute type codes.
pub mod attr_type {
    pub const STANDARD_INFORMATION: u32 = 0x10;
    pub const ATTRIBUTE_LIST: u32 = 0x20;
    pub const FILE_NAME: u32 = 0x30;
    pub const DATA: u32 = 0x80;
    pub const INDEX_ROOT: u32 = 0x90;
    pub const INDEX_ALLOCATION: u32 = 0xA0;
    pub const END: u32 = 0xFFFF_FFFF;
}

/// A 64-bit NTFS file reference: low 48 bits are the MFT entry number, high
/// 16 bits the sequence number that validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileReference(pub u64);

impl FileReference {
    pub const ENTRY_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.0 & Self::ENTRY_MASK
    }

    #[must_use]
    pub const fn sequence(&self) -> u16 {
        (self.0 >> 48) as u16
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `entry-sequence` label used across all sinks.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}-{}", self.entry(), self.sequence())
    }
}

impl fmt::Display for FileReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.entry(), self.sequence())
    }
}

bitflags! {
    /// DOS attribute flags, as stored in $STANDARD_INFORMATION, $FILE_NAME
    /// and USN records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileAttrFlags: u32 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
        const DEVICE = 0x0040;
        const NORMAL = 0x0080;
        const TEMPORARY = 0x0100;
        const SPARSE_FILE = 0x0200;
        const REPARSE_POINT = 0x0400;
        const COMPRESSED = 0x0800;
        const OFFLINE = 0x1000;
        const NOT_CONTENT_INDEXED = 0x2000;
        const ENCRYPTED = 0x4000;
    }
}

bitflags! {
    /// MFT entry header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MftRecordFlags: u16 {
        const IN_USE = 0x0001;
        const DIRECTORY = 0x0002;
        const EXTENSION = 0x0004;
        const SPECIAL_INDEX = 0x0008;
    }
}

bitflags! {
    /// USN change-journal reason mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UsnReason: u32 {
        const DATA_OVERWRITE = 0x0000_0001;
        const DATA_EXTEND = 0x0000_0002;
        const DATA_TRUNCATION = 0x0000_0004;
        const NAMED_DATA_OVERWRITE = 0x0000_0010;
        const NAMED_DATA_EXTEND = 0x0000_0020;
        const NAMED_DATA_TRUNCATION = 0x0000_0040;
        const FILE_CREATE = 0x0000_0100;
        const FILE_DELETE = 0x0000_0200;
        const EA_CHANGE = 0x0000_0400;
        const SECURITY_CHANGE = 0x0000_0800;
        const RENAME_OLD_NAME = 0x0000_1000;
        const RENAME_NEW_NAME = 0x0000_2000;
        const INDEXABLE_CHANGE = 0x0000_4000;
        const BASIC_INFO_CHANGE = 0x0000_8000;
        const HARD_LINK_CHANGE = 0x0001_0000;
        const COMPRESSION_CHANGE = 0x0002_0000;
        const ENCRYPTION_CHANGE = 0x0004_0000;
        const OBJECT_ID_CHANGE = 0x0008_0000;
        const REPARSE_POINT_CHANGE = 0x0010_0000;
        const STREAM_CHANGE = 0x0020_0000;
        const TRANSACTED_CHANGE = 0x0040_0000;
        const INTEGRITY_CHANGE = 0x0080_0000;
        const CLOSE = 0x8000_0000;
    }
}

/// $FILE_NAME namespace byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNamespace {
    Posix,
    Win32,
    Dos,
    Win32AndDos,
}

impl FileNamespace {
    #[must_use]
    pub fn from_byte(b: u8) -> Option<FileNamespace> {
        match b {
            0 => Some(FileNamespace::Posix),
            1 => Some(FileNamespace::Win32),
            2 => Some(FileNamespace::Dos),
            3 => Some(FileNamespace::Win32AndDos),
            _ => None,
        }
    }
}

const FILE_ATTR_LABELS: &[(FileAttrFlags, &str)] = &[
    (FileAttrFlags::READ_ONLY, "ReadOnly"),
    (FileAttrFlags::HIDDEN, "Hidden"),
    (FileAttrFlags::SYSTEM, "System"),
    (FileAttrFlags::DIRECTORY, "Directory"),
    (FileAttrFlags::ARCHIVE, "Archive"),
    (FileAttrFlags::COMPRESSED, "Compressed"),
    (FileAttrFlags::ENCRYPTED, "Encrypted"),
    (FileAttrFlags::SPARSE_FILE, "Sparse"),
    (FileAttrFlags::REPARSE_POINT, "ReparsePoint"),
];

/// `|`-joined attribute label, `Normal` when no labeled bit is set.
#[must_use]
pub fn format_file_attr(flags: u32) -> String {
    let flags = FileAttrFlags::from_bits_truncate(flags);
    let labels: Vec<&str> = FILE_ATTR_LABELS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, label)| *label)
        .collect();
    if labels.is_empty() {
        "Normal".to_string()
    } else {
        labels.join("|")
    }
}

const USN_REASON_LABELS: &[(UsnReason, &str)] = &[
    (UsnReason::DATA_OVERWRITE, "DataOverwrite"),
    (UsnReason::DATA_EXTEND, "DataExtend"),
    (UsnReason::DATA_TRUNCATION, "DataTruncation"),
    (UsnReason::FILE_CREATE, "FileCreate"),
    (UsnReason::FILE_DELETE, "FileDelete"),
    (UsnReason::RENAME_OLD_NAME, "RenameOldName"),
    (UsnReason::RENAME_NEW_NAME, "RenameNewName"),
    (UsnReason::SECURITY_CHANGE, "SecurityChange"),
    (UsnReason::BASIC_INFO_CHANGE, "BasicInfoChange"),
    (UsnReason::HARD_LINK_CHANGE, "HardLinkChange"),
    (UsnReason::CLOSE, "Close"),
];

/// `|`-joined reason label, hex when no labeled bit is set.
#[must_use]
pub fn format_usn_reason(reason: u32) -> String {
    let flags = UsnReason::from_bits_truncate(reason);
    let labels: Vec<&str> = USN_REASON_LABELS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, label)| *label)
        .collect();
    if labels.is_empty() {
        format!("0x{reason:08X}")
    } else {
        labels.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_reference_splits_entry_and_sequence() {
        let reference = FileReference(0x0001_0000_0000_1234);
        assert_eq!(reference.entry(), 0x1234);
        assert_eq!(reference.sequence(), 1);
        assert_eq!(reference.label(), "4660-1");
    }

    #[test]
    fn file_reference_entry_fits_48_bits() {
        let reference = FileReference(u64::MAX);
        assert!(reference.entry() < 1u64 << 48);
        assert_eq!(reference.sequence(), 0xFFFF);
    }

    #[test]
    fn attr_label_joins_known_bits() {
        assert_eq!(format_file_attr(0), "Normal");
        assert_eq!(format_file_attr(0x0001), "ReadOnly");
        assert_eq!(format_file_attr(0x0023), "ReadOnly|Hidden|Archive");
        // NORMAL itself has no label.
        assert_eq!(format_file_attr(0x0080), "Normal");
    }

    #[test]
    fn usn_reason_label() {
        assert_eq!(format_usn_reason(0x0000_0100), "FileCreate");
        assert_eq!(
            format_usn_reason(0x8000_0100),
            "FileCreate|Close"
        );
        assert_eq!(format_usn_reason(0x0000_0400), "0x00000400");
    }
}
