//! $LogFile decoder: RSTR/RCRD page framing, 88-byte log-record headers and
//! the opcode-driven $FILE_NAME heuristics over redo/undo payloads.
//!
//! The payload layout depends on the operation code, so filename recovery is
//! best-effort: index-entry interpretation first, then attribute-header
//! interpretation, then an aligned scan for anything shaped like a
//! $FILE_NAME structure.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::bytes::{le_u16, le_u32, le_u64, utf16le};
use crate::error::Result;
use crate::fixup::apply_fixup;
use crate::time::Filetime;
use crate::types::FileReference;

const DEFAULT_PAGE_SIZE: usize = 4096;
const LOG_RECORD_HEADER_SIZE: usize = 0x58;
/// Entry-number sanity bound for heuristically recovered references.
const MAX_PLAUSIBLE_ENTRY: u64 = 1 << 40;

/// Operation codes that carry an index entry (and so a $FILE_NAME) in their
/// payload.
const FILENAME_OPS: [u16; 6] = [0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x12];

fn opcode_name(op: u16) -> Option<&'static str> {
    Some(match op {
        0x00 => "Noop",
        0x01 => "CompensationLogRecord",
        0x02 => "InitializeFileRecordSegment",
        0x03 => "DeallocateFileRecordSegment",
        0x04 => "WriteEndOfFileRecordSegment",
        0x05 => "CreateAttribute",
        0x06 => "DeleteAttribute",
        0x07 => "UpdateResidentValue",
        0x08 => "UpdateNonresidentValue",
        0x09 => "UpdateMappingPairs",
        0x0A => "DeleteDirtyClusters",
        0x0B => "SetNewAttributeSizes",
        0x0C => "AddIndexEntryRoot",
        0x0D => "DeleteIndexEntryRoot",
        0x0E => "AddIndexEntryAllocation",
        0x0F => "UpdateFileNameRoot",
        0x10 => "UpdateFileNameAllocation",
        0x11 => "SetIndexEntryVcnAllocation",
        0x12 => "DeleteIndexEntryAllocation",
        0x13 => "SetBitsInNonresidentBitMap",
        0x14 => "ClearBitsInNonresidentBitMap",
        0x15 => "SetBitsInNonresidentBitMap2",
        0x19 => "PrepareTransaction",
        0x1A => "CommitTransaction",
        0x1B => "ForgetTransaction",
        0x1C => "OpenNonresidentAttribute",
        0x1F => "DirtyPageTableDump",
        0x20 => "TransactionTableDump",
        0x21 => "UpdateRecordDataRoot",
        _ => return None,
    })
}

/// Event label: opcode name or `Op0xNN` for unknown codes.
#[must_use]
pub fn format_opcode_event(op: u16) -> String {
    opcode_name(op)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Op0x{op:02X}"))
}

/// RedoOp/UndoOp column label: opcode name or bare `0xNN`.
#[must_use]
pub fn format_opcode(op: u16) -> String {
    opcode_name(op)
        .map(str::to_string)
        .unwrap_or_else(|| format!("0x{op:02X}"))
}

/// Decoded RSTR page header.
#[derive(Debug, Clone, Default)]
pub struct RestartPage {
    pub system_page_size: u32,
    pub log_page_size: u32,
    pub restart_offset: u16,
    pub minor_version: u16,
    pub major_version: u16,
    pub current_lsn: u64,
    pub log_clients: u16,
}

impl RestartPage {
    #[must_use]
    pub fn parse(raw: &[u8]) -> Option<RestartPage> {
        if raw.len() < 0x40 || &raw[0..4] != b"RSTR" {
            return None;
        }
        let mut data = raw.to_vec();
        let fixup_offset = le_u16(&data, 4)? as usize;
        let fixup_count = le_u16(&data, 6)? as usize;
        if fixup_count > 1 && fixup_offset > 0 && !apply_fixup(&mut data, fixup_offset, fixup_count)
        {
            return None;
        }
        Some(RestartPage {
            system_page_size: le_u32(&data, 0x10)?,
            log_page_size: le_u32(&data, 0x14)?,
            restart_offset: le_u16(&data, 0x18)?,
            minor_version: le_u16(&data, 0x1A)?,
            major_version: le_u16(&data, 0x1C)?,
            current_lsn: le_u64(&data, 0x30)?,
            log_clients: le_u16(&data, 0x38)?,
        })
    }
}

/// Decoded RCRD page: header fields plus the fixed-up page payload.
#[derive(Debug, Clone)]
pub struct RecordPage {
    pub last_lsn: u64,
    pub flags: u32,
    pub page_count: u16,
    pub page_position: u16,
    pub next_record_offset: u16,
    pub last_end_lsn: u64,
    data: Vec<u8>,
}

impl RecordPage {
    pub const HEADER_SIZE: usize = 0x30;

    #[must_use]
    pub fn parse(raw: &[u8]) -> Option<RecordPage> {
        if raw.len() < Self::HEADER_SIZE || &raw[0..4] != b"RCRD" {
            return None;
        }
        let mut data = raw.to_vec();
        let fixup_offset = le_u16(&data, 4)? as usize;
        let fixup_count = le_u16(&data, 6)? as usize;
        if fixup_count > 1 && fixup_offset > 0 && !apply_fixup(&mut data, fixup_offset, fixup_count)
        {
            return None;
        }
        Some(RecordPage {
            last_lsn: le_u64(&data, 0x08)?,
            flags: le_u32(&data, 0x10)?,
            page_count: le_u16(&data, 0x14)?,
            page_position: le_u16(&data, 0x16)?,
            next_record_offset: le_u16(&data, 0x18)?,
            last_end_lsn: le_u64(&data, 0x20)?,
            data,
        })
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One log record: the 88-byte header plus whatever the payload heuristics
/// recovered.
#[derive(Debug, Clone, Default)]
pub struct LogRecord {
    pub this_lsn: u64,
    pub previous_lsn: u64,
    pub client_undo_lsn: u64,
    pub client_data_length: u32,
    pub client_id: u32,
    pub record_type: u32,
    pub transaction_id: u32,
    pub flags: u16,
    pub redo_op: u16,
    pub undo_op: u16,
    pub redo_offset: u16,
    pub redo_length: u16,
    pub undo_offset: u16,
    pub undo_length: u16,
    pub target_attribute: u16,
    pub lcns_to_follow: u16,
    pub record_offset: u16,
    pub attribute_offset: u16,
    pub target_vcn: u64,
    /// Low dword at 0x50; the upper half of the on-disk field is not
    /// decoded.
    pub target_lcn: u32,

    pub filename: String,
    pub file_reference: FileReference,
    pub parent_reference: FileReference,
    pub timestamp: Filetime,
    pub file_attr: u32,
}

impl LogRecord {
    #[must_use]
    pub fn lsn(&self) -> u64 {
        self.this_lsn
    }

    /// Event label derived from the redo opcode.
    #[must_use]
    pub fn event(&self) -> String {
        format_opcode_event(self.redo_op)
    }
}

/// Streaming parser over an extracted `$LogFile`.
pub struct LogFileParser {
    path: PathBuf,
}

impl LogFileParser {
    pub fn new(path: impl AsRef<Path>) -> LogFileParser {
        LogFileParser {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Reads the restart area from the first page, falling back to the
    /// second. `None` when neither page carries an `RSTR` signature.
    pub fn parse_restart_area(&self) -> Result<Option<RestartPage>> {
        let mut file = File::open(&self.path)?;
        let mut page = vec![0u8; DEFAULT_PAGE_SIZE];
        for _ in 0..2 {
            let n = read_up_to(&mut file, &mut page)?;
            if n == 0 {
                break;
            }
            if let Some(restart) = RestartPage::parse(&page[..n]) {
                return Ok(Some(restart));
            }
        }
        Ok(None)
    }

    /// Lazily yields records in page order (LSN-ascending within a page).
    /// Without a valid restart area the sequence is empty.
    pub fn iter_records(&self) -> Result<LogRecordIter> {
        let Some(restart) = self.parse_restart_area()? else {
            tracing::debug!("no RSTR page found, emitting nothing");
            return Ok(LogRecordIter::empty());
        };
        let page_size = if restart.log_page_size != 0 {
            restart.log_page_size as usize
        } else {
            DEFAULT_PAGE_SIZE
        };
        let file = File::open(&self.path)?;
        let file_size = file.metadata()?.len();
        Ok(LogRecordIter {
            file: Some(file),
            file_size,
            page_size,
            page_offset: (page_size as u64) * 2,
            page: None,
            offset_in_page: 0,
        })
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Pull iterator over log records; record pages are decoded one at a time.
pub struct LogRecordIter {
    file: Option<File>,
    file_size: u64,
    page_size: usize,
    page_offset: u64,
    page: Option<RecordPage>,
    offset_in_page: usize,
}

impl LogRecordIter {
    fn empty() -> LogRecordIter {
        LogRecordIter {
            file: None,
            file_size: 0,
            page_size: DEFAULT_PAGE_SIZE,
            page_offset: 0,
            page: None,
            offset_in_page: 0,
        }
    }

    fn load_next_page(&mut self) -> Result<Option<RecordPage>> {
        loop {
            let Some(file) = self.file.as_mut() else {
                return Ok(None);
            };
            if self.page_offset + self.page_size as u64 > self.file_size {
                self.file = None;
                return Ok(None);
            }
            file.seek(SeekFrom::Start(self.page_offset))?;
            let mut raw = vec![0u8; self.page_size];
            match file.read_exact(&mut raw) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.file = None;
                    return Ok(None);
                }
                Err(e) => {
                    self.file = None;
                    return Err(e.into());
                }
            }
            self.page_offset += self.page_size as u64;

            if raw[0..4] == [0, 0, 0, 0] {
                continue;
            }
            match RecordPage::parse(&raw) {
                Some(page) => return Ok(Some(page)),
                None => continue,
            }
        }
    }
}

impl Iterator for LogRecordIter {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(page) = &self.page {
                if let Some((record, next_offset)) =
                    next_record_in_page(page.data(), self.offset_in_page)
                {
                    self.offset_in_page = next_offset;
                    return Some(Ok(record));
                }
                self.page = None;
            }
            match self.load_next_page() {
                Ok(Some(page)) => {
                    self.page = Some(page);
                    self.offset_in_page = RecordPage::HEADER_SIZE;
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Finds the next record at or after `offset`. A zero LSN ends the page; a
/// failed parse advances 8 bytes and retries, tolerating partial tail
/// records.
fn next_record_in_page(data: &[u8], mut offset: usize) -> Option<(LogRecord, usize)> {
    while offset + LOG_RECORD_HEADER_SIZE <= data.len() {
        if data[offset..offset + 8].iter().all(|&b| b == 0) {
            return None;
        }
        match parse_log_record(data, offset) {
            Some(record) => {
                let advance =
                    (LOG_RECORD_HEADER_SIZE + record.client_data_length as usize + 7) & !7;
                return Some((record, offset + advance));
            }
            None => offset += 8,
        }
    }
    None
}

fn parse_log_record(data: &[u8], offset: usize) -> Option<LogRecord> {
    let this_lsn = le_u64(data, offset)?;
    if this_lsn == 0 {
        return None;
    }
    let client_data_length = le_u32(data, offset + 0x18)?;
    if client_data_length > 0x10000 {
        return None;
    }

    let mut record = LogRecord {
        this_lsn,
        previous_lsn: le_u64(data, offset + 0x08)?,
        client_undo_lsn: le_u64(data, offset + 0x10)?,
        client_data_length,
        client_id: le_u32(data, offset + 0x1C)?,
        record_type: le_u32(data, offset + 0x20)?,
        transaction_id: le_u32(data, offset + 0x24)?,
        flags: le_u16(data, offset + 0x28)?,
        redo_op: le_u16(data, offset + 0x30)?,
        undo_op: le_u16(data, offset + 0x32)?,
        redo_offset: le_u16(data, offset + 0x34)?,
        redo_length: le_u16(data, offset + 0x36)?,
        undo_offset: le_u16(data, offset + 0x38)?,
        undo_length: le_u16(data, offset + 0x3A)?,
        target_attribute: le_u16(data, offset + 0x3C)?,
        lcns_to_follow: le_u16(data, offset + 0x3E)?,
        record_offset: le_u16(data, offset + 0x40)?,
        attribute_offset: le_u16(data, offset + 0x42)?,
        target_vcn: le_u64(data, offset + 0x48)?,
        target_lcn: le_u32(data, offset + 0x50)?,
        ..LogRecord::default()
    };

    let client_start = offset + LOG_RECORD_HEADER_SIZE;
    let client_len = client_data_length as usize;
    if client_len > 0 && client_start + client_len <= data.len() {
        parse_client_data(&mut record, &data[client_start..client_start + client_len]);
    }
    Some(record)
}

/// Opcode-driven filename recovery over the client payload.
fn parse_client_data(record: &mut LogRecord, data: &[u8]) {
    if data.is_empty() {
        return;
    }

    if FILENAME_OPS.contains(&record.redo_op) {
        if let Some(redo) = payload_window(data, record.redo_offset, record.redo_length) {
            extract_from_index_entry(record, redo);
        }
        if record.filename.is_empty() {
            extract_from_index_entry(record, data);
        }
    }

    if record.filename.is_empty() && FILENAME_OPS.contains(&record.undo_op) {
        if let Some(undo) = payload_window(data, record.undo_offset, record.undo_length) {
            extract_from_index_entry(record, undo);
        }
    }

    // InitializeFileRecordSegment: the payload is a fresh MFT record.
    if record.filename.is_empty() && record.redo_op == 0x02 {
        if let Some(redo) = payload_window(data, record.redo_offset, record.redo_length) {
            scan_for_filename(record, redo);
        }
        if record.filename.is_empty() {
            scan_for_filename(record, data);
        }
    }

    // Create/DeleteAttribute: a resident attribute header may wrap $FILE_NAME.
    if record.filename.is_empty() && matches!(record.redo_op, 0x05 | 0x06) {
        if let Some(redo) = payload_window(data, record.redo_offset, record.redo_length) {
            parse_attribute_for_filename(record, redo);
        }
        if record.filename.is_empty() {
            parse_attribute_for_filename(record, data);
        }
    }

    if record.filename.is_empty() && data.len() >= 0x44 {
        scan_for_filename(record, data);
    }
}

fn payload_window(data: &[u8], offset: u16, length: u16) -> Option<&[u8]> {
    if length == 0 {
        return None;
    }
    data.get(offset as usize..offset as usize + length as usize)
}

/// Interprets `data` as a $I30 index entry: file reference, entry/content
/// lengths, then $FILE_NAME content at 0x10. Falls back to treating the
/// whole window as $FILE_NAME content.
fn extract_from_index_entry(record: &mut LogRecord, data: &[u8]) {
    if data.len() < 0x52 {
        parse_filename_at(record, data, 0);
        return;
    }

    let file_ref = le_u64(data, 0).unwrap_or(0);
    let entry_len = le_u16(data, 0x08).unwrap_or(0);
    let content_len = le_u16(data, 0x0A).unwrap_or(0);

    if (file_ref & FileReference::ENTRY_MASK) < MAX_PLAUSIBLE_ENTRY
        && entry_len > 0x10
        && content_len > 0
    {
        record.file_reference = FileReference(file_ref);
        if data.len() >= 0x10 + 0x44 {
            parse_filename_at(record, data, 0x10);
            if !record.filename.is_empty() {
                return;
            }
        }
    }

    parse_filename_at(record, data, 0);
}

/// Validates and extracts a $FILE_NAME structure at `offset`: name length
/// 1..=255 characters, namespace ≤ 3, fully printable decoded name.
fn parse_filename_at(record: &mut LogRecord, data: &[u8], offset: usize) {
    if offset + 0x44 > data.len() {
        return;
    }
    let name_len = data[offset + 0x40] as usize;
    let namespace = data[offset + 0x41];
    if !(1..=255).contains(&name_len) || namespace > 3 {
        return;
    }
    let name_end = offset + 0x42 + name_len * 2;
    if name_end > data.len() {
        return;
    }
    let Some(filename) = utf16le(&data[offset + 0x42..name_end]) else {
        return;
    };
    if filename.is_empty() || !is_printable_name(&filename) {
        return;
    }

    record.filename = filename;
    record.parent_reference = FileReference(le_u64(data, offset).unwrap_or(0));
    let created = le_u64(data, offset + 0x08).unwrap_or(0);
    if created > 0 {
        record.timestamp = Filetime(created);
    }
    record.file_attr = le_u32(data, offset + 0x38).unwrap_or(0);
}

/// Interprets `data` as a resident attribute header (24 bytes) wrapping
/// $FILE_NAME content; anything else degrades to the aligned scan.
fn parse_attribute_for_filename(record: &mut LogRecord, data: &[u8]) {
    if data.len() < 0x18 {
        return;
    }
    let type_code = le_u32(data, 0).unwrap_or(0);
    if type_code == crate::types::attr_type::FILE_NAME {
        let attr_length = le_u32(data, 4).unwrap_or(0);
        if attr_length > 0x18 && data.len() > 0x18 {
            parse_filename_at(record, data, 0x18);
        }
    } else {
        scan_for_filename(record, data);
    }
}

/// Probes 8-byte-aligned offsets for the first candidate that looks like a
/// $FILE_NAME: valid name length and namespace, printable decoded name, and
/// a plausible parent-reference entry number.
fn scan_for_filename(record: &mut LogRecord, data: &[u8]) {
    if data.len() < 0x44 {
        return;
    }
    let mut offset = 0usize;
    while offset + 0x44 < data.len() {
        let name_len = data[offset + 0x40] as usize;
        let namespace = data[offset + 0x41];
        if (1..=255).contains(&name_len) && namespace <= 3 {
            let name_end = offset + 0x42 + name_len * 2;
            if name_end <= data.len() {
                if let Some(filename) = utf16le(&data[offset + 0x42..name_end]) {
                    if !filename.is_empty() && is_printable_name(&filename) {
                        let parent_ref = le_u64(data, offset).unwrap_or(0);
                        if parent_ref & FileReference::ENTRY_MASK < MAX_PLAUSIBLE_ENTRY {
                            record.filename = filename;
                            record.parent_reference = FileReference(parent_ref);
                            let created = le_u64(data, offset + 0x08).unwrap_or(0);
                            if created > 0 {
                                record.timestamp = Filetime(created);
                            }
                            record.file_attr = le_u32(data, offset + 0x38).unwrap_or(0);
                            return;
                        }
                    }
                }
            }
        }
        offset += 8;
    }
}

fn is_printable_name(name: &str) -> bool {
    name.chars().all(|c| c == '\t' || !c.is_control())
}
