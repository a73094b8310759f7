//! Output sinks: delimited CSV with BOM, newline-indented JSON arrays, and
//! the SQLite relational store.

mod csv;
mod json;
mod sqlite;

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::FixedOffset;
use serde::Serialize;

use mnemo_core::logfile::{format_opcode, LogRecord};
use mnemo_core::mft::MftRecord;
use mnemo_core::time::format_filetime;
use mnemo_core::timeline::TimelineEvent;
use mnemo_core::types::format_file_attr;
use mnemo_core::usnjrnl::UsnRecord;

pub use self::csv::CsvSink;
pub use self::json::JsonSink;
pub use self::sqlite::SqliteSink;

/// Output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
    Sqlite,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Sqlite => "db",
        }
    }
}

/// Which artifact table a sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Mft,
    UsnJrnl,
    LogFile,
    Timeline,
}

impl TableKind {
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            TableKind::Mft => &[
                "EntryNumber",
                "SequenceNumber",
                "InUse",
                "IsDirectory",
                "FileName",
                "FullPath",
                "FileAttr",
                "SI_Created",
                "SI_Modified",
                "SI_MFTModified",
                "SI_Accessed",
                "FN_Created",
                "FN_Modified",
                "FN_MFTModified",
                "FN_Accessed",
                "DataSize",
                "IsResident",
            ],
            TableKind::UsnJrnl => &[
                "Timestamp",
                "FileName",
                "FullPath",
                "Event",
                "FileAttr",
                "USN",
                "SourceInfo",
                "SecurityID",
            ],
            TableKind::LogFile => &[
                "LSN",
                "Timestamp",
                "FileName",
                "Event",
                "FileAttr",
                "FileReferenceNumber",
                "ParentFileReferenceNumber",
                "TransactionID",
                "RedoOp",
                "UndoOp",
                "TargetAttribute",
            ],
            TableKind::Timeline => &[
                "Timestamp",
                "Source",
                "Event",
                "FileName",
                "FullPath",
                "FileAttr",
                "FileReferenceNumber",
                "ParentFileReferenceNumber",
                "ExtraInfo",
            ],
        }
    }
}

/// One row of `parse-mft` output.
#[derive(Debug, Serialize)]
pub struct MftRow {
    #[serde(rename = "EntryNumber")]
    pub entry_number: u64,
    #[serde(rename = "SequenceNumber")]
    pub sequence_number: u16,
    #[serde(rename = "InUse")]
    pub in_use: bool,
    #[serde(rename = "IsDirectory")]
    pub is_directory: bool,
    #[serde(rename = "FileName")]
    pub filename: String,
    #[serde(rename = "FullPath")]
    pub full_path: String,
    #[serde(rename = "FileAttr")]
    pub file_attr: String,
    #[serde(rename = "SI_Created")]
    pub si_created: String,
    #[serde(rename = "SI_Modified")]
    pub si_modified: String,
    #[serde(rename = "SI_MFTModified")]
    pub si_mft_modified: String,
    #[serde(rename = "SI_Accessed")]
    pub si_accessed: String,
    #[serde(rename = "FN_Created")]
    pub fn_created: String,
    #[serde(rename = "FN_Modified")]
    pub fn_modified: String,
    #[serde(rename = "FN_MFTModified")]
    pub fn_mft_modified: String,
    #[serde(rename = "FN_Accessed")]
    pub fn_accessed: String,
    #[serde(rename = "DataSize")]
    pub data_size: u64,
    #[serde(rename = "IsResident")]
    pub is_resident: bool,
}

impl MftRow {
    pub fn from_record(record: &MftRecord, include_path: bool, zone: &FixedOffset) -> MftRow {
        MftRow {
            entry_number: record.entry_number,
            sequence_number: record.sequence,
            in_use: record.in_use,
            is_directory: record.is_directory,
            filename: record.filename.clone(),
            full_path: if include_path {
                record.full_path.clone()
            } else {
                String::new()
            },
            file_attr: format_file_attr(record.si_flags),
            si_created: format_filetime(record.si_created, zone),
            si_modified: format_filetime(record.si_modified, zone),
            si_mft_modified: format_filetime(record.si_mft_modified, zone),
            si_accessed: format_filetime(record.si_accessed, zone),
            fn_created: format_filetime(record.fn_created, zone),
            fn_modified: format_filetime(record.fn_modified, zone),
            fn_mft_modified: format_filetime(record.fn_mft_modified, zone),
            fn_accessed: format_filetime(record.fn_accessed, zone),
            data_size: record.data_size,
            is_resident: record.is_resident,
        }
    }
}

/// One row of `parse-usnjrnl` output.
#[derive(Debug, Serialize)]
pub struct UsnRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "FileName")]
    pub filename: String,
    #[serde(rename = "FullPath")]
    pub full_path: String,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "FileAttr")]
    pub file_attr: String,
    #[serde(rename = "USN")]
    pub usn: u64,
    #[serde(rename = "SourceInfo")]
    pub source_info: u32,
    #[serde(rename = "SecurityID")]
    pub security_id: u32,
}

impl UsnRow {
    pub fn from_record(record: &UsnRecord, full_path: String, zone: &FixedOffset) -> UsnRow {
        UsnRow {
            timestamp: format_filetime(record.timestamp, zone),
            filename: record.filename.clone(),
            full_path,
            event: record.event(),
            file_attr: format_file_attr(record.file_attributes),
            usn: record.usn,
            source_info: record.source_info,
            security_id: record.security_id,
        }
    }
}

/// One row of `parse-logfile` output.
#[derive(Debug, Serialize)]
pub struct LogRow {
    #[serde(rename = "LSN")]
    pub lsn: u64,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "FileName")]
    pub filename: String,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "FileAttr")]
    pub file_attr: String,
    #[serde(rename = "FileReferenceNumber")]
    pub file_reference: String,
    #[serde(rename = "ParentFileReferenceNumber")]
    pub parent_reference: String,
    #[serde(rename = "TransactionID")]
    pub transaction_id: u32,
    #[serde(rename = "RedoOp")]
    pub redo_op: String,
    #[serde(rename = "UndoOp")]
    pub undo_op: String,
    #[serde(rename = "TargetAttribute")]
    pub target_attribute: u16,
}

impl LogRow {
    pub fn from_record(record: &LogRecord, zone: &FixedOffset) -> LogRow {
        LogRow {
            lsn: record.this_lsn,
            timestamp: format_filetime(record.timestamp, zone),
            filename: record.filename.clone(),
            event: record.event(),
            file_attr: format_file_attr(record.file_attr),
            file_reference: if record.file_reference.is_zero() {
                String::new()
            } else {
                record.file_reference.label()
            },
            parent_reference: if record.parent_reference.is_zero() {
                String::new()
            } else {
                record.parent_reference.label()
            },
            transaction_id: record.transaction_id,
            redo_op: format_opcode(record.redo_op),
            undo_op: format_opcode(record.undo_op),
            target_attribute: record.target_attribute,
        }
    }
}

/// One row of unified timeline output.
#[derive(Debug, Serialize)]
pub struct TimelineRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "FileName")]
    pub filename: String,
    #[serde(rename = "FullPath")]
    pub full_path: String,
    #[serde(rename = "FileAttr")]
    pub file_attr: String,
    #[serde(rename = "FileReferenceNumber")]
    pub file_reference: String,
    #[serde(rename = "ParentFileReferenceNumber")]
    pub parent_reference: String,
    #[serde(rename = "ExtraInfo")]
    pub extra_info: String,
}

impl TimelineRow {
    pub fn from_event(event: &TimelineEvent) -> TimelineRow {
        TimelineRow {
            timestamp: event.timestamp.clone(),
            source: event.source.as_str().to_string(),
            event: event.event.clone(),
            filename: event.filename.clone(),
            full_path: event.full_path.clone(),
            file_attr: event.file_attr.clone(),
            file_reference: event.file_reference.clone(),
            parent_reference: event.parent_reference.clone(),
            extra_info: event.extra_info.clone(),
        }
    }
}

/// A sink for one artifact table in one of the three output formats.
pub enum Sink {
    Csv(CsvSink),
    Json(JsonSink),
    Sqlite(SqliteSink),
}

impl Sink {
    /// Opens a sink for `table` at `path`. SQLite output swaps the
    /// extension to `.db`.
    pub fn open(format: OutputFormat, path: &Path, table: TableKind) -> Result<Sink> {
        match format {
            OutputFormat::Csv => Ok(Sink::Csv(CsvSink::create(path, table)?)),
            OutputFormat::Json => Ok(Sink::Json(JsonSink::create(path)?)),
            OutputFormat::Sqlite => {
                let path = sqlite_path(path);
                Ok(Sink::Sqlite(SqliteSink::create(&path, table)?))
            }
        }
    }

    pub fn write_mft(&mut self, row: &MftRow) -> Result<()> {
        match self {
            Sink::Csv(sink) => sink.write(row),
            Sink::Json(sink) => sink.write(row),
            Sink::Sqlite(sink) => sink.insert_mft(row),
        }
    }

    pub fn write_usn(&mut self, row: &UsnRow) -> Result<()> {
        match self {
            Sink::Csv(sink) => sink.write(row),
            Sink::Json(sink) => sink.write(row),
            Sink::Sqlite(sink) => sink.insert_usn(row),
        }
    }

    pub fn write_log(&mut self, row: &LogRow) -> Result<()> {
        match self {
            Sink::Csv(sink) => sink.write(row),
            Sink::Json(sink) => sink.write(row),
            Sink::Sqlite(sink) => sink.insert_log(row),
        }
    }

    pub fn write_timeline(&mut self, row: &TimelineRow) -> Result<()> {
        match self {
            Sink::Csv(sink) => sink.write(row),
            Sink::Json(sink) => sink.write(row),
            Sink::Sqlite(sink) => sink.insert_timeline(row),
        }
    }

    /// Flushes buffers, commits pending batches and builds indexes.
    pub fn finish(self) -> Result<()> {
        match self {
            Sink::Csv(sink) => sink.finish(),
            Sink::Json(sink) => sink.finish(),
            Sink::Sqlite(sink) => sink.finish(),
        }
    }
}

/// Forces a `.db` extension the way the relational writer expects.
pub fn sqlite_path(path: &Path) -> PathBuf {
    let mut path = path.to_path_buf();
    path.set_extension("db");
    path
}
