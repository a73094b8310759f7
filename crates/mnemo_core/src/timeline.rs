//! Unified timeline: lazily concatenates MFT, UsnJrnl and LogFile events.
//!
//! The emitter does not sort globally; within one artifact events come out
//! in on-disk order and the sink is expected to index by timestamp.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::FixedOffset;

use crate::error::Result;
use crate::logfile::{LogRecord, LogRecordIter};
use crate::mft::parser::MftRecordIter;
use crate::mft::record::MftRecord;
use crate::paths::PathCache;
use crate::time::format_filetime;
use crate::types::format_file_attr;
use crate::usnjrnl::{UsnRecord, UsnRecordIter};

/// Artifact that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Mft,
    UsnJrnl,
    LogFile,
}

impl EventSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventSource::Mft => "MFT",
            EventSource::UsnJrnl => "UsnJrnl",
            EventSource::LogFile => "LogFile",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the unified timeline, rendered for the sink.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    pub timestamp: String,
    pub source: EventSource,
    pub event: String,
    pub filename: String,
    pub full_path: String,
    pub file_attr: String,
    pub file_reference: String,
    pub parent_reference: String,
    /// `USN:<n>` or `LSN:<n>`.
    pub extra_info: String,
}

/// Lazy source-ordered event stream: all MFT events, then UsnJrnl, then
/// LogFile. Absent artifacts are simply skipped.
pub struct TimelineIter {
    zone: FixedOffset,
    paths: Option<Arc<PathCache>>,
    mft: Option<MftRecordIter>,
    usnjrnl: Option<UsnRecordIter>,
    logfile: Option<LogRecordIter>,
    pending: VecDeque<TimelineEvent>,
}

impl TimelineIter {
    #[must_use]
    pub fn new(
        zone: FixedOffset,
        paths: Option<Arc<PathCache>>,
        mft: Option<MftRecordIter>,
        usnjrnl: Option<UsnRecordIter>,
        logfile: Option<LogRecordIter>,
    ) -> TimelineIter {
        TimelineIter {
            zone,
            paths,
            mft,
            usnjrnl,
            logfile,
            pending: VecDeque::new(),
        }
    }

    fn path_for(&self, entry: u64) -> String {
        self.paths
            .as_ref()
            .map(|cache| cache.get(entry).to_string())
            .unwrap_or_default()
    }

    fn push_mft_events(&mut self, record: &MftRecord) {
        let created = format_filetime(record.si_created, &self.zone);
        let modified = format_filetime(record.si_modified, &self.zone);
        let full_path = self.path_for(record.entry_number);
        let file_reference = format!("{}-{}", record.entry_number, record.sequence);

        if !created.is_empty() {
            self.pending.push_back(TimelineEvent {
                timestamp: created.clone(),
                source: EventSource::Mft,
                event: "FileCreate (SI)".to_string(),
                filename: record.filename.clone(),
                full_path: full_path.clone(),
                file_attr: record.si_flags.to_string(),
                file_reference: file_reference.clone(),
                parent_reference: record.parent_ref.0.to_string(),
                extra_info: String::new(),
            });
        }
        if !modified.is_empty() && modified != created {
            self.pending.push_back(TimelineEvent {
                timestamp: modified,
                source: EventSource::Mft,
                event: "FileModify (SI)".to_string(),
                filename: record.filename.clone(),
                full_path,
                file_attr: record.si_flags.to_string(),
                file_reference,
                parent_reference: record.parent_ref.0.to_string(),
                extra_info: String::new(),
            });
        }
    }

    fn usn_event(&self, record: &UsnRecord) -> TimelineEvent {
        TimelineEvent {
            timestamp: format_filetime(record.timestamp, &self.zone),
            source: EventSource::UsnJrnl,
            event: record.event(),
            filename: record.filename.clone(),
            full_path: self.path_for(record.file_reference.entry()),
            file_attr: format_file_attr(record.file_attributes),
            file_reference: record.file_reference.label(),
            parent_reference: record.parent_file_reference.label(),
            extra_info: format!("USN:{}", record.usn),
        }
    }

    fn logfile_event(&self, record: &LogRecord) -> TimelineEvent {
        TimelineEvent {
            timestamp: format_filetime(record.timestamp, &self.zone),
            source: EventSource::LogFile,
            event: record.event(),
            filename: record.filename.clone(),
            full_path: String::new(),
            file_attr: String::new(),
            file_reference: if record.file_reference.is_zero() {
                String::new()
            } else {
                record.file_reference.0.to_string()
            },
            parent_reference: if record.parent_reference.is_zero() {
                String::new()
            } else {
                record.parent_reference.0.to_string()
            },
            extra_info: format!("LSN:{}", record.lsn()),
        }
    }
}

impl Iterator for TimelineIter {
    type Item = Result<TimelineEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }

            if let Some(mft) = self.mft.as_mut() {
                match mft.next() {
                    Some(Ok(record)) => {
                        self.push_mft_events(&record);
                        continue;
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.mft = None,
                }
            }

            if let Some(usnjrnl) = self.usnjrnl.as_mut() {
                match usnjrnl.next() {
                    Some(Ok(record)) => return Some(Ok(self.usn_event(&record))),
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.usnjrnl = None,
                }
                continue;
            }

            if let Some(logfile) = self.logfile.as_mut() {
                match logfile.next() {
                    Some(Ok(record)) => {
                        // Only payload-bearing records are timeline-worthy.
                        if record.filename.is_empty() && record.event().is_empty() {
                            continue;
                        }
                        return Some(Ok(self.logfile_event(&record)));
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.logfile = None,
                }
                continue;
            }

            return None;
        }
    }
}
