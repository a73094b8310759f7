//! Streaming parser over an extracted $MFT file.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::mft::entry::{MftEntry, MFT_ENTRY_SIZE};
use crate::mft::record::MftRecord;
use crate::paths::PathCache;

/// Pull-based parser over a standalone $MFT file. Each iterator pass is an
/// independent read of the file.
pub struct MftParser {
    path: PathBuf,
    entry_size: usize,
}

impl MftParser {
    pub fn new(path: impl AsRef<Path>) -> MftParser {
        Self::with_entry_size(path, MFT_ENTRY_SIZE)
    }

    pub fn with_entry_size(path: impl AsRef<Path>, entry_size: usize) -> MftParser {
        MftParser {
            path: path.as_ref().to_path_buf(),
            entry_size,
        }
    }

    /// Number of fixed-size entries the file holds.
    pub fn total_entries(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len() / self.entry_size as u64)
    }

    /// Lazily yields decoded records in on-disk order, skipping invalid
    /// entries. `include_deleted: false` keeps only in-use entries. A
    /// trailing partial entry ends the sequence cleanly.
    pub fn iter_records(&self, include_deleted: bool) -> Result<MftRecordIter> {
        let file = File::open(&self.path)?;
        Ok(MftRecordIter {
            reader: BufReader::with_capacity(64 * self.entry_size, file),
            buf: vec![0u8; self.entry_size],
            entry_number: 0,
            include_deleted,
            done: false,
        })
    }

    /// One full pass collecting `(name, parent)` links from in-use entries,
    /// then resolves every path. The result is meant to be wrapped in an
    /// `Arc` and shared read-only.
    pub fn build_path_cache(&self) -> Result<PathCache> {
        let mut links: HashMap<u64, (String, u64)> = HashMap::new();
        for record in self.iter_records(true)? {
            let record = record?;
            if record.in_use {
                links.insert(
                    record.entry_number,
                    (record.filename, record.parent_ref.entry()),
                );
            }
        }
        Ok(PathCache::build(&links))
    }
}

/// Iterator over decoded MFT records; `Err` items are I/O failures and end
/// the sequence.
pub struct MftRecordIter {
    reader: BufReader<File>,
    buf: Vec<u8>,
    entry_number: u64,
    include_deleted: bool,
    done: bool,
}

impl Iterator for MftRecordIter {
    type Item = Result<MftRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match read_full(&mut self.reader, &mut self.buf) {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
            let entry_number = self.entry_number;
            self.entry_number += 1;

            if let Some(entry) = MftEntry::parse(&self.buf, entry_number) {
                let record = MftRecord::from_entry(&entry);
                if self.include_deleted || record.in_use {
                    return Some(Ok(record));
                }
            }
        }
    }
}

/// Fills `buf` completely; `Ok(false)` on a clean or partial EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
