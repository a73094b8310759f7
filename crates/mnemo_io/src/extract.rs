//! Artifact extraction: locate $MFT, $LogFile and $UsnJrnl:$J on a
//! partition and stream their $DATA out through a writer.
//!
//! $UsnJrnl is found through the $Extend directory index, falling back to a
//! bounded linear MFT scan. Its $J stream may be split across child records
//! via $ATTRIBUTE_LIST; runs are concatenated in VCN order and sparse
//! clusters are written as zeros so USN offsets stay valid.

use std::io::Write;

use mnemo_core::bytes::{le_u16, le_u32, le_u64, utf16le};
use mnemo_core::error::Result;
use mnemo_core::fixup::apply_fixup;
use mnemo_core::mft::attribute::{parse_attribute_list, AttributeBody, DataRun, FileNameAttr};
use mnemo_core::mft::entry::MftEntry;
use mnemo_core::types::{attr_type, well_known, FileReference};

use crate::image::Image;
use crate::partition::NtfsPartition;

/// Cap for the fallback linear MFT scan.
const USNJRNL_SCAN_LIMIT: u64 = 100_000;

/// Pulls system-file streams off one partition. Holds the image mutably;
/// the handle is used serially, never re-entered.
pub struct NtfsExtractor<'a> {
    image: &'a mut Image,
    partition: NtfsPartition,
}

impl<'a> NtfsExtractor<'a> {
    pub fn new(image: &'a mut Image, partition: NtfsPartition) -> NtfsExtractor<'a> {
        NtfsExtractor { image, partition }
    }

    fn read_entry(&mut self, entry_number: u64) -> Result<Option<MftEntry>> {
        let raw = self.partition.read_mft_entry(self.image, entry_number)?;
        Ok(MftEntry::parse(&raw, entry_number))
    }

    /// Extracts `$MFT` (entry 0, default stream).
    pub fn extract_mft(&mut self, out: &mut dyn Write) -> Result<bool> {
        self.extract_entry_stream(well_known::MFT, None, out)
    }

    /// Extracts `$LogFile` (entry 2, default stream).
    pub fn extract_logfile(&mut self, out: &mut dyn Write) -> Result<bool> {
        self.extract_entry_stream(well_known::LOG_FILE, None, out)
    }

    /// Streams one `$DATA` attribute of `entry_number` to `out`.
    /// `stream_name: None` selects the default (unnamed) stream. `false`
    /// when the entry or stream is missing.
    pub fn extract_entry_stream(
        &mut self,
        entry_number: u64,
        stream_name: Option<&str>,
        out: &mut dyn Write,
    ) -> Result<bool> {
        let Some(entry) = self.read_entry(entry_number)? else {
            return Ok(false);
        };
        for attr in &entry.attributes {
            if attr.type_code != attr_type::DATA {
                continue;
            }
            match stream_name {
                Some(name) if attr.name != name => continue,
                None if !attr.name.is_empty() => continue,
                _ => {}
            }
            match &attr.body {
                AttributeBody::Resident { data } => out.write_all(data)?,
                AttributeBody::NonResident {
                    real_size, runs, ..
                } => {
                    self.write_runs(runs, *real_size, out)?;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Locates `$UsnJrnl` and streams its `$J` stream, zero-filling sparse
    /// clusters and truncating to the real size of the VCN-0 attribute.
    /// `false` when the journal is absent (disabled or deleted).
    pub fn extract_usnjrnl(&mut self, out: &mut dyn Write) -> Result<bool> {
        let Some(entry_number) = self.locate_usnjrnl()? else {
            tracing::debug!("$UsnJrnl not found; journal disabled or deleted on this volume");
            return Ok(false);
        };
        tracing::debug!(entry = entry_number, "found $UsnJrnl");
        let Some(entry) = self.read_entry(entry_number)? else {
            return Ok(false);
        };
        self.extract_j_stream(&entry, out)
    }

    fn locate_usnjrnl(&mut self) -> Result<Option<u64>> {
        if let Some(extend) = self.read_entry(well_known::EXTEND)? {
            if let Some(found) = self.find_in_directory(&extend, "$UsnJrnl")? {
                return Ok(Some(found));
            }
        }
        self.scan_mft_for_usnjrnl()
    }

    /// Bounded linear scan for a $FILE_NAME of `$UsnJrnl` parented by
    /// $Extend, for volumes whose $Extend index is damaged.
    fn scan_mft_for_usnjrnl(&mut self) -> Result<Option<u64>> {
        let Some(mft_entry) = self.read_entry(well_known::MFT)? else {
            return Ok(None);
        };
        let Some(data_attr) = mft_entry.find_attribute(attr_type::DATA, "") else {
            return Ok(None);
        };
        let total_entries = match &data_attr.body {
            AttributeBody::NonResident { real_size, .. } => {
                real_size / self.partition.mft_entry_size
            }
            AttributeBody::Resident { data } => data.len() as u64 / self.partition.mft_entry_size,
        };

        let scan_limit = total_entries.min(USNJRNL_SCAN_LIMIT);
        tracing::debug!(scan_limit, "falling back to linear MFT scan for $UsnJrnl");
        for entry_number in 0..scan_limit {
            let Some(entry) = self.read_entry(entry_number)? else {
                continue;
            };
            for attr in &entry.attributes {
                if attr.type_code != attr_type::FILE_NAME {
                    continue;
                }
                let Some(fn_attr) = FileNameAttr::parse(attr.resident_data()) else {
                    continue;
                };
                if fn_attr.name == "$UsnJrnl" && fn_attr.parent.entry() == well_known::EXTEND {
                    return Ok(Some(entry_number));
                }
            }
        }
        Ok(None)
    }

    fn extract_j_stream(&mut self, entry: &MftEntry, out: &mut dyn Write) -> Result<bool> {
        let mut all_runs: Vec<DataRun> = Vec::new();
        let mut real_size: u64 = 0;

        let attr_list = entry
            .find_attribute(attr_type::ATTRIBUTE_LIST, "")
            .map(|a| parse_attribute_list(a.resident_data()))
            .unwrap_or_default();

        if !attr_list.is_empty() {
            tracing::debug!(entries = attr_list.len(), "following $ATTRIBUTE_LIST for $J");
            // The list is stored VCN-sorted, so extents concatenate in
            // stream order.
            for list_entry in &attr_list {
                if list_entry.type_code != attr_type::DATA || list_entry.name != "$J" {
                    continue;
                }
                let Some(child) = self.read_entry(list_entry.mft_reference.entry())? else {
                    continue;
                };
                for attr in &child.attributes {
                    if attr.type_code != attr_type::DATA || attr.name != "$J" {
                        continue;
                    }
                    if let AttributeBody::NonResident {
                        start_vcn,
                        real_size: extent_real_size,
                        runs,
                        ..
                    } = &attr.body
                    {
                        all_runs.extend_from_slice(runs);
                        if *start_vcn == 0 {
                            real_size = *extent_real_size;
                        }
                    }
                }
            }
        } else {
            for attr in &entry.attributes {
                if attr.type_code != attr_type::DATA || attr.name != "$J" {
                    continue;
                }
                match &attr.body {
                    AttributeBody::NonResident {
                        runs,
                        real_size: extent_real_size,
                        ..
                    } => {
                        all_runs = runs.clone();
                        real_size = *extent_real_size;
                    }
                    AttributeBody::Resident { data } => {
                        out.write_all(data)?;
                        return Ok(true);
                    }
                }
                break;
            }
        }

        if all_runs.is_empty() {
            return Ok(false);
        }
        tracing::debug!(runs = all_runs.len(), real_size, "extracting $J");
        self.write_runs(&all_runs, real_size, out)?;
        Ok(true)
    }

    /// Writes runs in order: zeros for sparse clusters, volume bytes for the
    /// rest, truncated to `real_size` when non-zero.
    fn write_runs(&mut self, runs: &[DataRun], real_size: u64, out: &mut dyn Write) -> Result<u64> {
        let zero_cluster = vec![0u8; self.partition.cluster_size as usize];
        let mut written: u64 = 0;

        'runs: for run in runs {
            for i in 0..run.length {
                if real_size > 0 && written >= real_size {
                    break 'runs;
                }
                let read_buf;
                let cluster: &[u8] = match run.start_lcn {
                    None => &zero_cluster,
                    Some(lcn) => {
                        read_buf = self
                            .partition
                            .read_cluster(self.image, (lcn as u64).wrapping_add(i))?;
                        &read_buf
                    }
                };
                let take = if real_size > 0 {
                    (real_size - written).min(cluster.len() as u64) as usize
                } else {
                    cluster.len()
                };
                out.write_all(&cluster[..take])?;
                written += take as u64;
            }
        }
        Ok(written)
    }

    /// Looks up `name` in a directory's $I30 index: $INDEX_ROOT first, then
    /// $INDEX_ALLOCATION when the root flags a large index. Returns the MFT
    /// entry number.
    pub fn find_in_directory(
        &mut self,
        dir_entry: &MftEntry,
        name: &str,
    ) -> Result<Option<u64>> {
        for attr in &dir_entry.attributes {
            if attr.type_code != attr_type::INDEX_ROOT {
                continue;
            }
            let data = attr.resident_data();
            if data.len() < 32 {
                continue;
            }
            // $INDEX_ROOT header (16 bytes), then the index node header.
            let entries_offset = le_u32(data, 16).unwrap_or(0) as usize;
            let large_index = data.get(28).is_some_and(|&b| b & 0x01 != 0);

            if let Some(found) = parse_index_entries(data, 16 + entries_offset, name) {
                return Ok(Some(found));
            }
            if large_index {
                tracing::debug!(name, "large index, walking $INDEX_ALLOCATION");
                if let Some(found) = self.find_in_index_allocation(dir_entry, name)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn find_in_index_allocation(
        &mut self,
        dir_entry: &MftEntry,
        name: &str,
    ) -> Result<Option<u64>> {
        for attr in &dir_entry.attributes {
            if attr.type_code != attr_type::INDEX_ALLOCATION || attr.name != "$I30" {
                continue;
            }
            let AttributeBody::NonResident { runs, .. } = &attr.body else {
                continue;
            };
            for run in runs {
                let Some(lcn) = run.start_lcn else {
                    continue;
                };
                for i in 0..run.length {
                    let mut block = self
                        .partition
                        .read_cluster(self.image, (lcn as u64).wrapping_add(i))?;
                    if block.get(0..4) != Some(b"INDX".as_slice()) {
                        continue;
                    }
                    let fixup_offset = le_u16(&block, 4).unwrap_or(0) as usize;
                    let fixup_count = le_u16(&block, 6).unwrap_or(0) as usize;
                    if !apply_fixup(&mut block, fixup_offset, fixup_count) {
                        continue;
                    }
                    if block.len() < 40 {
                        continue;
                    }
                    // INDX node header sits at offset 24.
                    let entries_offset = le_u32(&block, 24).unwrap_or(0) as usize;
                    if let Some(found) = parse_index_entries(&block, 24 + entries_offset, name) {
                        return Ok(Some(found));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Walks $I30 index entries from `offset`, returning the referenced entry
/// number on an exact filename match. Stops at a zero entry length or the
/// last-entry flag.
fn parse_index_entries(data: &[u8], mut offset: usize, target: &str) -> Option<u64> {
    while offset + 16 <= data.len() {
        let file_reference = le_u64(data, offset)?;
        let entry_length = le_u16(data, offset + 8)? as usize;
        let content_length = le_u16(data, offset + 10)? as usize;
        let flags = le_u32(data, offset + 12)?;

        if entry_length == 0 {
            break;
        }
        if flags & 0x02 != 0 {
            break;
        }

        let fn_offset = offset + 16;
        if content_length >= FileNameAttr::HEADER_LEN
            && fn_offset + FileNameAttr::HEADER_LEN <= data.len()
        {
            let name_length = data[fn_offset + 64] as usize;
            let name_end = fn_offset + 66 + name_length * 2;
            if name_end <= data.len() {
                if let Some(name) = utf16le(&data[fn_offset + 66..name_end]) {
                    if name == target {
                        return Some(file_reference & FileReference::ENTRY_MASK);
                    }
                }
            }
        }

        offset += entry_length;
    }
    None
}
