//! Native EWF (EVF1 / `.E01`) evidence-container reader.
//!
//! Each segment file carries a 13-byte header followed by a chain of
//! 76-byte section descriptors. Chunk data lives in `sectors` sections and
//! is addressed by `table` sections whose 32-bit entries carry a bit-31
//! compressed flag. Compressed chunks are zlib streams; stored chunks have a
//! trailing 4-byte checksum. Companion segments are auto-globbed
//! (`.E01` → `.E02` … `.E99` → `.EAA` …).
//!
//! EVF2 (`.Ex01`) containers are detected and reported as unsupported.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use mnemo_core::bytes::{le_u32, le_u64};
use mnemo_core::error::{CoreError, Result};

use crate::image::ImageSource;

const EVF1_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0D, 0x0A, 0xFF, 0x00];
const EVF2_SIGNATURE: [u8; 8] = [0x45, 0x56, 0x46, 0x32, 0x0D, 0x0A, 0x81, 0x00];
const FILE_HEADER_SIZE: u64 = 13;
const SECTION_DESCRIPTOR_SIZE: usize = 76;
/// Table data begins after entry count (4), padding (4), base offset (8),
/// padding (4) and checksum (4).
const TABLE_ENTRIES_OFFSET: usize = 24;

#[derive(Debug, Clone, Copy)]
struct ChunkLocation {
    segment: usize,
    offset: u64,
    end: u64,
    compressed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct VolumeInfo {
    chunk_count: u32,
    sectors_per_chunk: u32,
    bytes_per_sector: u32,
    sector_count: u64,
}

/// Segmented EWF image presenting the uncompressed media as a flat byte
/// range.
#[derive(Debug)]
pub struct EwfImage {
    segments: Vec<File>,
    chunks: Vec<ChunkLocation>,
    chunk_size: usize,
    media_size: u64,
    /// Decode buffer for the chunk currently being served.
    current_chunk: Option<(usize, Vec<u8>)>,
}

impl EwfImage {
    pub fn open(path: impl AsRef<Path>) -> Result<EwfImage> {
        let first = path.as_ref();
        let paths = segment_paths(first);
        tracing::debug!(segments = paths.len(), "opening EWF image");

        let mut segments = Vec::with_capacity(paths.len());
        let mut chunks: Vec<ChunkLocation> = Vec::new();
        let mut volume = VolumeInfo::default();

        for (segment_index, segment_path) in paths.iter().enumerate() {
            let mut file = File::open(segment_path)?;
            verify_segment_signature(&mut file, segment_path)?;
            walk_sections(&mut file, segment_index, &mut volume, &mut chunks)?;
            segments.push(file);
        }

        if volume.bytes_per_sector == 0 || volume.sectors_per_chunk == 0 {
            return Err(CoreError::InvalidStructure(
                "EWF image has no volume section".to_string(),
            ));
        }
        if chunks.is_empty() {
            return Err(CoreError::InvalidStructure(
                "EWF image has no chunk table".to_string(),
            ));
        }

        let chunk_size = (volume.sectors_per_chunk * volume.bytes_per_sector) as usize;
        let from_chunks = chunks.len() as u64 * chunk_size as u64;
        let from_sectors = volume.sector_count * volume.bytes_per_sector as u64;
        let media_size = if from_sectors > 0 {
            from_sectors.min(from_chunks)
        } else {
            from_chunks
        };

        Ok(EwfImage {
            segments,
            chunks,
            chunk_size,
            media_size,
            current_chunk: None,
        })
    }

    fn load_chunk(&mut self, index: usize) -> Result<()> {
        if matches!(&self.current_chunk, Some((i, _)) if *i == index) {
            return Ok(());
        }
        let Some(location) = self.chunks.get(index).copied() else {
            return Err(CoreError::OutOfBounds {
                offset: index as u64,
                max: self.chunks.len() as u64,
            });
        };

        let file = &mut self.segments[location.segment];
        let raw_len = location.end.saturating_sub(location.offset) as usize;
        let mut raw = vec![0u8; raw_len];
        file.seek(SeekFrom::Start(location.offset))?;
        let mut filled = 0usize;
        while filled < raw_len {
            let n = file.read(&mut raw[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        raw.truncate(filled);

        let data = if location.compressed {
            let mut out = Vec::with_capacity(self.chunk_size);
            ZlibDecoder::new(&raw[..])
                .read_to_end(&mut out)
                .map_err(|e| {
                    CoreError::InvalidStructure(format!("EWF chunk {index} failed to inflate: {e}"))
                })?;
            out
        } else {
            // Stored chunks carry a trailing 4-byte checksum.
            raw.truncate(raw.len().min(self.chunk_size));
            raw
        };

        self.current_chunk = Some((index, data));
        Ok(())
    }
}

impl ImageSource for EwfImage {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.media_size {
            return Ok(0);
        }
        let mut filled = 0usize;
        let wanted = buf.len().min((self.media_size - offset) as usize);

        while filled < wanted {
            let position = offset + filled as u64;
            let chunk_index = (position / self.chunk_size as u64) as usize;
            let within = (position % self.chunk_size as u64) as usize;

            self.load_chunk(chunk_index)?;
            let Some((_, data)) = &self.current_chunk else {
                break;
            };
            if within >= data.len() {
                break;
            }
            let take = (wanted - filled).min(data.len() - within);
            buf[filled..filled + take].copy_from_slice(&data[within..within + take]);
            filled += take;
        }
        Ok(filled)
    }

    #[inline]
    fn size(&self) -> u64 {
        self.media_size
    }
}

fn verify_segment_signature(file: &mut File, path: &Path) -> Result<()> {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    file.read_exact(&mut header)
        .map_err(|_| CoreError::InvalidStructure(format!("{}: truncated EWF header", path.display())))?;
    if header[..8] == EVF2_SIGNATURE {
        return Err(CoreError::Unsupported(
            "EVF2 (.Ex01) evidence containers are not supported".to_string(),
        ));
    }
    if header[..8] != EVF1_SIGNATURE {
        return Err(CoreError::InvalidStructure(format!(
            "{}: not an EWF segment file",
            path.display()
        )));
    }
    Ok(())
}

/// Walks the section chain of one segment, collecting volume geometry and
/// chunk locations.
fn walk_sections(
    file: &mut File,
    segment_index: usize,
    volume: &mut VolumeInfo,
    chunks: &mut Vec<ChunkLocation>,
) -> Result<()> {
    let file_size = file.metadata()?.len();
    let mut position = FILE_HEADER_SIZE;

    loop {
        if position + SECTION_DESCRIPTOR_SIZE as u64 > file_size {
            break;
        }
        file.seek(SeekFrom::Start(position))?;
        let mut descriptor = [0u8; SECTION_DESCRIPTOR_SIZE];
        file.read_exact(&mut descriptor)?;

        let type_end = descriptor[..16]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(16);
        let section_type = String::from_utf8_lossy(&descriptor[..type_end]).to_string();
        let next_offset = le_u64(&descriptor, 16).unwrap_or(0);
        let section_size = le_u64(&descriptor, 24).unwrap_or(0);

        match section_type.as_str() {
            "volume" | "disk" => {
                let data_len = (section_size as usize).saturating_sub(SECTION_DESCRIPTOR_SIZE);
                let mut data = vec![0u8; data_len.min(1024)];
                file.read_exact(&mut data)?;
                volume.chunk_count = le_u32(&data, 4).unwrap_or(0);
                volume.sectors_per_chunk = le_u32(&data, 8).unwrap_or(0);
                volume.bytes_per_sector = le_u32(&data, 12).unwrap_or(0);
                volume.sector_count = le_u64(&data, 16).unwrap_or(0);
            }
            "table" => {
                let data_len = (section_size as usize).saturating_sub(SECTION_DESCRIPTOR_SIZE);
                let mut data = vec![0u8; data_len];
                file.read_exact(&mut data)?;
                parse_table(&data, segment_index, position, chunks);
            }
            // "table2" duplicates "table"; "sectors" is addressed through
            // the tables; "next" and "done" end the segment.
            "next" | "done" => break,
            _ => {}
        }

        if next_offset == 0 || next_offset <= position {
            break;
        }
        position = next_offset;
    }

    Ok(())
}

/// Parses a `table` section: 31-bit chunk offsets with a bit-31 compressed
/// flag, relative to the table's base offset. Chunk extents end at the next
/// entry, or at this table section for the last chunk (the data region
/// precedes its table).
fn parse_table(
    data: &[u8],
    segment_index: usize,
    table_position: u64,
    chunks: &mut Vec<ChunkLocation>,
) {
    let Some(entry_count) = le_u32(data, 0) else {
        return;
    };
    let base_offset = le_u64(data, 8).unwrap_or(0);

    let mut offsets = Vec::with_capacity(entry_count as usize);
    for i in 0..entry_count as usize {
        let Some(raw) = le_u32(data, TABLE_ENTRIES_OFFSET + i * 4) else {
            break;
        };
        let compressed = raw & 0x8000_0000 != 0;
        let offset = base_offset + (raw & 0x7FFF_FFFF) as u64;
        offsets.push((offset, compressed));
    }

    for (i, &(offset, compressed)) in offsets.iter().enumerate() {
        let end = offsets
            .get(i + 1)
            .map(|&(next, _)| next)
            .unwrap_or(table_position);
        chunks.push(ChunkLocation {
            segment: segment_index,
            offset,
            end: end.max(offset),
            compressed,
        });
    }
}

/// Returns the existing segment files starting from `first`.
fn segment_paths(first: &Path) -> Vec<PathBuf> {
    let mut paths = vec![first.to_path_buf()];
    let Some(ext) = first.extension().and_then(|e| e.to_str()) else {
        return paths;
    };
    let mut ext = ext.to_string();
    loop {
        let Some(next) = next_segment_extension(&ext) else {
            break;
        };
        let candidate = first.with_extension(&next);
        if !candidate.exists() {
            break;
        }
        paths.push(candidate);
        ext = next;
    }
    paths
}

/// `E01` → `E02` … `E99` → `EAA` → `EAB` … `EZZ` → `FAA` …, preserving the
/// case of the input extension.
fn next_segment_extension(ext: &str) -> Option<String> {
    let bytes = ext.as_bytes();
    if bytes.len() != 3 {
        return None;
    }
    let lower = bytes[0].is_ascii_lowercase();
    let c0 = bytes[0].to_ascii_uppercase();
    let c1 = bytes[1].to_ascii_uppercase();
    let c2 = bytes[2].to_ascii_uppercase();

    let next: [u8; 3] = if c1.is_ascii_digit() && c2.is_ascii_digit() {
        let n = (c1 - b'0') as u32 * 10 + (c2 - b'0') as u32;
        if n < 99 {
            let n = n + 1;
            [c0, b'0' + (n / 10) as u8, b'0' + (n % 10) as u8]
        } else {
            [c0, b'A', b'A']
        }
    } else if c1.is_ascii_uppercase() && c2.is_ascii_uppercase() {
        if c2 < b'Z' {
            [c0, c1, c2 + 1]
        } else if c1 < b'Z' {
            [c0, c1 + 1, b'A']
        } else if c0 < b'Z' {
            [c0 + 1, b'A', b'A']
        } else {
            return None;
        }
    } else {
        return None;
    };

    Some(
        next.iter()
            .map(|&b| {
                if lower {
                    b.to_ascii_lowercase() as char
                } else {
                    b as char
                }
            })
            .collect(),
    )
}
