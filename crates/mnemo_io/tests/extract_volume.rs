//! End-to-end extraction over a small synthetic NTFS volume: partition
//! probe, $MFT/$LogFile streaming, and $UsnJrnl:$J discovery through the
//! $Extend index and through the fallback MFT scan.

use mnemo_core::types::MftRecordFlags;
use mnemo_io::image::Image;
use mnemo_io::partition::find_ntfs_partitions;
use mnemo_io::NtfsExtractor;

const CLUSTER: usize = 4096;
const ENTRY_SIZE: usize = 1024;
const MFT_CLUSTER: u64 = 4;
const TOTAL_CLUSTERS: usize = 16;

fn boot_sector() -> Vec<u8> {
    let mut sector = vec![0u8; 512];
    sector[3..11].copy_from_slice(b"NTFS    ");
    sector[0x0B..0x0D].copy_from_slice(&512u16.to_le_bytes());
    sector[0x0D] = 8;
    sector[0x30..0x38].copy_from_slice(&MFT_CLUSTER.to_le_bytes());
    sector[0x40] = 0xF6; // 1 << 10 = 1024-byte entries
    sector
}

fn resident_attribute(type_code: u32, name: &str, content: &[u8]) -> Vec<u8> {
    let name_units: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let name_offset = 24usize;
    let content_offset = name_offset + name_units.len();
    let total = (content_offset + content.len() + 7) & !7;

    let mut data = vec![0u8; total];
    data[0..4].copy_from_slice(&type_code.to_le_bytes());
    data[4..8].copy_from_slice(&(total as u32).to_le_bytes());
    data[9] = name.encode_utf16().count() as u8;
    data[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    data[16..20].copy_from_slice(&(content.len() as u32).to_le_bytes());
    data[20..22].copy_from_slice(&(content_offset as u16).to_le_bytes());
    data[name_offset..content_offset].copy_from_slice(&name_units);
    data[content_offset..content_offset + content.len()].copy_from_slice(content);
    data
}

fn non_resident_attribute(type_code: u32, name: &str, real_size: u64, runs: &[u8]) -> Vec<u8> {
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
    data[32..34].copy_from_slice(&(run_offset as u16).to_le_bytes());
    data[40..48].copy_from_slice(&real_size.next_multiple_of(CLUSTER as u64).to_le_bytes());
    data[48..56].copy_from_slice(&real_size.to_le_bytes());
    data[56..64].copy_from_slice(&real_size.to_le_bytes());
    data[name_offset..run_offset].copy_from_slice(&name_units);
    data[run_offset..run_offset + runs.len()].copy_from_slice(runs);
    data
}

fn file_name_content(parent_ref: u64, namespace: u8, name: &str) -> Vec<u8> {
    let name_units: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    let mut data = vec![0u8; 66 + name_units.len()];
    data[0..8].copy_from_slice(&parent_ref.to_le_bytes());
    data[64] = name.encode_utf16().count() as u8;
    data[65] = namespace;
    data[66..].copy_from_slice(&name_units);
    data
}

/// $INDEX_ROOT content with one named entry plus the terminating last entry.
fn index_root_content(name: &str, target_entry: u64) -> Vec<u8> {
    let fn_content = file_name_content(0x000B_0000_0000_000Bu64, 1, name);
    let entry_length = (16 + fn_content.len() + 7) & !7;

    let mut content = vec![0u8; 32 + entry_length + 16];
    // 16-byte $INDEX_ROOT header, then the node header at 16.
    content[16..20].copy_from_slice(&16u32.to_le_bytes()); // entries offset
    // entry at 32
    let base = 32;
    content[base..base + 8].copy_from_slice(&(target_entry | 0x0001u64 << 48).to_le_bytes());
    content[base + 8..base + 10].copy_from_slice(&(entry_length as u16).to_le_bytes());
    content[base + 10..base + 12].copy_from_slice(&(fn_content.len() as u16).to_le_bytes());
    content[base + 16..base + 16 + fn_content.len()].copy_from_slice(&fn_content);
    // last entry
    let last = base + entry_length;
    content[last + 8..last + 10].copy_from_slice(&16u16.to_le_bytes());
    content[last + 12..last + 16].copy_from_slice(&2u32.to_le_bytes());
    content
}

fn mft_entry(flags: MftRecordFlags, attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut data = vec![0u8; ENTRY_SIZE];
    data[0..4].copy_from_slice(b"FILE");
    data[4..6].copy_from_slice(&48u16.to_le_bytes());
    data[6..8].copy_from_slice(&3u16.to_le_bytes());
    data[16..18].copy_from_slice(&1u16.to_le_bytes());
    data[20..22].copy_from_slice(&56u16.to_le_bytes());
    data[22..24].copy_from_slice(&flags.bits().to_le_bytes());

    let mut offset = 56;
    for attribute in attributes {
        data[offset..offset + attribute.len()].copy_from_slice(attribute);
        offset += attribute.len();
    }
    data[offset..offset + 4].copy_from_slice(&[0xFF; 4]);
    data[24..28].copy_from_slice(&((offset + 8) as u32).to_le_bytes());

    // Stamp the update sequence over the sector tails.
    let signature = [0x11, 0x47];
    data[48..50].copy_from_slice(&signature);
    for i in 1..3usize {
        let tail = i * 512 - 2;
        let original = [data[tail], data[tail + 1]];
        data[48 + i * 2..48 + i * 2 + 2].copy_from_slice(&original);
        data[tail..tail + 2].copy_from_slice(&signature);
    }
    data
}

/// Encodes a run at `lcn` for `clusters` clusters (positive delta from 0).
fn run(lcn: u8, clusters: u8) -> Vec<u8> {
    vec![0x11, clusters, lcn]
}

struct VolumeLayout {
    with_extend_index: bool,
}

fn build_volume(layout: &VolumeLayout) -> Vec<u8> {
    let mut image = vec![0u8; TOTAL_CLUSTERS * CLUSTER];
    image[..512].copy_from_slice(&boot_sector());

    let mft_base = MFT_CLUSTER as usize * CLUSTER;
    let mut put_entry = |n: usize, entry: Vec<u8>| {
        image[mft_base + n * ENTRY_SIZE..mft_base + (n + 1) * ENTRY_SIZE].copy_from_slice(&entry);
    };

    // Entry 0: $MFT itself, mapping 4 clusters at LCN 4.
    put_entry(
        0,
        mft_entry(
            MftRecordFlags::IN_USE,
            &[
                resident_attribute(0x30, "", &file_name_content(5, 3, "$MFT")),
                non_resident_attribute(0x80, "", 16 * 1024, &run(MFT_CLUSTER as u8, 4)),
            ],
        ),
    );

    // Entry 2: $LogFile, one cluster at LCN 8, truncated real size.
    put_entry(
        2,
        mft_entry(
            MftRecordFlags::IN_USE,
            &[
                resident_attribute(0x30, "", &file_name_content(5, 3, "$LogFile")),
                non_resident_attribute(0x80, "", 2600, &run(8, 1)),
            ],
        ),
    );

    // Entry 5: root directory.
    put_entry(
        5,
        mft_entry(
            MftRecordFlags::IN_USE | MftRecordFlags::DIRECTORY,
            &[resident_attribute(0x30, "", &file_name_content(5, 3, "."))],
        ),
    );

    // Entry 11: $Extend, optionally carrying the $I30 root index.
    let mut extend_attrs = vec![resident_attribute(
        0x30,
        "",
        &file_name_content(5, 3, "$Extend"),
    )];
    if layout.with_extend_index {
        extend_attrs.push(resident_attribute(
            0x90,
            "$I30",
            &index_root_content("$UsnJrnl", 12),
        ));
    }
    put_entry(
        11,
        mft_entry(
            MftRecordFlags::IN_USE | MftRecordFlags::DIRECTORY,
            &extend_attrs,
        ),
    );

    // Entry 12: $UsnJrnl with a sparse-prefixed $J stream: two sparse
    // clusters then one backed cluster at LCN 9.
    let j_runs = [0x01u8, 0x02, 0x11, 0x01, 0x09, 0x00];
    put_entry(
        12,
        mft_entry(
            MftRecordFlags::IN_USE,
            &[
                resident_attribute(
                    0x30,
                    "",
                    &file_name_content(0x000B_0000_0000_000B, 3, "$UsnJrnl"),
                ),
                non_resident_attribute(0x80, "$J", 2 * CLUSTER as u64 + 100, &j_runs),
            ],
        ),
    );

    // Payload clusters.
    for (i, b) in image[8 * CLUSTER..9 * CLUSTER].iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    for (i, b) in image[9 * CLUSTER..10 * CLUSTER].iter_mut().enumerate() {
        *b = (i % 13) as u8 + 1;
    }

    image
}

fn open_volume(layout: &VolumeLayout) -> (tempfile::NamedTempFile, Image) {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&build_volume(layout)).unwrap();
    file.flush().unwrap();
    let image = Image::open(file.path()).unwrap();
    (file, image)
}

#[test]
fn probe_finds_the_bare_partition() {
    let (_file, mut image) = open_volume(&VolumeLayout {
        with_extend_index: true,
    });
    let partitions = find_ntfs_partitions(&mut image).unwrap();
    assert_eq!(partitions.len(), 1);
    assert_eq!(partitions[0].cluster_size, CLUSTER as u64);
    assert_eq!(partitions[0].mft_offset, MFT_CLUSTER * CLUSTER as u64);
    assert_eq!(partitions[0].mft_entry_size, ENTRY_SIZE as u64);
}

#[test]
fn extract_mft_streams_all_entries() {
    let (_file, mut image) = open_volume(&VolumeLayout {
        with_extend_index: true,
    });
    let partition = find_ntfs_partitions(&mut image).unwrap()[0];
    let mut extractor = NtfsExtractor::new(&mut image, partition);

    let mut out = Vec::new();
    assert!(extractor.extract_mft(&mut out).unwrap());
    assert_eq!(out.len(), 16 * 1024);
    assert_eq!(&out[0..4], b"FILE");
    // Entry 2 sits at its fixed offset inside the extracted stream.
    assert_eq!(&out[2 * ENTRY_SIZE..2 * ENTRY_SIZE + 4], b"FILE");
}

#[test]
fn extract_logfile_truncates_to_real_size() {
    let (_file, mut image) = open_volume(&VolumeLayout {
        with_extend_index: true,
    });
    let partition = find_ntfs_partitions(&mut image).unwrap()[0];
    let mut extractor = NtfsExtractor::new(&mut image, partition);

    let mut out = Vec::new();
    assert!(extractor.extract_logfile(&mut out).unwrap());
    assert_eq!(out.len(), 2600);
    assert_eq!(out[0], 0);
    assert_eq!(out[1], 1);
    assert_eq!(out[250], 250);
}

#[test]
fn extract_usnjrnl_preserves_sparse_offsets() {
    let (_file, mut image) = open_volume(&VolumeLayout {
        with_extend_index: true,
    });
    let partition = find_ntfs_partitions(&mut image).unwrap()[0];
    let mut extractor = NtfsExtractor::new(&mut image, partition);

    let mut out = Vec::new();
    assert!(extractor.extract_usnjrnl(&mut out).unwrap());
    // Two sparse clusters of zeros, then 100 bytes of backing data.
    assert_eq!(out.len(), 2 * CLUSTER + 100);
    assert!(out[..2 * CLUSTER].iter().all(|&b| b == 0));
    assert_eq!(out[2 * CLUSTER], 1);
    assert_eq!(out[2 * CLUSTER + 12], 13);
}

#[test]
fn usnjrnl_falls_back_to_linear_scan_without_index() {
    let (_file, mut image) = open_volume(&VolumeLayout {
        with_extend_index: false,
    });
    let partition = find_ntfs_partitions(&mut image).unwrap()[0];
    let mut extractor = NtfsExtractor::new(&mut image, partition);

    let mut out = Vec::new();
    assert!(extractor.extract_usnjrnl(&mut out).unwrap());
    assert_eq!(out.len(), 2 * CLUSTER + 100);
}

#[test]
fn missing_stream_reports_false() {
    let (_file, mut image) = open_volume(&VolumeLayout {
        with_extend_index: true,
    });
    let partition = find_ntfs_partitions(&mut image).unwrap()[0];
    let mut extractor = NtfsExtractor::new(&mut image, partition);

    let mut out = Vec::new();
    assert!(!extractor
        .extract_entry_stream(12, Some("$Max"), &mut out)
        .unwrap());
    assert!(out.is_empty());
}
