//! Drivers for the six subcommands.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use humansize::{format_size, BINARY};
use tracing::{info, warn};

use mnemo_core::logfile::LogFileParser;
use mnemo_core::mft::MftParser;
use mnemo_core::paths::PathCache;
use mnemo_core::timeline::TimelineIter;
use mnemo_core::usnjrnl::UsnJrnlParser;
use mnemo_io::image::{Image, ImageSource};
use mnemo_io::partition::{find_ntfs_partitions, NtfsPartition};
use mnemo_io::NtfsExtractor;

use crate::output::{LogRow, MftRow, OutputFormat, Sink, TableKind, TimelineRow, UsnRow};
use crate::progress::{ScanProgress, PROGRESS_THRESHOLD};

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    Ok(())
}

pub fn parse_mft(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    active_only: bool,
    include_path: bool,
    zone: &FixedOffset,
) -> Result<()> {
    ensure_exists(input)?;
    info!("Parsing MFT: {}", input.display());
    info!("Output: {} ({})", output.display(), format.extension());

    let parser = MftParser::new(input);
    info!("Total entries: {}", parser.total_entries()?);
    let started = Instant::now();

    let cache = if include_path {
        Some(parser.build_path_cache()?)
    } else {
        None
    };

    let mut sink = Sink::open(format, output, TableKind::Mft)?;
    for record in parser.iter_records(!active_only)? {
        let mut record = record?;
        if let Some(cache) = &cache {
            record.full_path = cache.get(record.entry_number).to_string();
        }
        sink.write_mft(&MftRow::from_record(&record, include_path, zone))?;
    }
    sink.finish()?;

    info!("Completed in {:.2} seconds", started.elapsed().as_secs_f64());
    info!("Output saved to: {}", output.display());
    Ok(())
}

pub fn parse_usnjrnl(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    mft: Option<&Path>,
    zone: &FixedOffset,
) -> Result<()> {
    ensure_exists(input)?;
    let parser = UsnJrnlParser::new(input);
    let file_size = parser.file_size()?;
    info!("Parsing UsnJrnl:$J: {}", input.display());
    info!("File size: {}", format_size(file_size, BINARY));
    info!("Output: {} ({})", output.display(), format.extension());

    let cache = match mft {
        Some(mft_path) => {
            ensure_exists(mft_path)?;
            info!("Using MFT for path resolution: {}", mft_path.display());
            Some(MftParser::new(mft_path).build_path_cache()?)
        }
        None => None,
    };

    let started = Instant::now();
    let progress = (file_size > PROGRESS_THRESHOLD).then(|| ScanProgress::new(file_size));

    let mut sink = Sink::open(format, output, TableKind::UsnJrnl)?;
    let mut iter = parser.iter_records()?;
    let mut count: u64 = 0;
    while let Some(record) = iter.next() {
        let record = record?;
        let full_path = cache
            .as_ref()
            .map(|c| c.get(record.file_reference.entry()).to_string())
            .unwrap_or_default();
        sink.write_usn(&UsnRow::from_record(&record, full_path, zone))?;

        count += 1;
        if count % 10_000 == 0 {
            if let Some(progress) = &progress {
                progress.set_position(iter.processed_bytes());
                progress.set_records(count);
            }
        }
    }
    if let Some(progress) = &progress {
        progress.finish();
    }
    sink.finish()?;

    info!("Total records: {count}");
    info!("Completed in {:.2} seconds", started.elapsed().as_secs_f64());
    info!("Output saved to: {}", output.display());
    Ok(())
}

pub fn parse_logfile(
    input: &Path,
    output: &Path,
    format: OutputFormat,
    zone: &FixedOffset,
) -> Result<()> {
    ensure_exists(input)?;
    if format == OutputFormat::Sqlite {
        bail!("sqlite output is not supported for $LogFile; use csv or json");
    }
    info!("Parsing $LogFile: {}", input.display());
    info!("Output: {} ({})", output.display(), format.extension());
    let started = Instant::now();

    let mut sink = Sink::open(format, output, TableKind::LogFile)?;
    for record in LogFileParser::new(input).iter_records()? {
        let record = record?;
        sink.write_log(&LogRow::from_record(&record, zone))?;
    }
    sink.finish()?;

    info!("Completed in {:.2} seconds", started.elapsed().as_secs_f64());
    info!("Output saved to: {}", output.display());
    Ok(())
}

pub fn analyze(
    mft: Option<&Path>,
    usnjrnl: Option<&Path>,
    logfile: Option<&Path>,
    output_dir: &Path,
    format: OutputFormat,
    zone: &FixedOffset,
) -> Result<()> {
    if mft.is_none() && usnjrnl.is_none() && logfile.is_none() {
        bail!("At least one input file required (--mft, --usnjrnl, --logfile)");
    }
    for path in [mft, usnjrnl, logfile].into_iter().flatten() {
        ensure_exists(path)?;
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    info!("Unified Analysis");
    info!("Output directory: {}", output_dir.display());
    let started = Instant::now();

    let results_file = output_dir.join(format!("unified_timeline.{}", format.extension()));

    // Path cache is built once from the MFT and shared read-only.
    let cache: Option<Arc<PathCache>> = match mft {
        Some(path) => Some(Arc::new(MftParser::new(path).build_path_cache()?)),
        None => None,
    };

    let mft_iter = match mft {
        Some(path) => Some(MftParser::new(path).iter_records(true)?),
        None => None,
    };
    let usn_iter = match usnjrnl {
        Some(path) => Some(UsnJrnlParser::new(path).iter_records()?),
        None => None,
    };
    let log_iter = match logfile {
        Some(path) => Some(LogFileParser::new(path).iter_records()?),
        None => None,
    };

    let mut sink = Sink::open(format, &results_file, TableKind::Timeline)?;
    for event in TimelineIter::new(*zone, cache, mft_iter, usn_iter, log_iter) {
        let event = event?;
        sink.write_timeline(&TimelineRow::from_event(&event))?;
    }
    sink.finish()?;

    info!("Completed in {:.2} seconds", started.elapsed().as_secs_f64());
    info!("Output saved to: {}", results_file.display());
    Ok(())
}

/// Opens the image and resolves which partitions to process.
fn open_and_probe(
    image_path: &Path,
    partition_index: Option<usize>,
) -> Result<(Image, Vec<(usize, NtfsPartition)>)> {
    ensure_exists(image_path)?;
    info!("Opening image: {}", image_path.display());
    let file_size = fs::metadata(image_path)?.len();
    info!("Image file size: {}", format_size(file_size, BINARY));

    let mut image = Image::open(image_path)?;
    info!(
        "Media size (uncompressed): {}",
        format_size(image.size(), BINARY)
    );

    let partitions = find_ntfs_partitions(&mut image)?;
    info!("Found {} NTFS partition(s)", partitions.len());

    let selected: Vec<(usize, NtfsPartition)> = match partition_index {
        Some(index) => {
            if index >= partitions.len() {
                bail!(
                    "Invalid partition number: {index} (valid: 0-{})",
                    partitions.len().saturating_sub(1)
                );
            }
            vec![(index, partitions[index])]
        }
        None => partitions.into_iter().enumerate().collect(),
    };
    Ok((image, selected))
}

/// Streams one artifact into `path`, removing the file again when the
/// artifact turns out to be absent.
fn extract_artifact<F>(path: &Path, extract: F) -> Result<bool>
where
    F: FnOnce(&mut dyn Write) -> Result<bool, mnemo_core::CoreError>,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let found = extract(&mut writer)?;
    writer.flush()?;
    drop(writer);
    if !found {
        let _ = fs::remove_file(path);
    }
    Ok(found)
}

#[derive(Debug, Clone, Copy)]
struct ArtifactSelection {
    mft: bool,
    logfile: bool,
    usnjrnl: bool,
}

impl ArtifactSelection {
    const ALL: ArtifactSelection = ArtifactSelection {
        mft: true,
        logfile: true,
        usnjrnl: true,
    };
}

fn extract_partition_artifacts(
    image: &mut Image,
    partition: NtfsPartition,
    index: usize,
    output_dir: &Path,
    selection: ArtifactSelection,
) -> Result<ExtractedArtifacts> {
    info!("Processing partition {index}");
    info!("    Offset: {}", partition.offset);
    info!("    Cluster size: {}", partition.cluster_size);
    info!("    MFT offset: {}", partition.mft_offset);

    let mut extractor = NtfsExtractor::new(image, partition);
    let mut extracted = ExtractedArtifacts::default();

    if selection.mft {
        let mft_path = output_dir.join(format!("partition{index}_MFT"));
        info!("Extracting $MFT...");
        if extract_artifact(&mft_path, |out| extractor.extract_mft(out))? {
            info!("$MFT saved to: {}", mft_path.display());
            extracted.mft = Some(mft_path);
        } else {
            warn!("Failed to extract $MFT");
        }
    }

    if selection.logfile {
        let logfile_path = output_dir.join(format!("partition{index}_LogFile"));
        info!("Extracting $LogFile...");
        if extract_artifact(&logfile_path, |out| extractor.extract_logfile(out))? {
            info!("$LogFile saved to: {}", logfile_path.display());
            extracted.logfile = Some(logfile_path);
        } else {
            warn!("Failed to extract $LogFile");
        }
    }

    if selection.usnjrnl {
        let usnjrnl_path = output_dir.join(format!("partition{index}_UsnJrnl_J"));
        info!("Extracting $UsnJrnl:$J...");
        if extract_artifact(&usnjrnl_path, |out| extractor.extract_usnjrnl(out))? {
            info!("$UsnJrnl:$J saved to: {}", usnjrnl_path.display());
            extracted.usnjrnl = Some(usnjrnl_path);
        } else {
            warn!("$UsnJrnl:$J not found (USN Journal may be disabled or deleted on this volume)");
        }
    }

    Ok(extracted)
}

#[derive(Debug, Default)]
struct ExtractedArtifacts {
    mft: Option<PathBuf>,
    logfile: Option<PathBuf>,
    usnjrnl: Option<PathBuf>,
}

pub fn extract(image_path: &Path, output_dir: &Path, partition_index: Option<usize>) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let (mut image, selected) = open_and_probe(image_path, partition_index)?;

    for (index, partition) in selected {
        extract_partition_artifacts(
            &mut image,
            partition,
            index,
            output_dir,
            ArtifactSelection::ALL,
        )?;
    }

    info!("Extraction completed");
    Ok(())
}

pub struct ExtractAnalyzeOptions {
    pub format: OutputFormat,
    pub partition_index: Option<usize>,
    pub keep_temp: bool,
    pub skip_mft: bool,
    pub skip_usnjrnl: bool,
    pub skip_logfile: bool,
}

pub fn extract_analyze(
    image_path: &Path,
    output_dir: &Path,
    options: &ExtractAnalyzeOptions,
    zone: &FixedOffset,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let temp_dir = output_dir.join("temp_extracted");
    fs::create_dir_all(&temp_dir)?;
    info!("Output format: {}", options.format.extension());

    let started = Instant::now();
    let (mut image, selected) = open_and_probe(image_path, options.partition_index)?;

    let selection = ArtifactSelection {
        mft: !options.skip_mft,
        logfile: !options.skip_logfile,
        usnjrnl: !options.skip_usnjrnl,
    };

    for (index, partition) in selected {
        let extracted =
            extract_partition_artifacts(&mut image, partition, index, &temp_dir, selection)?;
        let extension = options.format.extension();

        let mft_for_paths = extracted.mft.as_deref();

        if let Some(mft_path) = mft_for_paths {
            info!("[1/3] MFT analysis");
            let output = output_dir.join(format!("partition{index}_MFT.{extension}"));
            if let Err(e) = parse_mft(mft_path, &output, options.format, false, true, zone) {
                warn!("MFT analysis failed: {e:#}");
            }
        }

        if !options.skip_usnjrnl {
            if let Some(usnjrnl_path) = extracted.usnjrnl.as_deref() {
                info!("[2/3] UsnJrnl analysis");
                let output = output_dir.join(format!("partition{index}_UsnJrnl.{extension}"));
                if let Err(e) =
                    parse_usnjrnl(usnjrnl_path, &output, options.format, mft_for_paths, zone)
                {
                    warn!("UsnJrnl analysis failed: {e:#}");
                }
            }
        }

        if !options.skip_logfile {
            if let Some(logfile_path) = extracted.logfile.as_deref() {
                info!("[3/3] LogFile analysis");
                // The relational store has no logfile table.
                let (logfile_format, logfile_ext) = if options.format == OutputFormat::Sqlite {
                    warn!("LogFile sqlite not supported, using CSV");
                    (OutputFormat::Csv, "csv")
                } else {
                    (options.format, extension)
                };
                let output = output_dir.join(format!("partition{index}_LogFile.{logfile_ext}"));
                if let Err(e) = parse_logfile(logfile_path, &output, logfile_format, zone) {
                    warn!("LogFile analysis failed: {e:#}");
                }
            }
        }
    }

    if !options.keep_temp {
        info!("Cleaning up temporary files...");
        if let Err(e) = fs::remove_dir_all(&temp_dir) {
            warn!("Failed to remove temp files: {e}");
        }
    }

    info!(
        "All-in-one extraction and analysis completed in {:.2} seconds",
        started.elapsed().as_secs_f64()
    );
    info!("Output directory: {}", output_dir.display());
    Ok(())
}
