//! mnemo - NTFS artifact parser and forensic timeline builder.
//!
//! Parses $MFT, $LogFile and $UsnJrnl:$J, standalone or pulled straight out
//! of raw/E01 disk images, into CSV, JSON or SQLite tables and a unified
//! event timeline.

mod commands;
mod output;
mod progress;

use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::FixedOffset;
use clap::{Parser, Subcommand};

use commands::ExtractAnalyzeOptions;
use mnemo_core::time::{default_zone, parse_zone};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "mnemo")]
#[command(version)]
#[command(about = "NTFS artifact parser: MFT / LogFile / UsnJrnl:$J analysis", long_about = None)]
struct Cli {
    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Fixed timestamp zone, e.g. +09:00 (default) or 0
    #[arg(long, global = true)]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a $MFT file
    ParseMft {
        /// Path to the $MFT file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Only include active (in-use) entries
        #[arg(long)]
        active_only: bool,

        /// Reconstruct full paths (extra MFT pass)
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        include_path: bool,
    },

    /// Parse a $UsnJrnl:$J file
    ParseUsnjrnl {
        /// Path to the $J file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Path to $MFT for path resolution
        #[arg(long)]
        mft: Option<PathBuf>,
    },

    /// Parse a $LogFile (csv or json output)
    ParseLogfile {
        /// Path to the $LogFile
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },

    /// Unified timeline over extracted artifacts
    Analyze {
        /// Path to the $MFT file
        #[arg(long)]
        mft: Option<PathBuf>,

        /// Path to the $J file
        #[arg(long)]
        usnjrnl: Option<PathBuf>,

        /// Path to the $LogFile
        #[arg(long)]
        logfile: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },

    /// Extract artifacts from a disk image (raw or E01)
    Extract {
        /// Path to the disk image
        #[arg(long)]
        image: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Only process this partition (0-based)
        #[arg(short, long)]
        partition: Option<usize>,
    },

    /// Extract and analyze in one step
    ExtractAnalyze {
        /// Path to the disk image
        #[arg(long)]
        image: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Only process this partition (0-based)
        #[arg(short, long)]
        partition: Option<usize>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Sqlite)]
        format: OutputFormat,

        /// Keep the temporary extracted artifacts
        #[arg(long)]
        keep_temp: bool,

        /// Skip MFT extraction/analysis
        #[arg(long)]
        skip_mft: bool,

        /// Skip UsnJrnl extraction/analysis
        #[arg(long)]
        skip_usnjrnl: bool,

        /// Skip LogFile extraction/analysis
        #[arg(long)]
        skip_logfile: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}

fn resolve_zone(timezone: Option<&str>) -> Result<FixedOffset> {
    match timezone {
        None => Ok(default_zone()),
        Some(spec) => match parse_zone(spec) {
            Some(zone) => Ok(zone),
            None => bail!("Invalid timezone offset: {spec} (expected e.g. +09:00)"),
        },
    }
}

fn run(cli: Cli) -> Result<()> {
    let zone = resolve_zone(cli.timezone.as_deref())?;

    match cli.command {
        Commands::ParseMft {
            input,
            output,
            format,
            active_only,
            include_path,
        } => commands::parse_mft(&input, &output, format, active_only, include_path, &zone),

        Commands::ParseUsnjrnl {
            input,
            output,
            format,
            mft,
        } => commands::parse_usnjrnl(&input, &output, format, mft.as_deref(), &zone),

        Commands::ParseLogfile {
            input,
            output,
            format,
        } => commands::parse_logfile(&input, &output, format, &zone),

        Commands::Analyze {
            mft,
            usnjrnl,
            logfile,
            output,
            format,
        } => commands::analyze(
            mft.as_deref(),
            usnjrnl.as_deref(),
            logfile.as_deref(),
            &output,
            format,
            &zone,
        ),

        Commands::Extract {
            image,
            output,
            partition,
        } => commands::extract(&image, &output, partition),

        Commands::ExtractAnalyze {
            image,
            output,
            partition,
            format,
            keep_temp,
            skip_mft,
            skip_usnjrnl,
            skip_logfile,
        } => commands::extract_analyze(
            &image,
            &output,
            &ExtractAnalyzeOptions {
                format,
                partition_index: partition,
                keep_temp,
                skip_mft,
                skip_usnjrnl,
                skip_logfile,
            },
            &zone,
        ),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("[ERROR] {err:#}");
        std::process::exit(1);
    }
}
