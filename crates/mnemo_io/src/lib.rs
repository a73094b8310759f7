//! # Mnemo IO
//!
//! Infrastructure adapters for the mnemo forensic tool: uniform byte-range
//! access over raw and EWF evidence images, MBR/GPT partition discovery with
//! NTFS boot-sector decoding, and the artifact extractor that pulls $MFT,
//! $LogFile and $UsnJrnl:$J off a volume.

#[cfg(feature = "ewf")]
pub mod ewf;
pub mod extract;
pub mod image;
pub mod partition;

pub use extract::NtfsExtractor;
pub use image::{Image, ImageKind, ImageSource, RawImage};
pub use partition::{find_ntfs_partitions, NtfsPartition};
