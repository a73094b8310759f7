//! # Mnemo Core
//!
//! Decoding core for the mnemo NTFS forensic tool: MFT, $LogFile and
//! $UsnJrnl:$J record decoders, filesystem path reconstruction and the
//! unified event timeline.
//!
//! This crate is free of image-access concerns: it decodes byte slices and
//! standalone artifact files. Locating partitions and pulling artifacts out
//! of disk images lives in `mnemo_io`; output sinks live in the application
//! crate.

pub mod bytes;
pub mod error;
pub mod fixup;
pub mod logfile;
pub mod mft;
pub mod paths;
pub mod time;
pub mod timeline;
pub mod types;
pub mod usnjrnl;

pub use error::{CoreError, Result};
