//! Image sources: uniform byte-range reads over raw images and evidence
//! containers.
//!
//! The layer is seekable but never cached; the NTFS layer above issues
//! cluster-aligned reads and owns any caching.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use mnemo_core::error::Result;
#[cfg(not(feature = "ewf"))]
use mnemo_core::error::CoreError;

/// A random-access source of image bytes with an advertised media size.
pub trait ImageSource {
    /// Reads up to `buf.len()` bytes at `offset`; short reads happen at EOF.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Total media size in bytes.
    fn size(&self) -> u64;

    /// Reads exactly `length` bytes at `offset`, zero-padding past EOF so
    /// cluster-aligned consumers always get full buffers.
    fn read(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; length];
        let mut filled = 0usize;
        while filled < length {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(buf)
    }
}

/// Raw (`.dd`/`.raw`/`.img`/`.001`) image backed by a single file.
pub struct RawImage {
    file: File,
    size: u64,
}

impl RawImage {
    pub fn open(path: impl AsRef<Path>) -> Result<RawImage> {
        let mut file = File::open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};
            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok(RawImage { file, size })
    }
}

impl ImageSource for RawImage {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.read(buf)?)
    }

    #[inline]
    fn size(&self) -> u64 {
        self.size
    }
}

/// Image container kind, detected by extension first, then signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Raw,
    Ewf,
}

/// Detects the container kind: known extensions short-circuit, anything else
/// is sniffed for the `EVF` magic.
pub fn detect_image_kind(path: &Path) -> Result<ImageKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("e01" | "ex01" | "s01") => return Ok(ImageKind::Ewf),
        Some("dd" | "raw" | "img" | "001") => return Ok(ImageKind::Raw),
        _ => {}
    }

    let mut file = File::open(path)?;
    let mut signature = [0u8; 8];
    let n = file.read(&mut signature)?;
    if n >= 3 && &signature[..3] == b"EVF" {
        Ok(ImageKind::Ewf)
    } else {
        Ok(ImageKind::Raw)
    }
}

/// An opened disk image of either kind.
pub enum Image {
    Raw(RawImage),
    #[cfg(feature = "ewf")]
    Ewf(crate::ewf::EwfImage),
}

impl Image {
    /// Opens a raw or evidence-container image. Without the `ewf` feature an
    /// evidence container is a feature error, reported with a one-line
    /// message and a non-zero exit by the caller.
    pub fn open(path: impl AsRef<Path>) -> Result<Image> {
        let path = path.as_ref();
        match detect_image_kind(path)? {
            ImageKind::Raw => Ok(Image::Raw(RawImage::open(path)?)),
            #[cfg(feature = "ewf")]
            ImageKind::Ewf => Ok(Image::Ewf(crate::ewf::EwfImage::open(path)?)),
            #[cfg(not(feature = "ewf"))]
            ImageKind::Ewf => Err(CoreError::Unsupported(
                "evidence-file (EWF) images require a build with the 'ewf' feature".to_string(),
            )),
        }
    }
}

impl ImageSource for Image {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        match self {
            Image::Raw(raw) => raw.read_at(offset, buf),
            #[cfg(feature = "ewf")]
            Image::Ewf(ewf) => ewf.read_at(offset, buf),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Image::Raw(raw) => raw.size(),
            #[cfg(feature = "ewf")]
            Image::Ewf(ewf) => ewf.size(),
        }
    }
}
