//! Progress reporting for long artifact scans.

use indicatif::{ProgressBar, ProgressStyle};

/// Only files past this size get a bar; small inputs finish instantly.
pub const PROGRESS_THRESHOLD: u64 = 100 * 1024 * 1024;

pub struct ScanProgress {
    bar: ProgressBar,
}

impl ScanProgress {
    pub fn new(total_bytes: u64) -> ScanProgress {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {msg} ({eta})",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        ScanProgress { bar }
    }

    pub fn set_position(&self, bytes: u64) {
        self.bar.set_position(bytes);
    }

    pub fn set_records(&self, count: u64) {
        self.bar.set_message(format!("{count} records"));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
