//! JSON sink: a newline-indented array, one object per record.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

pub struct JsonSink {
    writer: BufWriter<File>,
    first: bool,
}

impl JsonSink {
    pub fn create(path: &Path) -> Result<JsonSink> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(b"[\n")?;
        Ok(JsonSink {
            writer,
            first: true,
        })
    }

    pub fn write<T: Serialize>(&mut self, row: &T) -> Result<()> {
        if !self.first {
            self.writer.write_all(b",\n")?;
        }
        self.first = false;
        self.writer.write_all(b"  ")?;
        serde_json::to_writer(&mut self.writer, row)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.write_all(b"\n]")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::UsnRow;

    fn row(usn: u64) -> UsnRow {
        UsnRow {
            timestamp: "2020-01-01 09:00:00".to_string(),
            filename: "파일.txt".to_string(),
            full_path: String::new(),
            event: "FileCreate".to_string(),
            file_attr: "Archive".to_string(),
            usn,
            source_info: 0,
            security_id: 0,
        }
    }

    #[test]
    fn array_is_newline_indented_and_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usn.json");
        let mut sink = JsonSink::create(&path).unwrap();
        sink.write(&row(1)).unwrap();
        sink.write(&row(2)).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));
        assert!(text.contains("},\n  {"));
        assert!(text.ends_with("\n]"));

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["USN"], 1);
        assert_eq!(array[1]["FileName"], "파일.txt");
    }

    #[test]
    fn empty_array_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        JsonSink::create(&path).unwrap().finish().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed.as_array().unwrap().is_empty());
    }
}
