//! Delimited text sink: UTF-8 with BOM, standard field escaping.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use super::TableKind;

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    /// Creates the file, writes the BOM and the header row. Headers are
    /// written explicitly so empty outputs still carry them.
    pub fn create(path: &Path, table: TableKind) -> Result<CsvSink> {
        let mut file = File::create(path)?;
        file.write_all(b"\xEF\xBB\xBF")?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(table.headers())?;
        Ok(CsvSink { writer })
    }

    pub fn write<T: Serialize>(&mut self, row: &T) -> Result<()> {
        self.writer.serialize(row)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
