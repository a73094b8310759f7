//! Relational sink: one SQLite database per run, batched inserts committed
//! every 10,000 rows, indexed by filename/timestamp/event.

use std::path::Path;

use anyhow::Result;
use rusqlite::{params, Connection};

use super::{LogRow, MftRow, TableKind, TimelineRow, UsnRow};

const BATCH_SIZE: u32 = 10_000;

pub struct SqliteSink {
    conn: Connection,
    table: TableKind,
    pending: u32,
}

impl SqliteSink {
    pub fn create(path: &Path, table: TableKind) -> Result<SqliteSink> {
        let conn = Connection::open(path)?;
        conn.execute_batch(create_table_sql(table))?;
        conn.execute_batch("BEGIN")?;
        Ok(SqliteSink {
            conn,
            table,
            pending: 0,
        })
    }

    fn bump(&mut self) -> Result<()> {
        self.pending += 1;
        if self.pending >= BATCH_SIZE {
            self.conn.execute_batch("COMMIT; BEGIN")?;
            self.pending = 0;
        }
        Ok(())
    }

    pub fn insert_mft(&mut self, row: &MftRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT OR REPLACE INTO mft VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
            )?
            .execute(params![
                row.entry_number as i64,
                row.sequence_number,
                row.in_use,
                row.is_directory,
                row.filename,
                row.full_path,
                row.file_attr,
                row.si_created,
                row.si_modified,
                row.si_mft_modified,
                row.si_accessed,
                row.fn_created,
                row.fn_modified,
                row.fn_mft_modified,
                row.fn_accessed,
                row.data_size as i64,
                row.is_resident,
            ])?;
        self.bump()
    }

    pub fn insert_usn(&mut self, row: &UsnRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO usnjrnl (Timestamp, FileName, FullPath, Event, FileAttr, USN, \
                 SourceInfo, SecurityID) VALUES (?,?,?,?,?,?,?,?)",
            )?
            .execute(params![
                row.timestamp,
                row.filename,
                row.full_path,
                row.event,
                row.file_attr,
                row.usn as i64,
                row.source_info,
                row.security_id,
            ])?;
        self.bump()
    }

    pub fn insert_log(&mut self, row: &LogRow) -> Result<()> {
        // The relational store has no logfile table; LogFile analyses fall
        // back to CSV at the command layer.
        let _ = row;
        anyhow::bail!("sqlite output is not supported for $LogFile records")
    }

    pub fn insert_timeline(&mut self, row: &TimelineRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO timeline (timestamp, source, event, filename, full_path, \
                 file_attr, file_reference, parent_reference, extra_info) \
                 VALUES (?,?,?,?,?,?,?,?,?)",
            )?
            .execute(params![
                row.timestamp,
                row.source,
                row.event,
                row.filename,
                row.full_path,
                row.file_attr,
                row.file_reference,
                row.parent_reference,
                row.extra_info,
            ])?;
        self.bump()
    }

    pub fn finish(self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.conn.execute_batch(index_sql(self.table))?;
        Ok(())
    }
}

fn create_table_sql(table: TableKind) -> &'static str {
    match table {
        TableKind::Mft => {
            "CREATE TABLE IF NOT EXISTS mft (
                EntryNumber INTEGER PRIMARY KEY,
                SequenceNumber INTEGER,
                InUse INTEGER,
                IsDirectory INTEGER,
                FileName TEXT,
                FullPath TEXT,
                FileAttr TEXT,
                SI_Created TEXT,
                SI_Modified TEXT,
                SI_MFTModified TEXT,
                SI_Accessed TEXT,
                FN_Created TEXT,
                FN_Modified TEXT,
                FN_MFTModified TEXT,
                FN_Accessed TEXT,
                DataSize INTEGER,
                IsResident INTEGER
            )"
        }
        TableKind::UsnJrnl => {
            "CREATE TABLE IF NOT EXISTS usnjrnl (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                Timestamp TEXT,
                FileName TEXT,
                FullPath TEXT,
                Event TEXT,
                FileAttr TEXT,
                USN INTEGER,
                SourceInfo INTEGER,
                SecurityID INTEGER
            )"
        }
        TableKind::LogFile => "",
        TableKind::Timeline => {
            "CREATE TABLE IF NOT EXISTS timeline (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT,
                source TEXT,
                event TEXT,
                filename TEXT,
                full_path TEXT,
                file_attr TEXT,
                file_reference TEXT,
                parent_reference TEXT,
                extra_info TEXT
            )"
        }
    }
}

fn index_sql(table: TableKind) -> &'static str {
    match table {
        TableKind::Mft => {
            "CREATE INDEX IF NOT EXISTS idx_filename ON mft(FileName);
             CREATE INDEX IF NOT EXISTS idx_fullpath ON mft(FullPath);
             CREATE INDEX IF NOT EXISTS idx_si_modified ON mft(SI_Modified);"
        }
        TableKind::UsnJrnl => {
            "CREATE INDEX IF NOT EXISTS idx_usn_timestamp ON usnjrnl(Timestamp);
             CREATE INDEX IF NOT EXISTS idx_usn_filename ON usnjrnl(FileName);
             CREATE INDEX IF NOT EXISTS idx_usn_event ON usnjrnl(Event);"
        }
        TableKind::LogFile => "",
        TableKind::Timeline => {
            "CREATE INDEX IF NOT EXISTS idx_timestamp ON timeline(timestamp);
             CREATE INDEX IF NOT EXISTS idx_filename ON timeline(filename);
             CREATE INDEX IF NOT EXISTS idx_source ON timeline(source);"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use mnemo_core::mft::MftRecord;

    fn zone() -> FixedOffset {
        mnemo_core::time::default_zone()
    }

    #[test]
    fn mft_rows_land_in_the_mft_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mft.db");
        let mut sink = SqliteSink::create(&path, TableKind::Mft).unwrap();

        for entry_number in 0..3u64 {
            let record = MftRecord {
                entry_number,
                filename: format!("f{entry_number}.txt"),
                in_use: true,
                is_resident: true,
                ..MftRecord::default()
            };
            sink.insert_mft(&MftRow::from_record(&record, false, &zone()))
                .unwrap();
        }
        sink.finish().unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM mft", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
        let name: String = conn
            .query_row("SELECT FileName FROM mft WHERE EntryNumber = 2", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(name, "f2.txt");
        // Indexes exist.
        let idx: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_filename'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn timeline_rows_autoincrement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timeline.db");
        let mut sink = SqliteSink::create(&path, TableKind::Timeline).unwrap();
        for i in 0..5 {
            sink.insert_timeline(&TimelineRow {
                timestamp: format!("2020-01-0{} 00:00:00", i + 1),
                source: "MFT".to_string(),
                event: "FileCreate (SI)".to_string(),
                filename: "x".to_string(),
                full_path: String::new(),
                file_attr: "32".to_string(),
                file_reference: "1-1".to_string(),
                parent_reference: "5".to_string(),
                extra_info: String::new(),
            })
            .unwrap();
        }
        sink.finish().unwrap();

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM timeline", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn logfile_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let mut sink = SqliteSink::create(&path, TableKind::Timeline).unwrap();
        let row = LogRow {
            lsn: 1,
            timestamp: String::new(),
            filename: String::new(),
            event: "Noop".to_string(),
            file_attr: String::new(),
            file_reference: String::new(),
            parent_reference: String::new(),
            transaction_id: 0,
            redo_op: "Noop".to_string(),
            undo_op: "Noop".to_string(),
            target_attribute: 0,
        };
        assert!(sink.insert_log(&row).is_err());
    }
}
