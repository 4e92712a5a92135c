use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::allocator;
use crate::error::StoreError;
use crate::models::{LedgerRow, LEDGER_HEADER};

/// Row-oriented ledger with a fixed header row.
///
/// Nothing is cached between calls: every `read_all` reflects what the
/// backing store holds at that moment.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Writes the header if the ledger has no rows at all.
    async fn ensure_header(&self) -> Result<(), StoreError>;

    /// All rows in storage order, header first when present.
    async fn read_all(&self) -> Result<Vec<LedgerRow>, StoreError>;

    async fn append(&self, row: LedgerRow) -> Result<(), StoreError>;

    /// Drops every row and puts the header back.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Reads the ledger, allocates the next free id, and appends
    /// `build(id)` without another writer of this store getting in between.
    async fn append_with_generated_id<F>(&self, build: F) -> Result<u64, StoreError>
    where
        F: FnOnce(u64) -> LedgerRow;
}

pub(crate) fn check_width(row: &LedgerRow) -> Result<(), StoreError> {
    if row.len() != LEDGER_HEADER.len() {
        return Err(StoreError::RowWidth {
            expected: LEDGER_HEADER.len(),
            actual: row.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<LedgerRow>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<LedgerRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

#[cfg(test)]
impl RecordStore for MemoryStore {
    async fn ensure_header(&self) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        if rows.is_empty() {
            rows.push(crate::models::header_row());
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<LedgerRow>, StoreError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn append(&self, row: LedgerRow) -> Result<(), StoreError> {
        check_width(&row)?;
        self.rows.lock().await.push(row);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        rows.clear();
        rows.push(crate::models::header_row());
        Ok(())
    }

    async fn append_with_generated_id<F>(&self, build: F) -> Result<u64, StoreError>
    where
        F: FnOnce(u64) -> LedgerRow,
    {
        let mut rows = self.rows.lock().await;
        let id = allocator::next_id_for_rows(&rows);
        let row = build(id);
        check_width(&row)?;
        rows.push(row);
        Ok(id)
    }
}

/// Ledger kept in a CSV file, header on the first line.
///
/// Writers inside this process are serialized by `write_lock`; other
/// processes appending to the same file are not coordinated.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_rows(&self) -> Result<Vec<LedgerRow>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// Appends one record. A file saved by another tool without a final
    /// newline gets one first, so the record starts on its own line.
    fn write_row(&self, row: &LedgerRow) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                debug!(path = %self.path.display(), "ledger lacked a trailing newline");
                file.write_all(b"\n")?;
            }
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(row)?;
        writer.flush()?;
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let file = File::create(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(LEDGER_HEADER)?;
        writer.flush()?;
        Ok(())
    }
}

impl RecordStore for CsvStore {
    async fn ensure_header(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.read_rows()?.is_empty() {
            info!(path = %self.path.display(), "writing ledger header");
            self.reset()?;
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<LedgerRow>, StoreError> {
        self.read_rows()
    }

    async fn append(&self, row: LedgerRow) -> Result<(), StoreError> {
        check_width(&row)?;
        let _guard = self.write_lock.lock().await;
        self.write_row(&row)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.reset()
    }

    async fn append_with_generated_id<F>(&self, build: F) -> Result<u64, StoreError>
    where
        F: FnOnce(u64) -> LedgerRow,
    {
        let _guard = self.write_lock.lock().await;
        let rows = self.read_rows()?;
        let id = allocator::next_id_for_rows(&rows);
        let row = build(id);
        check_width(&row)?;
        self.write_row(&row)?;
        debug!(id, path = %self.path.display(), "appended ledger row");
        Ok(id)
    }
}
