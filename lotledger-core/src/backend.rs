//! Saving and loading whole books
//!
//! [`JsonFileBackend`] writes the book as one pretty-printed JSON snapshot.
//! Balances, lot closed flags and edit levels are not stored; they are
//! rebuilt after loading.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::book::Book;
use crate::error::{EngineError, EngineResult};

/// Snapshot format written by this version
pub const SNAPSHOT_FORMAT: u32 = 1;

/// Somewhere a book can be saved to and loaded from
pub trait Backend {
    /// Read a book, with its derived caches rebuilt
    fn load(&self) -> EngineResult<Book>;

    /// Write the book; it is marked clean on success
    fn save(&self, book: &mut Book) -> EngineResult<()>;
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format: u32,
    book: &'a Book,
}

#[derive(Deserialize)]
struct Snapshot {
    format: u32,
    book: Book,
}

/// A JSON snapshot file
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Backend for the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File this backend reads and writes
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Backend for JsonFileBackend {
    fn load(&self) -> EngineResult<Book> {
        info!("loading book from {}", self.path.display());
        let file = fs::File::open(&self.path)?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(EngineError::InvalidArgument(format!(
                "{} has snapshot format {}, expected {}",
                self.path.display(),
                snapshot.format,
                SNAPSHOT_FORMAT
            )));
        }
        let mut book = snapshot.book;
        book.refresh_caches()?;
        book.mark_clean();
        debug!(
            "loaded {} transactions and {} splits",
            book.transaction_count(),
            book.split_count()
        );
        Ok(book)
    }

    fn save(&self, book: &mut Book) -> EngineResult<()> {
        info!("saving book to {}", self.path.display());
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let temp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            let snapshot = SnapshotRef {
                format: SNAPSHOT_FORMAT,
                book,
            };
            serde_json::to_writer_pretty(&mut writer, &snapshot)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        temp.persist(&self.path).map_err(|e| e.error)?;
        book.mark_clean();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use chrono::{TimeZone, Utc};
    use lotledger_math::{Commodity, Numeric};

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("books/main.json"));
        let usd = Commodity::currency("USD", 100);

        let mut book = Book::new();
        let root = book.root_account();
        let bank = book.add_account(root, AccountType::Bank, "Checking", &usd).unwrap();
        let income = book.add_account(root, AccountType::Income, "Salary", &usd).unwrap();
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let pay = Numeric::from_i64(1500);
        book.record_transaction(
            &usd,
            date,
            "March pay",
            &[(bank, pay.clone(), pay.clone()), (income, -&pay, -&pay)],
        )
        .unwrap();

        backend.save(&mut book).unwrap();
        assert!(!book.is_dirty());
        assert!(backend.exists());

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.guid(), book.guid());
        assert_eq!(loaded.transaction_count(), 1);
        assert_eq!(loaded.account(bank).unwrap().balance(), &pay);
        assert_eq!(loaded.account(income).unwrap().balance(), &-&pay);
    }

    #[test]
    fn test_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        let mut book = Book::new();
        let backend = JsonFileBackend::new(&path);
        backend.save(&mut book).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replacen("\"format\": 1", "\"format\": 99", 1)).unwrap();
        assert!(matches!(backend.load(), Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let backend = JsonFileBackend::new("/nonexistent/lotledger/book.json");
        assert!(matches!(backend.load(), Err(EngineError::Io(_))));
    }
}
