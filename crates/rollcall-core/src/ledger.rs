//! Append-only attendance ledger, deduplicated per identity and day.
//!
//! The ledger is a flat CSV file with a `Name,Date,Time` header — meant to
//! be read by humans and spreadsheet imports, not queried at scale. Marking
//! is idempotent per (identity, calendar date): the first verification of
//! the day appends a row, later ones are no-ops.
//!
//! The duplicate check and the append happen inside one mutex-guarded
//! critical section. Two concurrent verifications of the same person can
//! otherwise both observe "not yet marked" and both append.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

const HEADER: &str = "Name,Date,Time";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

struct LedgerInner {
    file: std::fs::File,
    /// Every (identity, date) pair already present in the file.
    seen: HashSet<(String, NaiveDate)>,
}

/// Shared attendance ledger handle. Cheap to share behind an `Arc`.
pub struct AttendanceLedger {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

impl AttendanceLedger {
    /// Open the ledger, creating the file (and header row) if absent.
    ///
    /// Existing rows are scanned so the per-day invariant survives
    /// restarts; malformed rows are logged and ignored.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let is_new = !path.exists();
        let mut seen = HashSet::new();

        if !is_new {
            let reader = BufReader::new(std::fs::File::open(path).map_err(io_err)?);
            for (line_no, line) in reader.lines().enumerate() {
                let line = line.map_err(io_err)?;
                if line_no == 0 || line.trim().is_empty() {
                    continue; // header
                }
                match parse_row(&line) {
                    Some(key) => {
                        seen.insert(key);
                    }
                    None => tracing::warn!(
                        line = line_no + 1,
                        path = %path.display(),
                        "ignoring malformed ledger row"
                    ),
                }
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        if is_new {
            writeln!(file, "{HEADER}").map_err(io_err)?;
            tracing::info!(path = %path.display(), "created attendance ledger");
        } else {
            tracing::info!(
                path = %path.display(),
                marked_days = seen.len(),
                "opened attendance ledger"
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(LedgerInner { file, seen }),
        })
    }

    /// Record attendance for `name` at `now`.
    ///
    /// Returns `true` if a row was appended, `false` if the identity was
    /// already marked for that calendar date. The scan and the append run
    /// under one lock; the lock is released on every exit path.
    pub fn mark(&self, name: &str, now: NaiveDateTime) -> Result<bool, LedgerError> {
        let date = now.date();
        let key = (name.to_string(), date);

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.seen.contains(&key) {
            tracing::debug!(name, %date, "attendance already marked today");
            return Ok(false);
        }

        let row = format!(
            "{name},{},{}",
            date.format(DATE_FORMAT),
            now.time().format(TIME_FORMAT)
        );
        writeln!(inner.file, "{row}").map_err(|source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        inner.file.flush().map_err(|source| LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        inner.seen.insert(key);
        tracing::info!(name, %date, "attendance marked");
        Ok(true)
    }

    /// Whether `name` is already marked for the given date.
    pub fn is_marked(&self, name: &str, date: NaiveDate) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.seen.contains(&(name.to_string(), date))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse one `name,date,time` row into its dedup key.
fn parse_row(line: &str) -> Option<(String, NaiveDate)> {
    let mut fields = line.splitn(3, ',');
    let name = fields.next()?;
    let date = NaiveDate::parse_from_str(fields.next()?, DATE_FORMAT).ok()?;
    fields.next()?; // time column must exist, value unused for dedup
    Some((name.to_string(), date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::sync::Arc;

    fn temp_ledger_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rollcall-ledger-test-{tag}-{}.csv",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    fn at(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(time.0, time.1, time.2).unwrap())
    }

    fn read_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_header_written_once() {
        let path = temp_ledger_path("header");
        let ledger = AttendanceLedger::open(&path).unwrap();
        ledger.mark("alice", at((2024, 3, 1), (9, 0, 0))).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows[0], "Name,Date,Time");
        assert_eq!(rows.len(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_same_day_marks_once() {
        let path = temp_ledger_path("same-day");
        let ledger = AttendanceLedger::open(&path).unwrap();

        assert!(ledger.mark("alice", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(!ledger.mark("alice", at((2024, 3, 1), (17, 30, 0))).unwrap());

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 2); // header + one record
        assert_eq!(rows[1], "alice,2024-03-01,09:00:00");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_different_dates_mark_twice() {
        let path = temp_ledger_path("two-dates");
        let ledger = AttendanceLedger::open(&path).unwrap();

        assert!(ledger.mark("alice", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(ledger.mark("alice", at((2024, 3, 2), (9, 5, 0))).unwrap());

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_different_identities_same_day() {
        let path = temp_ledger_path("two-people");
        let ledger = AttendanceLedger::open(&path).unwrap();

        assert!(ledger.mark("alice", at((2024, 3, 1), (9, 0, 0))).unwrap());
        assert!(ledger.mark("bob", at((2024, 3, 1), (9, 1, 0))).unwrap());

        assert!(ledger.is_marked("alice", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
        assert!(ledger.is_marked("bob", NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_reopen_preserves_dedup() {
        let path = temp_ledger_path("reopen");
        {
            let ledger = AttendanceLedger::open(&path).unwrap();
            assert!(ledger.mark("alice", at((2024, 3, 1), (9, 0, 0))).unwrap());
        }
        {
            let ledger = AttendanceLedger::open(&path).unwrap();
            assert!(!ledger.mark("alice", at((2024, 3, 1), (10, 0, 0))).unwrap());
            assert!(ledger.mark("alice", at((2024, 3, 2), (9, 0, 0))).unwrap());
        }

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_malformed_rows_ignored_on_open() {
        let path = temp_ledger_path("malformed");
        std::fs::write(&path, "Name,Date,Time\ngarbage line\nalice,2024-03-01,09:00:00\n")
            .unwrap();

        let ledger = AttendanceLedger::open(&path).unwrap();
        assert!(!ledger.mark("alice", at((2024, 3, 1), (12, 0, 0))).unwrap());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_concurrent_same_identity_marks_once() {
        let path = temp_ledger_path("race");
        let ledger = Arc::new(AttendanceLedger::open(&path).unwrap());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                ledger.mark("alice", at((2024, 3, 1), (9, 0, 0))).unwrap()
            }));
        }

        let appended: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(appended, 1, "exactly one thread may append");

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 2, "header plus exactly one record");

        let _ = std::fs::remove_file(&path);
    }
}
