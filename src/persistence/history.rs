//! Append-only build history with crash-safe replay.
//!
//! Records are stored as JSON Lines, one [`BuildRecord`] per line. Every
//! append is fsynced before it returns, so a record that was reported as
//! appended survives a crash.
//!
//! # Recovery
//!
//! [`BuildHistory::open`] replays the whole file. A final line that does not
//! parse (crash mid-write) or a line whose `seq` does not increase marks the
//! end of the valid prefix; the file is truncated there before appending
//! resumes.
//!
//! A failed append is rolled back the same way: the store remembers how many
//! bytes are committed and cuts anything past that before the next write, so
//! a partial line can never sit in front of a later record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{BuildOutcome, BuildRecord, Sha};

/// Errors from the history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize build record: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Durable, ordered log of build attempts.
///
/// The full sequence is also kept in memory: lookups never touch the disk.
/// Internally synchronized, so it can be shared behind an `Arc` between the
/// build worker (the only writer) and read-only HTTP handlers.
pub struct BuildHistory {
    path: PathBuf,
    inner: Mutex<HistoryInner>,
}

struct HistoryInner {
    file: File,
    records: Vec<BuildRecord>,
    next_seq: u64,
    /// File length covering exactly the records in `records`.
    committed_len: u64,
}

impl HistoryInner {
    /// Cuts bytes left behind by a failed append.
    fn discard_uncommitted(&mut self) -> io::Result<()> {
        if self.file.metadata()?.len() != self.committed_len {
            self.file.set_len(self.committed_len)?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.discard_uncommitted()?;
        self.file.write_all(line)?;
        self.file.sync_all()
    }
}

impl BuildHistory {
    /// Opens (or creates) the history file and replays its contents.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| HistoryError::Io {
            path: path.clone(),
            source,
        };

        let created = !path.exists();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let (records, next_seq) = replay(&path).map_err(io_err)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let committed_len = file.metadata().map_err(io_err)?.len();

        // A freshly created file's directory entry must be durable too.
        if created && let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fsync_dir(parent).map_err(io_err)?;
        }

        debug!(
            path = %path.display(),
            records = records.len(),
            next_seq,
            "Opened build history"
        );

        Ok(BuildHistory {
            path,
            inner: Mutex::new(HistoryInner {
                file,
                records,
                next_seq,
                committed_len,
            }),
        })
    }

    /// Appends one record and fsyncs it.
    ///
    /// The store assigns the sequence number and timestamp. The in-memory
    /// view only grows once the line is on disk. On failure the sequence
    /// number is not consumed and any partially written bytes are removed.
    pub fn append(&self, branch: &str, hash: &Sha, outcome: BuildOutcome) -> Result<BuildRecord> {
        let mut inner = self.lock();

        let record = BuildRecord {
            seq: inner.next_seq,
            ts: Utc::now(),
            branch: branch.to_string(),
            hash: hash.clone(),
            outcome,
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        if let Err(source) = inner.write_line(&line) {
            if let Err(e) = inner.discard_uncommitted() {
                warn!(path = %self.path.display(), error = %e, "Could not roll back failed history append");
            }
            return Err(HistoryError::Io {
                path: self.path.clone(),
                source,
            });
        }

        inner.committed_len += line.len() as u64;
        inner.next_seq += 1;
        inner.records.push(record.clone());
        Ok(record)
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<BuildRecord> {
        self.lock().records.clone()
    }

    /// The most recent record for `branch`.
    pub fn last_for(&self, branch: &str) -> Option<BuildRecord> {
        self.lock()
            .records
            .iter()
            .rev()
            .find(|r| r.branch == branch)
            .cloned()
    }

    /// Every record for `branch`, oldest first.
    pub fn for_branch(&self, branch: &str) -> Vec<BuildRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.branch == branch)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HistoryInner> {
        // Appends either complete or leave `records` untouched, so the data
        // behind a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads every valid record, truncating a torn or out-of-order tail.
///
/// Returns the records and the next sequence number to assign.
fn replay(path: &Path) -> io::Result<(Vec<BuildRecord>, u64)> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((vec![], 0)),
        Err(e) => return Err(e),
    };
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut records: Vec<BuildRecord> = Vec::new();
    let mut valid_len = 0u64;
    let mut pos = 0u64;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        let line_start = pos;
        pos += read as u64;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            valid_len = pos;
            continue;
        }

        let in_order = |r: &BuildRecord| records.last().is_none_or(|prev| r.seq > prev.seq);
        match serde_json::from_str::<BuildRecord>(trimmed) {
            Ok(record) if in_order(&record) => {
                records.push(record);
                valid_len = pos;
            }
            Ok(record) => {
                warn!(seq = record.seq, offset = line_start, "Out-of-order history record");
                valid_len = line_start;
                break;
            }
            Err(e) => {
                warn!(error = %e, offset = line_start, "Unreadable history line");
                valid_len = line_start;
                break;
            }
        }
    }

    if valid_len < file_len {
        warn!(
            path = %path.display(),
            from = file_len,
            to = valid_len,
            "Truncating build history to its valid prefix"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    let next_seq = records.last().map_or(0, |r| r.seq + 1);
    Ok((records, next_seq))
}

/// Makes directory entries (newly created files) durable.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
