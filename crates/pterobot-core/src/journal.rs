//! Append-only JSONL journal of action records.
//!
//! One line per record. Appends are serialized through a mutex so
//! concurrent requests never interleave partial lines.

use std::path::{Path, PathBuf};

use pterobot_types::ActionRecord;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::JournalError;

/// Local file receiving every sealed [`ActionRecord`].
#[derive(Debug)]
pub struct RecordJournal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RecordJournal {
    /// Journal writing to `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Journal file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the record cannot be serialized or the
    /// file cannot be opened or written.
    pub async fn append(&self, record: &ActionRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
