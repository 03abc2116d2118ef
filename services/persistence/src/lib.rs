//! Durable journal for the tracking and payments stores
//!
//! Provides append-only record journals with CRC32C checksums, segment
//! rotation and replay. Stores write a record before applying a mutation in
//! memory and rebuild themselves from [`Journal::open`]'s replay on startup.

pub mod journal;
pub mod reader;

use journal::{JournalConfig, JournalEntry, JournalError, JournalWriter};
use reader::{JournalReader, Replay, ReaderError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error("Record encoding failed: {0}")]
    Codec(String),

    #[error("Journal task failed: {0}")]
    Task(String),
}

/// Shared async handle to one journal directory.
///
/// Writes are serialised by a mutex and run on the blocking pool.
#[derive(Clone)]
pub struct Journal {
    writer: Arc<Mutex<JournalWriter>>,
}

impl Journal {
    /// Replay the directory, drop a torn tail if there is one, and open the
    /// writer positioned after the last valid record.
    pub fn open(config: JournalConfig) -> Result<(Self, Replay), PersistenceError> {
        let replay = JournalReader::open(&config.dir)?.replay()?;

        if let Some(tail) = &replay.torn_tail {
            let file = OpenOptions::new().write(true).open(&tail.segment).map_err(JournalError::Io)?;
            file.set_len(tail.valid_len).map_err(JournalError::Io)?;
            tracing::warn!(
                segment = %tail.segment.display(),
                discarded = tail.discarded,
                "Truncated torn journal tail"
            );
        }

        let mut writer = JournalWriter::open(config)?;
        writer.set_next_sequence(replay.last_sequence().map_or(1, |seq| seq + 1));
        tracing::info!(
            records = replay.entries.len(),
            next_sequence = writer.next_sequence(),
            "Journal opened"
        );

        Ok((
            Self {
                writer: Arc::new(Mutex::new(writer)),
            },
            replay,
        ))
    }

    /// Encode `record` and append it. Returns the assigned sequence.
    pub async fn append<T: Serialize>(&self, kind: &'static str, record: &T) -> Result<u64, PersistenceError> {
        let payload = encode(record)?;
        let writer = Arc::clone(&self.writer);
        let recorded_at = unix_nanos();

        tokio::task::spawn_blocking(move || {
            let mut writer = writer
                .lock()
                .map_err(|_| PersistenceError::Task("journal writer lock poisoned".into()))?;
            let entry = writer.write_record(recorded_at, kind, payload)?;
            Ok(entry.sequence)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }

    /// Flush and fsync outstanding writes.
    pub async fn sync(&self) -> Result<(), PersistenceError> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || {
            let mut writer = writer
                .lock()
                .map_err(|_| PersistenceError::Task("journal writer lock poisoned".into()))?;
            writer.sync()?;
            Ok(())
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, PersistenceError> {
    bincode::serialize(record).map_err(|e| PersistenceError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(entry: &JournalEntry) -> Result<T, PersistenceError> {
    bincode::deserialize(&entry.payload).map_err(|e| {
        PersistenceError::Codec(format!("record seq={} ({}): {}", entry.sequence, entry.kind, e))
    })
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Record {
        Opened { id: u64, label: String },
        Closed { id: u64 },
    }

    #[tokio::test]
    async fn test_append_then_reopen_replays_records() {
        let tmp = TempDir::new().unwrap();
        {
            let (journal, replay) = Journal::open(JournalConfig::new(tmp.path())).unwrap();
            assert!(replay.entries.is_empty());
            let seq = journal
                .append("opened", &Record::Opened { id: 1, label: "a".into() })
                .await
                .unwrap();
            assert_eq!(seq, 1);
            journal.append("closed", &Record::Closed { id: 1 }).await.unwrap();
        }

        let (journal, replay) = Journal::open(JournalConfig::new(tmp.path())).unwrap();
        let records: Vec<Record> = replay.entries.iter().map(|e| decode(e).unwrap()).collect();
        assert_eq!(
            records,
            vec![Record::Opened { id: 1, label: "a".into() }, Record::Closed { id: 1 }]
        );
        assert_eq!(replay.entries[1].kind, "closed");

        let seq = journal.append("closed", &Record::Closed { id: 2 }).await.unwrap();
        assert_eq!(seq, 3);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated_on_open() {
        use std::io::Write;

        let tmp = TempDir::new().unwrap();
        let segment = {
            let (handle, _) = Journal::open(JournalConfig::new(tmp.path())).unwrap();
            handle.append("closed", &Record::Closed { id: 7 }).await.unwrap();
            handle.sync().await.unwrap();
            journal::segment_path(tmp.path(), 0)
        };
        let mut file = OpenOptions::new().append(true).open(&segment).unwrap();
        file.write_all(&[99, 0, 0]).unwrap();
        drop(file);

        let (journal, replay) = Journal::open(JournalConfig::new(tmp.path())).unwrap();
        assert_eq!(replay.entries.len(), 1);
        journal.append("closed", &Record::Closed { id: 8 }).await.unwrap();

        let (_, replay) = Journal::open(JournalConfig::new(tmp.path())).unwrap();
        assert_eq!(replay.entries.len(), 2);
        assert!(replay.torn_tail.is_none());
    }
}
