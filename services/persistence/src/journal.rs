//! Journal writer: append-only record journal with checksums
//!
//! Every store mutation is written here before it is applied in memory, so
//! replaying the journal rebuilds the store after a restart.
//!
//! # Binary Format (per record)
//! ```text
//! [body_len:    u32]
//! [sequence:    u64]
//! [recorded_at: i64]   // Unix nanoseconds
//! [kind_len:    u16][kind: bytes]
//! [payload_len: u32][payload: bytes]
//! [checksum:    u32]   // CRC32C over sequence+recorded_at+kind+payload
//! ```

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest possible body: seq + ts + kind_len + payload_len + crc
const MIN_BODY_LEN: usize = 8 + 8 + 2 + 4 + 4;

/// Bodies larger than this are treated as corruption rather than allocated.
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Sequence error: expected {expected}, got {got}")]
    SequenceError { expected: u64, got: u64 },

    #[error("Record kind too long: {len} bytes")]
    KindTooLong { len: usize },
}

// ── Journal Entry ───────────────────────────────────────────────────

/// A single framed record as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonic per-journal sequence number, starting at 1
    pub sequence: u64,
    /// Wall-clock time of the write in Unix nanoseconds
    pub recorded_at: i64,
    /// Record discriminator, e.g. `"location.appended"`
    pub kind: String,
    /// Bincode-encoded record body
    pub payload: Vec<u8>,
    /// CRC32C over (sequence ++ recorded_at ++ kind ++ payload)
    pub checksum: u32,
}

impl JournalEntry {
    /// Create a new entry, computing the checksum.
    pub fn new(sequence: u64, recorded_at: i64, kind: String, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(sequence, recorded_at, &kind, &payload);
        Self {
            sequence,
            recorded_at,
            kind,
            payload,
            checksum,
        }
    }

    pub fn compute_checksum(sequence: u64, recorded_at: i64, kind: &str, payload: &[u8]) -> u32 {
        let mut buf = Vec::with_capacity(16 + kind.len() + payload.len());
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&recorded_at.to_le_bytes());
        buf.extend_from_slice(kind.as_bytes());
        buf.extend_from_slice(payload);
        crc32c(&buf)
    }

    pub fn verify_checksum(&self) -> bool {
        self.checksum
            == Self::compute_checksum(self.sequence, self.recorded_at, &self.kind, &self.payload)
    }

    /// Encode into the length-prefixed wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, JournalError> {
        let kind = self.kind.as_bytes();
        let kind_len =
            u16::try_from(kind.len()).map_err(|_| JournalError::KindTooLong { len: kind.len() })?;
        let body_len = MIN_BODY_LEN + kind.len() + self.payload.len();
        if body_len > MAX_BODY_LEN {
            return Err(JournalError::Encoding(format!(
                "record body of {} bytes exceeds limit",
                body_len
            )));
        }

        let mut buf = Vec::with_capacity(4 + body_len);
        buf.extend_from_slice(&(body_len as u32).to_le_bytes());
        buf.extend_from_slice(&self.sequence.to_le_bytes());
        buf.extend_from_slice(&self.recorded_at.to_le_bytes());
        buf.extend_from_slice(&kind_len.to_le_bytes());
        buf.extend_from_slice(kind);
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        Ok(buf)
    }

    /// Decode one record from the front of `data`.
    ///
    /// Returns `(entry, bytes_consumed)`. Truncated or inconsistent frames are
    /// reported as errors, never panics.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize), JournalError> {
        let body_len = read_u32(data, 0)
            .ok_or_else(|| JournalError::Encoding("missing length prefix".into()))?
            as usize;
        if !(MIN_BODY_LEN..=MAX_BODY_LEN).contains(&body_len) {
            return Err(JournalError::Encoding(format!(
                "implausible body length {}",
                body_len
            )));
        }
        let total = 4 + body_len;
        if data.len() < total {
            return Err(JournalError::Encoding(format!(
                "incomplete record: need {} bytes, have {}",
                total,
                data.len()
            )));
        }

        let body = &data[4..total];
        let truncated = || JournalError::Encoding("record fields overrun body".into());

        let sequence = read_u64(body, 0).ok_or_else(truncated)?;
        let recorded_at = read_u64(body, 8).ok_or_else(truncated)? as i64;
        let kind_len = read_u16(body, 16).ok_or_else(truncated)? as usize;
        let mut pos = 18;

        let kind_bytes = body.get(pos..pos + kind_len).ok_or_else(truncated)?;
        let kind = String::from_utf8(kind_bytes.to_vec())
            .map_err(|e| JournalError::Encoding(e.to_string()))?;
        pos += kind_len;

        let payload_len = read_u32(body, pos).ok_or_else(truncated)? as usize;
        pos += 4;
        let payload = body.get(pos..pos + payload_len).ok_or_else(truncated)?.to_vec();
        pos += payload_len;

        let checksum = read_u32(body, pos).ok_or_else(truncated)?;
        if pos + 4 != body.len() {
            return Err(JournalError::Encoding(format!(
                "body length {} does not match fields ({} bytes)",
                body.len(),
                pos + 4
            )));
        }

        Ok((
            Self {
                sequence,
                recorded_at,
                kind,
                payload,
                checksum,
            },
            total,
        ))
    }
}

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    buf.get(at..at + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
}

fn read_u64(buf: &[u8], at: usize) -> Option<u64> {
    buf.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
}

// ── Flush / Fsync Policies ──────────────────────────────────────────

/// Controls when buffered data is flushed to the OS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlushPolicy {
    EveryWrite,
    EveryN(usize),
}

/// Controls when `fsync` is called.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    EveryWrite,
    EveryN(usize),
    /// Only when a segment is rotated or `sync` is called
    OnRotation,
}

// ── Journal Writer Configuration ────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding the segment files.
    pub dir: PathBuf,
    /// Segment size in bytes before rotation (default 64 MiB).
    pub max_segment_size: u64,
    pub flush_policy: FlushPolicy,
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_segment_size: 64 * 1024 * 1024,
            flush_policy: FlushPolicy::EveryWrite,
            fsync_policy: FsyncPolicy::EveryWrite,
        }
    }
}

// ── Journal Writer ──────────────────────────────────────────────────

/// Append-only writer with checksums, segment rotation and fsync control.
pub struct JournalWriter {
    config: JournalConfig,
    writer: BufWriter<File>,
    current_segment: PathBuf,
    current_segment_size: u64,
    segment_index: u64,
    next_sequence: u64,
    writes_since_flush: usize,
    writes_since_fsync: usize,
}

impl JournalWriter {
    /// Open the journal directory, appending to the latest segment.
    ///
    /// The caller sets the next sequence from a replay before writing.
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(&config.dir)?;

        let segment_index = latest_segment_index(&config.dir)?.unwrap_or(0);
        let current_segment = segment_path(&config.dir, segment_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&current_segment)?;
        let current_segment_size = file.metadata()?.len();

        Ok(Self {
            config,
            writer: BufWriter::new(file),
            current_segment,
            current_segment_size,
            segment_index,
            next_sequence: 1,
            writes_since_flush: 0,
            writes_since_fsync: 0,
        })
    }

    pub fn set_next_sequence(&mut self, seq: u64) {
        self.next_sequence = seq;
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn current_segment_path(&self) -> &Path {
        &self.current_segment
    }

    /// Append a prepared entry. Its sequence must equal `next_sequence`.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), JournalError> {
        if entry.sequence != self.next_sequence {
            return Err(JournalError::SequenceError {
                expected: self.next_sequence,
                got: entry.sequence,
            });
        }

        if self.current_segment_size >= self.config.max_segment_size {
            self.rotate()?;
        }

        let bytes = entry.to_bytes()?;
        self.writer.write_all(&bytes)?;

        self.current_segment_size += bytes.len() as u64;
        self.next_sequence = entry.sequence + 1;
        self.writes_since_flush += 1;
        self.writes_since_fsync += 1;

        self.apply_flush_policy()?;
        self.apply_fsync_policy()?;
        Ok(())
    }

    /// Frame `payload` under the next sequence number and append it.
    pub fn write_record(
        &mut self,
        recorded_at: i64,
        kind: impl Into<String>,
        payload: Vec<u8>,
    ) -> Result<JournalEntry, JournalError> {
        let entry = JournalEntry::new(self.next_sequence, recorded_at, kind.into(), payload);
        self.append(&entry)?;
        Ok(entry)
    }

    /// Force flush + fsync.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.writes_since_flush = 0;
        self.writes_since_fsync = 0;
        Ok(())
    }

    fn apply_flush_policy(&mut self) -> Result<(), JournalError> {
        let should_flush = match self.config.flush_policy {
            FlushPolicy::EveryWrite => true,
            FlushPolicy::EveryN(n) => self.writes_since_flush >= n,
        };
        if should_flush {
            self.writer.flush()?;
            self.writes_since_flush = 0;
        }
        Ok(())
    }

    fn apply_fsync_policy(&mut self) -> Result<(), JournalError> {
        let should_fsync = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n,
            FsyncPolicy::OnRotation => false,
        };
        if should_fsync {
            self.writer.flush()?;
            self.writer.get_ref().sync_all()?;
            self.writes_since_fsync = 0;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), JournalError> {
        self.sync()?;

        self.segment_index += 1;
        self.current_segment = segment_path(&self.config.dir, self.segment_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.current_segment)?;

        self.writer = BufWriter::new(file);
        self.current_segment_size = 0;
        tracing::debug!(segment = %self.current_segment.display(), "Rotated journal segment");
        Ok(())
    }
}

pub(crate) fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("segment-{:06}.log", index))
}

pub(crate) fn parse_segment_index(name: &str) -> Option<u64> {
    name.strip_prefix("segment-")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

fn latest_segment_index(dir: &Path) -> Result<Option<u64>, JournalError> {
    let mut latest = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(index) = parse_segment_index(&name.to_string_lossy()) {
            latest = latest.max(Some(index));
        }
    }
    Ok(latest)
}

// ── Tests ───────────────────────────────────────────────────────────
