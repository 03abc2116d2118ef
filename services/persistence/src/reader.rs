//! Journal reader: sequential replay with corruption detection
//!
//! - CRC32C validation on every record
//! - Gapless, monotonic sequence validation across segments
//! - A torn frame at the very end of the newest segment (crash during a write)
//!   is reported, not fatal; the writer truncates it before appending again
//! - Any other damage is fatal and reported with its byte offset

use crate::journal::{parse_segment_index, JournalEntry};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Checksum mismatch in {segment} at byte offset {offset}: seq={sequence}")]
    ChecksumMismatch {
        segment: String,
        offset: u64,
        sequence: u64,
    },

    #[error("Corruption in {segment} at byte offset {offset}: {detail}")]
    Corruption {
        segment: String,
        offset: u64,
        detail: String,
    },

    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

/// Unreadable bytes at the end of the newest segment.
#[derive(Debug, Clone, PartialEq)]
pub struct TornTail {
    pub segment: PathBuf,
    /// Length of the valid prefix; everything after it is discarded.
    pub valid_len: u64,
    pub discarded: u64,
}

/// Everything recovered from a journal directory.
#[derive(Debug, Default)]
pub struct Replay {
    pub entries: Vec<JournalEntry>,
    pub torn_tail: Option<TornTail>,
}

impl Replay {
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.last().map(|e| e.sequence)
    }
}

/// Sequential reader over all segments of a journal directory.
pub struct JournalReader {
    segments: Vec<PathBuf>,
}

impl JournalReader {
    /// Discover segments in `dir`, ordered by index. A missing directory is
    /// an empty journal.
    pub fn open(dir: &Path) -> Result<Self, ReaderError> {
        Ok(Self {
            segments: discover_segments(dir)?,
        })
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Read and validate every record.
    pub fn replay(&self) -> Result<Replay, ReaderError> {
        let mut replay = Replay::default();
        let mut expected: Option<u64> = None;

        for (idx, segment) in self.segments.iter().enumerate() {
            let is_newest = idx + 1 == self.segments.len();
            let data = fs::read(segment)?;
            let mut pos = 0usize;

            while pos < data.len() {
                let frame = match JournalEntry::from_bytes(&data[pos..]) {
                    Ok(frame) => frame,
                    Err(err) if is_newest => {
                        tracing::warn!(
                            segment = %segment.display(),
                            offset = pos,
                            error = %err,
                            "Discarding torn journal tail"
                        );
                        replay.torn_tail = Some(TornTail {
                            segment: segment.clone(),
                            valid_len: pos as u64,
                            discarded: (data.len() - pos) as u64,
                        });
                        break;
                    }
                    Err(err) => {
                        return Err(ReaderError::Corruption {
                            segment: segment.display().to_string(),
                            offset: pos as u64,
                            detail: err.to_string(),
                        });
                    }
                };
                let (entry, consumed) = frame;

                if !entry.verify_checksum() {
                    return Err(ReaderError::ChecksumMismatch {
                        segment: segment.display().to_string(),
                        offset: pos as u64,
                        sequence: entry.sequence,
                    });
                }
                if let Some(exp) = expected {
                    if entry.sequence != exp {
                        return Err(ReaderError::SequenceGap {
                            expected: exp,
                            got: entry.sequence,
                        });
                    }
                }

                expected = Some(entry.sequence + 1);
                pos += consumed;
                replay.entries.push(entry);
            }
        }

        Ok(replay)
    }
}

fn discover_segments(dir: &Path) -> Result<Vec<PathBuf>, ReaderError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut segments: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(index) = parse_segment_index(&entry.file_name().to_string_lossy()) {
            segments.push((index, entry.path()));
        }
    }
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments.into_iter().map(|(_, path)| path).collect())
}
