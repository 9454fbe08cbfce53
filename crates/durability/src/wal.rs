//! Write-ahead log
//!
//! Frame layout, all integers little-endian:
//!
//! ```text
//! [len: u32][crc32: u32][payload: len bytes, MessagePack]
//! ```
//!
//! Replay stops at the first frame that is short, oversized, fails its
//! checksum or does not decode. Everything before it is valid; the rest is
//! a torn tail from an interrupted write and is truncated on open.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use labcore_core::{Event, LabError, Timestamp};
use labcore_storage::{Record, RecordKey};

/// File name of the log inside a database directory
pub const WAL_FILE_NAME: &str = "labcore.wal";

const HEADER_LEN: usize = 8;
const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// One logged state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    /// A committed transaction: record changes plus its events
    Commit {
        /// Store version after the commit
        version: u64,
        /// Records written
        writes: Vec<(RecordKey, Record)>,
        /// Keys deleted
        deletes: Vec<RecordKey>,
        /// Events appended, ids already assigned
        events: Vec<Event>,
    },
    /// A retention run: events older than `cutoff` are gone
    Prune {
        /// Exclusive cutoff
        cutoff: Timestamp,
    },
}

/// WAL errors
#[derive(Debug, Error)]
pub enum WalError {
    /// File system failure
    #[error("wal io error: {0}")]
    Io(#[from] io::Error),
    /// Entry could not be encoded
    #[error("wal encode error: {0}")]
    Encode(String),
}

impl From<WalError> for LabError {
    fn from(e: WalError) -> Self {
        match e {
            WalError::Io(io) => LabError::unavailable(format!("write-ahead log: {}", io)),
            WalError::Encode(msg) => LabError::serialization(msg),
        }
    }
}

/// Outcome of reading a log file
#[derive(Debug, Default)]
pub struct WalReadResult {
    /// Entries decoded, in log order
    pub entries: Vec<WalEntry>,
    /// Byte length of the valid prefix
    pub valid_len: u64,
    /// Why reading stopped early, if it did
    pub corruption: Option<String>,
}

/// Decode frames from raw log bytes
pub fn decode_frames(bytes: &[u8]) -> WalReadResult {
    let mut result = WalReadResult::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < HEADER_LEN {
            result.corruption = Some(format!("truncated frame header at offset {}", offset));
            break;
        }
        let len = LittleEndian::read_u32(&bytes[offset..offset + 4]) as usize;
        let crc = LittleEndian::read_u32(&bytes[offset + 4..offset + HEADER_LEN]);
        if len > MAX_FRAME_LEN {
            result.corruption = Some(format!("frame length {} at offset {} exceeds limit", len, offset));
            break;
        }
        if remaining < HEADER_LEN + len {
            result.corruption = Some(format!("truncated frame payload at offset {}", offset));
            break;
        }
        let payload = &bytes[offset + HEADER_LEN..offset + HEADER_LEN + len];
        if crc32fast::hash(payload) != crc {
            result.corruption = Some(format!("checksum mismatch at offset {}", offset));
            break;
        }
        match rmp_serde::from_slice::<WalEntry>(payload) {
            Ok(entry) => result.entries.push(entry),
            Err(e) => {
                result.corruption = Some(format!("undecodable frame at offset {}: {}", offset, e));
                break;
            }
        }
        offset += HEADER_LEN + len;
        result.valid_len = offset as u64;
    }

    result
}

/// Encode one entry as a complete frame
pub fn encode_frame(entry: &WalEntry) -> Result<Vec<u8>, WalError> {
    let payload = rmp_serde::to_vec_named(entry).map_err(|e| WalError::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|l| (*l as usize) <= MAX_FRAME_LEN)
        .ok_or_else(|| WalError::Encode(format!("entry of {} bytes is too large", payload.len())))?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.write_u32::<LittleEndian>(len)?;
    frame.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Append-only log file
pub struct Wal {
    path: PathBuf,
    file: Mutex<File>,
    sync_on_commit: bool,
}

impl Wal {
    /// Open (or create) the log, returning the entries to replay
    ///
    /// A torn tail is logged and truncated so new frames follow the last
    /// valid one.
    pub fn open(path: impl AsRef<Path>, sync_on_commit: bool) -> Result<(Self, Vec<WalEntry>), WalError> {
        let path = path.as_ref().to_path_buf();
        let read = Self::read(&path)?;
        if let Some(reason) = &read.corruption {
            tracing::warn!(
                path = %path.display(),
                valid_len = read.valid_len,
                reason = %reason,
                "Truncating torn write-ahead log tail"
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.set_len(read.valid_len)?;

        Ok((
            Wal {
                path,
                file: Mutex::new(file),
                sync_on_commit,
            },
            read.entries,
        ))
    }

    /// Read a log without opening it for writing
    ///
    /// A missing file reads as empty.
    pub fn read(path: impl AsRef<Path>) -> Result<WalReadResult, WalError> {
        match fs::read(path.as_ref()) {
            Ok(bytes) => Ok(decode_frames(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(WalReadResult::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one entry
    ///
    /// On a failed write the file is cut back to its previous length so
    /// a partial frame never precedes later ones.
    pub fn append(&self, entry: &WalEntry) -> Result<(), WalError> {
        let frame = encode_frame(entry)?;
        let mut file = self.file.lock();
        let start = file.metadata()?.len();
        if let Err(e) = file.write_all(&frame) {
            if let Err(trunc) = file.set_len(start) {
                tracing::warn!(error = %trunc, "Failed to roll back partial wal frame");
            }
            return Err(e.into());
        }
        if self.sync_on_commit {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Flush file contents to disk
    pub fn sync(&self) -> Result<(), WalError> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file size in bytes
    pub fn size(&self) -> Result<u64, WalError> {
        Ok(self.file.lock().metadata()?.len())
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("sync_on_commit", &self.sync_on_commit)
            .finish()
    }
}
