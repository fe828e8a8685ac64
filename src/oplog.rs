//! Append-only operation log — the single source of truth.
//!
//! Architecture:
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                <session>.data                     │
//! │                                                  │
//! │  [len|record] [len|record] [len|record] ──► end  │
//! │   ▲                          ▲                   │
//! │   offset 0                   keyframe offsets    │
//! │                              cite "data from     │
//! │                              here onward"        │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Appends return the offset *before* the write, so a keyframe entry citing
//! that offset replays the triggering record itself. Forward iteration is
//! lazy and finite: it ends at the first malformed or truncated record,
//! which during recovery means "end of valid data", never a fatal error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::StoreError;
use crate::package::Package;
use crate::records::{self, RecordError};

/// Append-only file of length-prefixed encoded packages.
pub struct OperationLog {
    file: File,
    /// Offset one past the last byte ever written
    end: u64,
    sync_writes: bool,
}

impl OperationLog {
    /// Open or create the log and walk its framing to find the valid end.
    ///
    /// A crash can leave a torn record at the tail. The walk hops length
    /// prefixes without decoding payloads; everything before the first
    /// framing violation is kept and the tear is truncated away so later
    /// appends stay reachable by replay.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let size = file.seek(SeekFrom::End(0))?;
        let mut end = 0u64;
        let mut prefix = [0u8; records::LEN_PREFIX as usize];
        while end + records::LEN_PREFIX <= size {
            file.seek(SeekFrom::Start(end))?;
            file.read_exact(&mut prefix)?;
            let len = u64::from_le_bytes(prefix);
            if len == 0 || len > records::MAX_RECORD_LEN || end + records::framed_len(len as usize) > size {
                break;
            }
            end += records::framed_len(len as usize);
        }
        if end < size {
            log::warn!("operation log: truncating torn tail at {end} (file size {size})");
            file.set_len(end)?;
        }

        Ok(Self {
            file,
            end,
            sync_writes,
        })
    }

    /// Offset one past the last appended byte.
    pub fn end_offset(&self) -> u64 {
        self.end
    }

    /// Append one encoded record and return the offset before the write.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64, StoreError> {
        let offset = self.end;
        self.file.seek(SeekFrom::Start(offset))?;
        records::write_record(&mut self.file, bytes)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        self.end += records::framed_len(bytes.len());
        Ok(offset)
    }

    /// Read and decode the record at `offset`.
    ///
    /// Returns the package and the offset of the next record, or `None` at
    /// the end of the log. Unlike iteration, a malformed record here is a
    /// hard error: the offset came from a keyframe entry and should point
    /// at a valid record.
    pub fn read_at(&mut self, offset: u64) -> Result<Option<(Package, u64)>, StoreError> {
        if offset >= self.end {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        match records::read_record(&mut self.file) {
            Ok(Some(bytes)) => {
                let package = Package::decode(&bytes)?;
                Ok(Some((package, offset + records::framed_len(bytes.len()))))
            }
            Ok(None) => Ok(None),
            Err(RecordError::Io(e)) => Err(StoreError::Io(e.to_string())),
            Err(RecordError::Truncated) => {
                Err(StoreError::Decode("truncated record".into()))
            }
            Err(RecordError::Oversized(_)) => Err(StoreError::OutOfMemory),
        }
    }

    /// Lazily iterate decoded packages from `offset` forward.
    ///
    /// The iterator halts at the end of the log or at the first record that
    /// fails framing or decoding (logged once at `warn`).
    pub fn iter_from(&mut self, offset: u64) -> PackageIter<'_> {
        PackageIter {
            log: self,
            offset,
            halted: false,
        }
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Lazy, finite forward iterator over log packages.
pub struct PackageIter<'a> {
    log: &'a mut OperationLog,
    offset: u64,
    halted: bool,
}

impl Iterator for PackageIter<'_> {
    /// Each item carries the record's own log offset.
    type Item = (u64, Package);

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted || self.offset >= self.log.end {
            return None;
        }
        if self.log.file.seek(SeekFrom::Start(self.offset)).is_err() {
            self.halted = true;
            return None;
        }
        match records::read_record(&mut self.log.file) {
            Ok(Some(bytes)) => match Package::decode(&bytes) {
                Ok(package) => {
                    let offset = self.offset;
                    self.offset += records::framed_len(bytes.len());
                    Some((offset, package))
                }
                Err(e) => {
                    log::warn!("operation log: undecodable record at {}: {e}", self.offset);
                    self.halted = true;
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("operation log: stopping replay at {}: {e}", self.offset);
                self.halted = true;
                None
            }
        }
    }
}
