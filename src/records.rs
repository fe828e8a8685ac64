//! Length-prefixed record framing shared by all four store files.
//!
//! Every record in every file is `[8-byte little-endian length][length
//! bytes]`, appended and never rewritten. Reads distinguish a clean end of
//! file from a record cut short mid-write, so recovery can stop at the
//! first truncated record and keep everything before it.

use std::io::{Read, Write};

/// Size of the length prefix preceding every record.
pub const LEN_PREFIX: u64 = 8;

/// Allocation cap for a single record. A prefix above this is treated as
/// corruption rather than a request to allocate.
pub const MAX_RECORD_LEN: u64 = 16 * 1024 * 1024;

/// Framing-level read failures.
#[derive(Debug)]
pub enum RecordError {
    /// Underlying read failed
    Io(std::io::Error),
    /// The file ends inside a length prefix or payload
    Truncated,
    /// The length prefix exceeds [`MAX_RECORD_LEN`] (or is zero)
    Oversized(u64),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Io(e) => write!(f, "record read error: {e}"),
            RecordError::Truncated => write!(f, "record truncated mid-write"),
            RecordError::Oversized(len) => write!(f, "record length {len} out of bounds"),
        }
    }
}

impl std::error::Error for RecordError {}

/// On-disk size of a record with the given payload length.
pub fn framed_len(payload_len: usize) -> u64 {
    LEN_PREFIX + payload_len as u64
}

/// Write one framed record. The caller positions the writer and flushes.
pub fn write_record(w: &mut impl Write, bytes: &[u8]) -> std::io::Result<()> {
    w.write_all(&(bytes.len() as u64).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

/// Read one framed record from the current position.
///
/// Returns `Ok(None)` at a clean end of file (zero bytes available),
/// `Err(Truncated)` when the file ends inside a record, and
/// `Err(Oversized)` for a length prefix outside `(0, MAX_RECORD_LEN]`.
pub fn read_record(r: &mut impl Read) -> Result<Option<Vec<u8>>, RecordError> {
    let mut prefix = [0u8; LEN_PREFIX as usize];
    match read_fully(r, &mut prefix).map_err(RecordError::Io)? {
        0 => return Ok(None),
        n if n < prefix.len() => return Err(RecordError::Truncated),
        _ => {}
    }

    let len = u64::from_le_bytes(prefix);
    if len == 0 || len > MAX_RECORD_LEN {
        return Err(RecordError::Oversized(len));
    }

    let mut payload = vec![0u8; len as usize];
    let got = read_fully(r, &mut payload).map_err(RecordError::Io)?;
    if got < payload.len() {
        return Err(RecordError::Truncated);
    }
    Ok(Some(payload))
}

/// Read until the buffer is full or the reader is exhausted; returns the
/// number of bytes actually read.
fn read_fully(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
