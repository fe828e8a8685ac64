//! Store-wide error taxonomy.
//!
//! Every fallible operation on the store resolves to one of these variants
//! at the API boundary. A failing `save_package` returns the error and the
//! store keeps serving from the state as of the last applied operation; the
//! host process is never taken down by a bad record.

use crate::package::PackageType;

/// Errors surfaced by the whiteboard store and its components.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Open/read/write/seek failure on one of the on-disk files
    Io(String),
    /// Malformed or truncated record, or an undecodable payload
    Decode(String),
    /// Scene/page does not exist or is out of range
    InvalidIndex { scene: u32, page: u32 },
    /// A record claims a length beyond the allocation cap
    OutOfMemory,
    /// Duplicate `AddScene` replay with identical index and resource
    AlreadyExists { index: u32 },
    /// `AddScene` reusing an index for a different resource
    SceneConflict { index: u32 },
    /// Administrative package kinds the store explicitly rejects
    Unsupported(PackageType),
    /// The store has been closed; no reopen
    Closed,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {e}"),
            StoreError::Decode(e) => write!(f, "Decode error: {e}"),
            StoreError::InvalidIndex { scene, page } => {
                write!(f, "Invalid scene/page index: scene {scene}, page {page}")
            }
            StoreError::OutOfMemory => write!(f, "Record exceeds allocation cap"),
            StoreError::AlreadyExists { index } => {
                write!(f, "Scene {index} already exists")
            }
            StoreError::SceneConflict { index } => {
                write!(f, "Scene {index} already bound to a different resource")
            }
            StoreError::Unsupported(kind) => {
                write!(f, "Unsupported package kind: {kind:?}")
            }
            StoreError::Closed => write!(f, "Store is closed"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
