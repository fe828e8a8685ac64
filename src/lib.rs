//! # inkstore — whiteboard persistence and replay engine
//!
//! Records every drawing/control operation of a multi-scene, multi-page
//! shared whiteboard session, lets a late joiner reconstruct current state
//! without replaying the whole session, and survives process restarts by
//! recovering from on-disk state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  save_package(bytes)  ┌──────────────────┐
//! │ Session      │ ─────────────────────►│ WhiteboardStore  │
//! │ plugin       │ ◄───────────────────── │ (one lock)       │
//! └──────────────┘   SaveOutcome          └────────┬─────────┘
//!                                                  │
//!              ┌──────────────┬────────────────────┼──────────────┐
//!              ▼              ▼                    ▼              ▼
//!       ┌────────────┐ ┌────────────┐      ┌────────────┐ ┌────────────┐
//!       │ .data      │ │ .head      │      │ .scene     │ │ .page      │
//!       │ op log     │ │ keyframes  │      │ scene dir  │ │ page log   │
//!       └────────────┘ └────────────┘      └────────────┘ └────────────┘
//!              ▲
//!              └── LiveCache: bounded replay of the active page
//! ```
//!
//! ## Modules
//!
//! - [`package`] — binary codec for operation records (bincode wire format)
//! - [`records`] — length-prefixed framing shared by all four files
//! - [`oplog`] — append-only operation log, the single source of truth
//! - [`keyframe`] — keyframe index bounding replay depth per page
//! - [`scenes`] — scene directory and page slots
//! - [`pagelog`] — page switch / transform history
//! - [`cache`] — live cache with the compaction state machine
//! - [`store`] — orchestrator: dispatch, recovery, close
//! - [`blob`] — remote backup capability (injected, vendor-free)
//!
//! A keyframe is a recorded log position from which forward replay fully
//! reconstructs a page; replay cost after a crash or page switch is bounded
//! by records-since-last-keyframe, not total history.

pub mod blob;
pub mod cache;
pub mod error;
pub mod keyframe;
pub mod oplog;
pub mod package;
pub mod pagelog;
pub mod records;
pub mod scenes;
pub mod store;

// Re-exports for convenience
pub use blob::{BlobHandle, BlobStore, MemoryBlobStore};
pub use cache::{CacheEvent, LiveCache, PageSnapshot};
pub use error::StoreError;
pub use keyframe::{KeyframeEntry, KeyframeIndex};
pub use oplog::OperationLog;
pub use package::{DrawOps, NewScene, Package, PackageType, PageTransform};
pub use pagelog::{PageEvent, PageIndexLog};
pub use scenes::{Page, Scene, SceneDirectory};
pub use store::{SaveOutcome, StoreConfig, StoreStats, WhiteboardStore};
