//! Live cache — in-memory reconstruction of the active page.
//!
//! Compaction state machine:
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                  LiveCache                          │
//! │                                                    │
//! │  CleanDraw        → [ ]              (Cleared)     │
//! │  KeyFrame         → [ K ]            (Snapshot)    │
//! │  SwitchScenePage  → [ S ] if empty   (Placeholder) │
//! │  Draw/Change/Ext  → [ ... , P ]      (Appended)    │
//! │  queries / admin  → untouched        (Ignored)     │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! The cache holds owned [`Package`] values cloned at the point of entry,
//! never aliases into reader buffers. If non-empty and the head entry is a
//! `KeyFrame`, that entry is a snapshot boundary; either way the contents
//! are fully determined by replaying the operation log from the page's
//! keyframe offset forward.

use crate::error::StoreError;
use crate::package::{Package, PackageType};

/// What applying one package did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// `CleanDraw` wiped the entries
    Cleared,
    /// `KeyFrame` collapsed the cache to a single snapshot entry
    Snapshot,
    /// `SwitchScenePage` left a placeholder in an empty cache
    Placeholder,
    /// The package was appended
    Appended,
    /// The package does not participate in caching
    Ignored,
}

/// Serialized view of one page's reconstructed state: up to two blobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSnapshot {
    /// The keyframe record encoded alone, when one heads the cache
    pub keyframe: Option<Vec<u8>>,
    /// All cached draw ops merged into one encoded `DrawCommand`
    pub commands: Vec<u8>,
}

/// Ordered in-memory record list for the current (scene, page).
#[derive(Debug, Default)]
pub struct LiveCache {
    entries: Vec<Package>,
}

impl LiveCache {
    /// Run one package through the compaction rules.
    ///
    /// The caller is responsible for only feeding packages that target the
    /// cache's current (scene, page).
    pub fn apply(&mut self, package: &Package) -> CacheEvent {
        match package.kind {
            PackageType::CleanDraw => {
                self.entries.clear();
                CacheEvent::Cleared
            }
            PackageType::KeyFrame => {
                self.entries.clear();
                self.entries.push(package.clone());
                CacheEvent::Snapshot
            }
            PackageType::SwitchScenePage => {
                // A lone placeholder tells recovery "no ops since switch";
                // at most one, and never on top of real entries.
                if self.entries.is_empty() {
                    self.entries.push(package.clone());
                    CacheEvent::Placeholder
                } else {
                    CacheEvent::Ignored
                }
            }
            PackageType::ScenePageData | PackageType::SceneData | PackageType::AddScene => {
                CacheEvent::Ignored
            }
            _ => {
                self.entries.push(package.clone());
                CacheEvent::Appended
            }
        }
    }

    /// Rebuild from a log replay, keeping only packages for (scene, page).
    ///
    /// Cost is bounded by records-since-last-keyframe when the iterator
    /// starts at the page's keyframe offset.
    pub fn rebuild(
        &mut self,
        scene: u32,
        page: u32,
        packages: impl Iterator<Item = (u64, Package)>,
    ) {
        self.entries.clear();
        let mut applied = 0usize;
        for (_, package) in packages {
            if package.scene == scene && package.page == page {
                self.apply(&package);
                applied += 1;
            }
        }
        log::debug!(
            "live cache rebuilt for scene {scene} page {page}: {applied} records applied, {} cached",
            self.entries.len()
        );
    }

    /// Whether the head entry is a keyframe snapshot boundary.
    pub fn has_snapshot_head(&self) -> bool {
        self.entries
            .first()
            .is_some_and(|p| p.kind == PackageType::KeyFrame)
    }

    /// Serialize the cache into the two-blob page snapshot.
    ///
    /// The keyframe blob is present only when a keyframe heads the cache.
    /// The command blob merges every cached draw op list in order; entries
    /// without ops (transforms, placeholders, extensions) contribute none.
    /// An empty cache yields an empty command blob, not an error.
    pub fn snapshot(&self, scene: u32, page: u32) -> Result<PageSnapshot, StoreError> {
        let keyframe = if self.has_snapshot_head() {
            Some(self.entries[0].encode()?)
        } else {
            None
        };

        let mut ops = Vec::new();
        let mut timestamp = 0i64;
        for entry in &self.entries {
            timestamp = entry.timestamp;
            if entry.kind == PackageType::DrawCommand {
                ops.extend(entry.draw_ops()?.ops);
            }
        }

        let commands = Package::draw(scene, page, timestamp, ops).encode()?;
        Ok(PageSnapshot { keyframe, commands })
    }

    pub fn entries(&self) -> &[Package] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
