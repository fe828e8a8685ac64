//! Whiteboard store — owns the four files and serializes all access.
//!
//! Architecture:
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     WhiteboardStore                        │
//! │                 Mutex<Option<StoreInner>>                  │
//! │                                                           │
//! │  save_package ─► decode ─► bounds check ─► dispatch       │
//! │                                                           │
//! │  ┌───────────┐ ┌──────────┐ ┌─────────┐ ┌─────────────┐  │
//! │  │ Operation │ │ Keyframe │ │ Scene   │ │ Page Index  │  │
//! │  │ Log .data │ │ Idx .head│ │ Dir     │ │ Log .page   │  │
//! │  │           │ │          │ │ .scene  │ │             │  │
//! │  └───────────┘ └──────────┘ └─────────┘ └─────────────┘  │
//! │        ▲                                                  │
//! │        └── LiveCache (current scene/page reconstruction)  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! One store instance is one exclusive owner of its files. A single lock
//! guards everything mutable; queries take it too because they can run the
//! same bounded-replay path as mutations. Every mutating call writes
//! durably before returning — there is no background flush, so throughput
//! is bounded by storage latency under the lock, and a process kill after
//! any successful `save_package` loses nothing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::blob::BlobStore;
use crate::cache::{LiveCache, PageSnapshot};
use crate::error::StoreError;
use crate::keyframe::KeyframeIndex;
use crate::oplog::OperationLog;
use crate::package::{Package, PackageType, PageTransform};
use crate::pagelog::{PageEvent, PageIndexLog};
use crate::scenes::SceneDirectory;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the four store files
    pub dir: PathBuf,
    /// Session name; file stem of the four files
    pub session: String,
    /// Sync every mutation to disk before returning (default: true)
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("inkstore_data"),
            session: "whiteboard".into(),
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>, session: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            session: session.into(),
            ..Self::default()
        }
    }

    /// Config for testing (temp directory, no per-write fsync).
    pub fn for_testing(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            session: "test".into(),
            sync_writes: false,
        }
    }

    fn data_file(&self) -> String {
        format!("{}.data", self.session)
    }

    fn head_file(&self) -> String {
        format!("{}.head", self.session)
    }

    fn scene_file(&self) -> String {
        format!("{}.scene", self.session)
    }

    fn page_file(&self) -> String {
        format!("{}.page", self.session)
    }

    fn file_names(&self) -> [String; 4] {
        [
            self.data_file(),
            self.head_file(),
            self.scene_file(),
            self.page_file(),
        ]
    }
}

/// What a successful `save_package` did.
#[derive(Debug)]
pub enum SaveOutcome {
    /// The record was appended to the operation log at this offset
    Appended { offset: u64 },
    /// Valid request, nothing to do (switch to the current page)
    Unchanged,
    /// Scene registered under this index
    SceneAdded { index: u32 },
    /// Current (scene, page) pointer, `None` before any switch
    CurrentPage { current: Option<(u32, u32)> },
    /// Serialized page state
    PageData(PageSnapshot),
}

/// Point-in-time counters for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub scenes: usize,
    pub keyframed_pages: usize,
    pub log_bytes: u64,
    pub cached_entries: usize,
    pub current: Option<(u32, u32)>,
}

struct StoreInner {
    oplog: OperationLog,
    keyframes: KeyframeIndex,
    scenes: SceneDirectory,
    pagelog: PageIndexLog,
    cache: LiveCache,
    current: Option<(u32, u32)>,
    backup: Option<Box<dyn BlobStore>>,
}

/// Persistence and replay engine for one whiteboard session.
pub struct WhiteboardStore {
    config: StoreConfig,
    inner: Mutex<Option<StoreInner>>,
}

impl WhiteboardStore {
    /// Open or create the store at `config.dir/<session>.*`.
    ///
    /// Failure to open or create any of the four files is fatal: the store
    /// is simply never constructed. Corrupt trailing records are not fatal;
    /// recovery keeps everything before the first tear.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_backup(config, None)
    }

    /// Open with a remote blob store for hydrate-on-open / persist-on-close.
    pub fn open_with_backup(
        config: StoreConfig,
        mut backup: Option<Box<dyn BlobStore>>,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.dir)?;

        if let Some(remote) = backup.as_deref_mut() {
            hydrate(remote, &config)?;
        }

        let sync = config.sync_writes;
        let mut oplog = OperationLog::open(&config.dir.join(config.data_file()), sync)?;
        let keyframes = KeyframeIndex::open(&config.dir.join(config.head_file()), sync)?;
        let mut scenes = SceneDirectory::open(&config.dir.join(config.scene_file()), sync)?;
        let mut pagelog = PageIndexLog::open(&config.dir.join(config.page_file()), sync)?;

        // Seed page state: keyframe pointers first, then the page event
        // history (last viewed page + transforms).
        for entry in keyframes.iter() {
            if let Some(page) = scenes.page_mut(entry.scene, entry.page) {
                page.last_keyframe_offset = Some(entry.log_offset);
            }
        }
        let mut current = None;
        for event in pagelog.replay()? {
            match event {
                PageEvent::Switch { scene, page, .. } => {
                    if scenes.has_page(scene, page) {
                        current = Some((scene, page));
                    } else {
                        log::warn!("page index log: switch to unknown scene {scene} page {page}");
                    }
                }
                PageEvent::Transform {
                    scene,
                    page,
                    transform,
                } => {
                    if let Some(p) = scenes.page_mut(scene, page) {
                        p.transform = transform;
                    }
                }
            }
        }

        let mut cache = LiveCache::default();
        if let Some((scene, page)) = current {
            let from = keyframes.lookup(scene, page);
            cache.rebuild(scene, page, oplog.iter_from(from));
        }

        log::info!(
            "store '{}' opened: {} scenes, {} keyframed pages, {} log bytes, current page {:?}",
            config.session,
            scenes.len(),
            keyframes.len(),
            oplog.end_offset(),
            current
        );

        Ok(Self {
            config,
            inner: Mutex::new(Some(StoreInner {
                oplog,
                keyframes,
                scenes,
                pagelog,
                cache,
                current,
                backup,
            })),
        })
    }

    /// Apply one inbound client message.
    ///
    /// Exactly one synchronous operation per message; any error leaves the
    /// store serving from the state as of the last applied operation.
    pub fn save_package(&self, bytes: &[u8]) -> Result<SaveOutcome, StoreError> {
        let mut guard = self.lock()?;
        let inner = guard.as_mut().ok_or(StoreError::Closed)?;

        let package = Package::decode(bytes)?;
        log::trace!(
            "save_package: {:?} scene {} page {}",
            package.kind,
            package.scene,
            package.page
        );

        match package.kind {
            PackageType::EnableUserDraw
            | PackageType::DeleteScene
            | PackageType::ModifyScene
            | PackageType::SceneOrderChange => Err(StoreError::Unsupported(package.kind)),

            PackageType::AddScene => {
                let info = package.new_scene()?;
                let index = inner.scenes.add(&info)?;
                Ok(SaveOutcome::SceneAdded { index })
            }

            PackageType::SceneData => Ok(SaveOutcome::CurrentPage {
                current: inner.current,
            }),

            _ => {
                // Everything else must name an existing scene and page.
                if !inner.scenes.has_page(package.scene, package.page) {
                    return Err(StoreError::InvalidIndex {
                        scene: package.scene,
                        page: package.page,
                    });
                }
                match package.kind {
                    PackageType::ScenePageData => inner
                        .scene_page_data(package.scene, package.page)
                        .map(SaveOutcome::PageData),
                    PackageType::SwitchScenePage => inner.switch(package),
                    PackageType::PageChange => inner.page_change(package),
                    _ => inner.append(package),
                }
            }
        }
    }

    /// The current (scene, page) pointer, `None` before any switch.
    pub fn current_page(&self) -> Result<Option<(u32, u32)>, StoreError> {
        let guard = self.lock()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(inner.current)
    }

    /// The transform of a page, identity for pages never transformed.
    pub fn page_transform(&self, scene: u32, page: u32) -> Result<PageTransform, StoreError> {
        let guard = self.lock()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        if !inner.scenes.has_page(scene, page) {
            return Err(StoreError::InvalidIndex { scene, page });
        }
        Ok(inner
            .scenes
            .get(scene)
            .and_then(|s| s.page(page))
            .map(|p| p.transform)
            .unwrap_or_default())
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let guard = self.lock()?;
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(StoreStats {
            scenes: inner.scenes.len(),
            keyframed_pages: inner.keyframes.len(),
            log_bytes: inner.oplog.end_offset(),
            cached_entries: inner.cache.len(),
            current: inner.current,
        })
    }

    /// Whether `close()` has not run yet.
    pub fn is_open(&self) -> bool {
        self.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Flush and close the four files, upload them through the blob store
    /// when one was injected, and release all in-memory state. No reopen:
    /// every later call returns `Closed`.
    ///
    /// Dropping the store without `close()` loses no appended data (every
    /// mutation was durably written inline) but skips the remote backup.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let mut inner = guard.take().ok_or(StoreError::Closed)?;

        inner.oplog.sync()?;
        inner.keyframes.sync()?;
        inner.scenes.sync()?;
        inner.pagelog.sync()?;

        if let Some(remote) = inner.backup.as_deref_mut() {
            persist(remote, &self.config)?;
        }

        log::info!("store '{}' closed", self.config.session);
        // File handles and cached state drop here.
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<StoreInner>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Io("store lock poisoned".into()))
    }
}

impl StoreInner {
    /// Serialize a page: the live cache when it is current, otherwise an
    /// on-the-fly keyframe-bounded reconstruction.
    fn scene_page_data(&mut self, scene: u32, page: u32) -> Result<PageSnapshot, StoreError> {
        if self.current == Some((scene, page)) {
            return self.cache.snapshot(scene, page);
        }
        let from = self.keyframes.lookup(scene, page);
        let mut replayed = LiveCache::default();
        replayed.rebuild(scene, page, self.oplog.iter_from(from));
        replayed.snapshot(scene, page)
    }

    /// Move the session to another page: persist the page-index record,
    /// rebuild the cache from the target's keyframe, then log the switch.
    fn switch(&mut self, package: Package) -> Result<SaveOutcome, StoreError> {
        let target = (package.scene, package.page);
        if self.current == Some(target) {
            return Ok(SaveOutcome::Unchanged);
        }

        self.pagelog
            .on_switch(package.scene, package.page, package.timestamp)?;

        let from = self.keyframes.lookup(package.scene, package.page);
        let StoreInner { oplog, cache, .. } = self;
        cache.rebuild(package.scene, package.page, oplog.iter_from(from));
        self.current = Some(target);

        self.append(package)
    }

    /// Persist and apply a view transform change, then run the common
    /// append step (the cache sees the record when the target is current).
    fn page_change(&mut self, package: Package) -> Result<SaveOutcome, StoreError> {
        let transform = package.page_transform()?;
        self.pagelog
            .on_transform(package.scene, package.page, transform)?;
        if let Some(p) = self.scenes.page_mut(package.scene, package.page) {
            p.transform = transform;
        }
        self.append(package)
    }

    /// Common append step: encode, append to the operation log, emit a
    /// keyframe when the record is a compaction boundary, and feed the
    /// record through the cache when its page is current.
    ///
    /// Keyframe emission. `CleanDraw` and `KeyFrame` always record one at
    /// the record's own offset; any other appended kind records one only
    /// when the page has none yet — the first record ever applied to a
    /// page must itself be a valid replay start, or recovery of pages
    /// without an explicit `KeyFrame` would degrade to full-log replay.
    /// `SwitchScenePage` never records one. Emission happens on live
    /// appends only; replay never re-records.
    fn append(&mut self, package: Package) -> Result<SaveOutcome, StoreError> {
        let encoded = package.encode()?;
        let offset = self.oplog.append(&encoded)?;

        let wants_keyframe = match package.kind {
            PackageType::CleanDraw | PackageType::KeyFrame => true,
            PackageType::SwitchScenePage => false,
            _ => !self.keyframes.contains(package.scene, package.page),
        };
        if wants_keyframe {
            self.keyframes
                .record(package.scene, package.page, package.timestamp, offset)?;
            if let Some(p) = self.scenes.page_mut(package.scene, package.page) {
                p.last_keyframe_offset = Some(offset);
            }
        }

        if self.current == Some((package.scene, package.page)) {
            self.cache.apply(&package);
        }

        Ok(SaveOutcome::Appended { offset })
    }
}

/// Restore local files from remote copies, when the local side is missing
/// or empty. Blobs are LZ4-compressed on the remote.
fn hydrate(remote: &mut dyn BlobStore, config: &StoreConfig) -> Result<(), StoreError> {
    for name in config.file_names() {
        let local = config.dir.join(&name);
        if local_has_data(&local) {
            log::debug!("hydrate: {name} already present locally, keeping it");
            continue;
        }

        let handle = remote.open(&name)?;
        let compressed = remote.get_range(&handle, 0, u64::MAX)?;
        if !compressed.is_empty() {
            let raw = lz4_flex::decompress_size_prepended(&compressed)
                .map_err(|e| StoreError::Decode(format!("decompress backup {name}: {e}")))?;
            fs::write(&local, raw)?;
            log::info!("hydrate: restored {name} ({} bytes) from remote", compressed.len());
        }
        remote.close(handle)?;
    }
    Ok(())
}

/// Upload the four local files, LZ4-compressed.
fn persist(remote: &mut dyn BlobStore, config: &StoreConfig) -> Result<(), StoreError> {
    for name in config.file_names() {
        let raw = fs::read(config.dir.join(&name))?;
        let compressed = lz4_flex::compress_prepend_size(&raw);

        let handle = remote.open(&name)?;
        remote.put(&handle, &compressed)?;
        remote.close(handle)?;
        log::debug!(
            "persist: uploaded {name} ({} raw / {} compressed bytes)",
            raw.len(),
            compressed.len()
        );
    }
    Ok(())
}

fn local_has_data(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
