//! Scene directory — registry of scenes and their page slots.
//!
//! The on-disk file (`<session>.scene`) holds one framed [`NewScene`] record
//! per successful add and is fully replayed on open to rebuild the in-memory
//! map. It stays tiny (tens of scenes, not history-sized).
//!
//! A scene owns exactly `page_count` page slots, fixed at creation and never
//! resized. Pages materialize lazily on first reference with the default
//! view transform and live as long as the store.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::error::StoreError;
use crate::package::{NewScene, PageTransform};
use crate::records;

/// In-memory state of one page slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Page {
    pub transform: PageTransform,
    /// Mirror of the keyframe index's latest pointer for this page
    pub last_keyframe_offset: Option<u64>,
}

/// One whiteboard document: immutable descriptor plus its page slots.
#[derive(Debug, Clone)]
pub struct Scene {
    pub index: u32,
    pub resource_id: String,
    pub resource_url: String,
    pub scene_type: u32,
    pub page_count: u32,
    pages: Vec<Option<Page>>,
}

impl Scene {
    fn new(info: &NewScene) -> Self {
        Self {
            index: info.index,
            resource_id: info.resource_id.clone(),
            resource_url: info.resource_url.clone(),
            scene_type: info.scene_type,
            page_count: info.page_count,
            pages: vec![None; info.page_count as usize],
        }
    }

    /// Whether `page` is a valid slot for this scene.
    pub fn has_page(&self, page: u32) -> bool {
        page < self.page_count
    }

    /// The page, if it has been touched.
    pub fn page(&self, page: u32) -> Option<&Page> {
        self.pages.get(page as usize).and_then(|slot| slot.as_ref())
    }

    /// The page, materialized on first reference; `None` when out of range.
    pub fn page_mut(&mut self, page: u32) -> Option<&mut Page> {
        self.pages
            .get_mut(page as usize)
            .map(|slot| slot.get_or_insert_with(Page::default))
    }
}

/// Append-only scene file plus the in-memory scene map.
pub struct SceneDirectory {
    file: File,
    end: u64,
    sync_writes: bool,
    scenes: BTreeMap<u32, Scene>,
}

impl SceneDirectory {
    /// Open or create the directory, replaying every record on disk.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut scenes = BTreeMap::new();
        let mut end = 0u64;
        let mut torn = false;
        file.seek(SeekFrom::Start(0))?;
        loop {
            match records::read_record(&mut file) {
                Ok(Some(bytes)) => {
                    match bincode::serde::decode_from_slice::<NewScene, _>(
                        &bytes,
                        bincode::config::standard(),
                    ) {
                        Ok((info, _)) => {
                            scenes.insert(info.index, Scene::new(&info));
                            end += records::framed_len(bytes.len());
                        }
                        Err(e) => {
                            log::warn!("scene directory: undecodable record at {end}: {e}");
                            torn = true;
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("scene directory: stopping replay at {end}: {e}");
                    torn = true;
                    break;
                }
            }
        }
        if torn {
            file.set_len(end)?;
        }

        Ok(Self {
            file,
            end,
            sync_writes,
            scenes,
        })
    }

    /// Register a scene; returns the assigned (requested) index.
    ///
    /// Replaying the same add — identical index and resource — is reported
    /// as `AlreadyExists` with no state change, so the caller can treat it
    /// as idempotent. Reusing an index for a different resource is a
    /// conflict.
    pub fn add(&mut self, info: &NewScene) -> Result<u32, StoreError> {
        if info.page_count == 0 {
            return Err(StoreError::InvalidIndex {
                scene: info.index,
                page: 0,
            });
        }
        if let Some(existing) = self.scenes.get(&info.index) {
            if existing.resource_url == info.resource_url {
                return Err(StoreError::AlreadyExists { index: info.index });
            }
            return Err(StoreError::SceneConflict { index: info.index });
        }

        let bytes = bincode::serde::encode_to_vec(info, bincode::config::standard())
            .map_err(|e| StoreError::Decode(format!("encode scene record: {e}")))?;
        self.file.seek(SeekFrom::Start(self.end))?;
        records::write_record(&mut self.file, &bytes)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        self.end += records::framed_len(bytes.len());

        self.scenes.insert(info.index, Scene::new(info));
        log::debug!(
            "scene {} added: {} ({} pages)",
            info.index,
            info.resource_url,
            info.page_count
        );
        Ok(info.index)
    }

    pub fn get(&self, scene: u32) -> Option<&Scene> {
        self.scenes.get(&scene)
    }

    pub fn get_mut(&mut self, scene: u32) -> Option<&mut Scene> {
        self.scenes.get_mut(&scene)
    }

    /// Whether (scene, page) names an existing scene and a valid page slot.
    pub fn has_page(&self, scene: u32, page: u32) -> bool {
        self.scenes
            .get(&scene)
            .is_some_and(|s| s.has_page(page))
    }

    /// The page state, materialized on first reference.
    pub fn page_mut(&mut self, scene: u32, page: u32) -> Option<&mut Page> {
        self.scenes.get_mut(&scene).and_then(|s| s.page_mut(page))
    }

    /// All scenes in index order.
    pub fn list(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }
}
