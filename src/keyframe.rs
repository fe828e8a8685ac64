//! Keyframe index — bounds replay depth per page.
//!
//! The on-disk file (`<session>.head`) is an append-only sequence of framed
//! [`KeyframeEntry`] records. Entries are write-once on disk; in memory only
//! the latest entry per (scene, page) survives, so replaying the whole file
//! on open is a straight last-writer-wins fold. The file stays small because
//! a keyframe is emitted only at compaction boundaries (`CleanDraw`,
//! `KeyFrame`, first-ever record for a page).
//!
//! `lookup` returns 0 when a page has no recorded keyframe: replay then
//! falls back to the full log, which is always correct, just unbounded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::error::StoreError;
use crate::records;

/// One recorded replay start position for a (scene, page).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyframeEntry {
    pub scene: u32,
    pub page: u32,
    pub timestamp: i64,
    /// Log offset of the triggering record; replay from here re-applies it
    pub log_offset: u64,
}

/// Append-only keyframe file plus the in-memory latest-pointer map.
pub struct KeyframeIndex {
    file: File,
    end: u64,
    sync_writes: bool,
    latest: HashMap<(u32, u32), KeyframeEntry>,
}

impl KeyframeIndex {
    /// Open or create the index, replaying every entry on disk.
    ///
    /// A malformed trailing entry ends the replay with a warning; all
    /// entries before it are kept.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut latest = HashMap::new();
        let mut end = 0u64;
        let mut torn = false;
        file.seek(SeekFrom::Start(0))?;
        loop {
            match records::read_record(&mut file) {
                Ok(Some(bytes)) => {
                    match bincode::serde::decode_from_slice::<KeyframeEntry, _>(
                        &bytes,
                        bincode::config::standard(),
                    ) {
                        Ok((entry, _)) => {
                            latest.insert((entry.scene, entry.page), entry);
                            end += records::framed_len(bytes.len());
                        }
                        Err(e) => {
                            log::warn!("keyframe index: undecodable entry at {end}: {e}");
                            torn = true;
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("keyframe index: stopping replay at {end}: {e}");
                    torn = true;
                    break;
                }
            }
        }
        if torn {
            // Later appends must stay reachable by the next replay.
            file.set_len(end)?;
        }

        Ok(Self {
            file,
            end,
            sync_writes,
            latest,
        })
    }

    /// Record a keyframe for (scene, page) citing `log_offset`.
    pub fn record(
        &mut self,
        scene: u32,
        page: u32,
        timestamp: i64,
        log_offset: u64,
    ) -> Result<(), StoreError> {
        let entry = KeyframeEntry {
            scene,
            page,
            timestamp,
            log_offset,
        };
        let bytes = bincode::serde::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| StoreError::Decode(format!("encode keyframe entry: {e}")))?;

        self.file.seek(SeekFrom::Start(self.end))?;
        records::write_record(&mut self.file, &bytes)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        self.end += records::framed_len(bytes.len());
        self.latest.insert((scene, page), entry);
        log::trace!("keyframe recorded: scene {scene} page {page} offset {log_offset}");
        Ok(())
    }

    /// Replay start offset for a page; 0 when none recorded.
    pub fn lookup(&self, scene: u32, page: u32) -> u64 {
        self.latest
            .get(&(scene, page))
            .map_or(0, |entry| entry.log_offset)
    }

    /// Whether this page has any keyframe recorded.
    pub fn contains(&self, scene: u32, page: u32) -> bool {
        self.latest.contains_key(&(scene, page))
    }

    /// Latest entry for a page, if any.
    pub fn entry(&self, scene: u32, page: u32) -> Option<&KeyframeEntry> {
        self.latest.get(&(scene, page))
    }

    /// Iterate the latest entry of every page.
    pub fn iter(&self) -> impl Iterator<Item = &KeyframeEntry> {
        self.latest.values()
    }

    /// Number of pages with a recorded keyframe.
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn open_index(dir: &Path) -> KeyframeIndex {
        KeyframeIndex::open(&dir.join("test.head"), false).unwrap()
    }

    #[test]
    fn test_lookup_missing_is_zero() {
        let dir = tempdir().unwrap();
        let index = open_index(dir.path());
        assert_eq!(index.lookup(0, 0), 0);
        assert!(!index.contains(0, 0));
        assert!(index.is_empty());
    }

    #[test]
    fn test_record_and_lookup() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path());

        index.record(1, 2, 100, 4096).unwrap();
        assert_eq!(index.lookup(1, 2), 4096);
        assert!(index.contains(1, 2));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_last_writer_wins() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path());

        index.record(0, 0, 1, 10).unwrap();
        index.record(0, 0, 2, 200).unwrap();
        index.record(0, 0, 3, 3000).unwrap();

        assert_eq!(index.lookup(0, 0), 3000);
        assert_eq!(index.len(), 1, "only the latest pointer survives in memory");
    }

    #[test]
    fn test_replay_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.head");
        {
            let mut index = KeyframeIndex::open(&path, false).unwrap();
            index.record(0, 0, 1, 10).unwrap();
            index.record(0, 1, 2, 20).unwrap();
            index.record(0, 0, 3, 30).unwrap();
        }

        let index = KeyframeIndex::open(&path, false).unwrap();
        assert_eq!(index.lookup(0, 0), 30);
        assert_eq!(index.lookup(0, 1), 20);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_reopen_keeps_entries_before_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.head");
        {
            let mut index = KeyframeIndex::open(&path, false).unwrap();
            index.record(0, 0, 1, 10).unwrap();
            index.record(1, 0, 2, 20).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&999u64.to_le_bytes()).unwrap();
            file.write_all(&[0x11; 4]).unwrap();
        }

        let index = KeyframeIndex::open(&path, false).unwrap();
        assert_eq!(index.lookup(0, 0), 10);
        assert_eq!(index.lookup(1, 0), 20);
    }

    #[test]
    fn test_appends_after_reopen_continue_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.head");
        {
            let mut index = KeyframeIndex::open(&path, false).unwrap();
            index.record(0, 0, 1, 10).unwrap();
        }
        {
            let mut index = KeyframeIndex::open(&path, false).unwrap();
            index.record(0, 1, 2, 20).unwrap();
        }

        let index = KeyframeIndex::open(&path, false).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(0, 0), 10);
        assert_eq!(index.lookup(0, 1), 20);
    }
}
