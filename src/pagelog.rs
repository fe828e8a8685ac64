//! Page index log — restores "last viewed page" and view transforms.
//!
//! The on-disk file (`<session>.page`) records page switches and transform
//! changes as framed [`PageEvent`] records. The log itself keeps no
//! in-memory state: the store applies each event to the live page map as it
//! happens, and on open replays the file in order to seed transforms and
//! find the most recently viewed (scene, page) before rebuilding the cache.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::error::StoreError;
use crate::package::PageTransform;
use crate::records;

/// One page-level event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PageEvent {
    /// The session moved to (scene, page)
    Switch {
        scene: u32,
        page: u32,
        timestamp: i64,
    },
    /// A page's view transform changed
    Transform {
        scene: u32,
        page: u32,
        transform: PageTransform,
    },
}

/// Append-only page event file.
pub struct PageIndexLog {
    file: File,
    end: u64,
    sync_writes: bool,
}

impl PageIndexLog {
    /// Open or create the log and walk its framing to find the valid end.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let end = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file,
            end,
            sync_writes,
        })
    }

    /// Record a page switch.
    pub fn on_switch(&mut self, scene: u32, page: u32, timestamp: i64) -> Result<(), StoreError> {
        self.append(&PageEvent::Switch {
            scene,
            page,
            timestamp,
        })
    }

    /// Record a transform change.
    pub fn on_transform(
        &mut self,
        scene: u32,
        page: u32,
        transform: PageTransform,
    ) -> Result<(), StoreError> {
        self.append(&PageEvent::Transform {
            scene,
            page,
            transform,
        })
    }

    fn append(&mut self, event: &PageEvent) -> Result<(), StoreError> {
        let bytes = bincode::serde::encode_to_vec(event, bincode::config::standard())
            .map_err(|e| StoreError::Decode(format!("encode page event: {e}")))?;
        self.file.seek(SeekFrom::Start(self.end))?;
        records::write_record(&mut self.file, &bytes)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        self.end += records::framed_len(bytes.len());
        Ok(())
    }

    /// Replay every event on disk, in write order.
    ///
    /// Stops cleanly at the first malformed record (truncating it away so
    /// later appends stay reachable) and returns everything before it.
    pub fn replay(&mut self) -> Result<Vec<PageEvent>, StoreError> {
        let mut events = Vec::new();
        let mut end = 0u64;
        let mut torn = false;
        self.file.seek(SeekFrom::Start(0))?;
        loop {
            match records::read_record(&mut self.file) {
                Ok(Some(bytes)) => {
                    match bincode::serde::decode_from_slice::<PageEvent, _>(
                        &bytes,
                        bincode::config::standard(),
                    ) {
                        Ok((event, _)) => {
                            events.push(event);
                            end += records::framed_len(bytes.len());
                        }
                        Err(e) => {
                            log::warn!("page index log: undecodable event at {end}: {e}");
                            torn = true;
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("page index log: stopping replay at {end}: {e}");
                    torn = true;
                    break;
                }
            }
        }
        if torn {
            self.file.set_len(end)?;
            self.end = end;
        }
        Ok(events)
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }
}
