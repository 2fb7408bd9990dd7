// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Startup GID reclaim scan
//!
//! Walks every top-level directory under the mount root and re-inserts the
//! GIDs recorded in their sidecar metadata into a class's allocation table,
//! so a restarted process does not re-issue GIDs already in use.
//!
//! The scan is best-effort by design: per-directory failures (unreadable
//! metadata, unparsable GID, conflicting GID) are logged and skipped so that
//! one corrupt directory never prevents the rest of the fleet's GIDs from
//! being reclaimed. Only a failure to list the mount root itself aborts.

use crate::domain::gid::{GidError, GidReclaimer, GidTable};
use crate::infrastructure::metadata::MetadataStore;
use std::path::PathBuf;
use tracing::{error, info, warn};

pub struct FsGidReclaimer {
    base_path: PathBuf,
    store: MetadataStore,
}

impl FsGidReclaimer {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            store: MetadataStore::new(),
        }
    }
}

impl GidReclaimer for FsGidReclaimer {
    fn reclaim(&self, class_name: &str, table: &mut GidTable) -> std::io::Result<()> {
        info!(
            "adding gids for existing directories under {} to the {} gid table",
            self.base_path.display(),
            class_name
        );

        for entry in std::fs::read_dir(&self.base_path)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("failed to read a directory entry under {}: {}", self.base_path.display(), e);
                    continue;
                }
            };
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("failed to stat {}: {}", entry.path().display(), e);
                    continue;
                }
            }

            let dir = entry.path();
            let metadata = match self.store.read(&dir) {
                Ok(Some(metadata)) => metadata,
                // No metadata: created by a storage class that does not reuse
                // volumes, and never holds a reclaimable GID.
                Ok(None) => continue,
                Err(e) => {
                    warn!("failed to read volume metadata for {}: {}", dir.display(), e);
                    continue;
                }
            };

            if metadata.gid.is_empty() {
                continue;
            }
            if metadata.storage_class_name != class_name {
                continue;
            }

            let gid: u32 = match metadata.gid.parse() {
                Ok(gid) => gid,
                Err(_) => {
                    error!(
                        "invalid gid value '{}' in metadata for {}",
                        metadata.gid,
                        dir.display()
                    );
                    continue;
                }
            };

            match table.allocate(gid) {
                Ok(()) => {}
                Err(GidError::Conflict(_)) => {
                    info!(
                        "gid {} found in {} was already allocated for storage class {}",
                        gid,
                        dir.display(),
                        class_name
                    );
                }
                Err(e) => {
                    error!(
                        "failed to record gid {} found in metadata for {}: {}",
                        gid,
                        dir.display(),
                        e
                    );
                }
            }
        }

        Ok(())
    }
}
