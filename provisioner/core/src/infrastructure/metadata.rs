// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sidecar metadata IO
//!
//! Reads and writes the per-directory ownership record as a fixed, hidden
//! JSON file inside the tenant directory, readable and writable by the
//! provisioner process only.

use crate::domain::error::ProvisionError;
use crate::domain::metadata::VolumeMetadata;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::error;

/// Fixed sidecar filename inside each reuse-mode tenant directory
pub const METADATA_FILE: &str = ".efs-provisioner-metadata";

#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataStore;

impl MetadataStore {
    pub fn new() -> Self {
        Self
    }

    fn metadata_path(&self, directory: &Path) -> PathBuf {
        directory.join(METADATA_FILE)
    }

    /// Serialize the record into the directory's sidecar file (mode 0600).
    /// Failures are surfaced, not retried.
    pub fn write(&self, directory: &Path, record: &VolumeMetadata) -> Result<(), ProvisionError> {
        let path = self.metadata_path(directory);
        let contents =
            serde_json::to_vec_pretty(record).map_err(|e| ProvisionError::Metadata {
                path: path.display().to_string(),
                reason: format!("failed to serialize metadata: {e}"),
            })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| {
                error!("failed to open metadata file {}: {}", path.display(), e);
                ProvisionError::Io(e)
            })?;
        file.write_all(&contents).map_err(|e| {
            error!("failed to write metadata file {}: {}", path.display(), e);
            ProvisionError::Io(e)
        })?;
        Ok(())
    }

    /// Read the directory's sidecar record.
    ///
    /// `Ok(None)` when the file is absent: the directory exists but was
    /// created by a class that does not reuse volumes. A present but
    /// unparsable file is a hard error.
    pub fn read(&self, directory: &Path) -> Result<Option<VolumeMetadata>, ProvisionError> {
        let path = self.metadata_path(directory);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                error!("failed to read metadata file {}: {}", path.display(), e);
                return Err(ProvisionError::Io(e));
            }
        };

        let record = serde_json::from_slice(&contents).map_err(|e| ProvisionError::Metadata {
            path: path.display().to_string(),
            reason: format!("failed to parse metadata: {e}"),
        })?;
        Ok(Some(record))
    }
}
