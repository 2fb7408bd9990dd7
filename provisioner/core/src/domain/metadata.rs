// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sidecar ownership record
//!
//! One record per reuse-mode tenant directory, written once at creation time
//! and never mutated afterwards. Directories created by non-reusing classes
//! carry no record at all; the absence is meaningful and distinguishes
//! "created without reuse" from "corrupt metadata on a reuse directory".

use serde::{Deserialize, Serialize};

/// Ownership metadata persisted inside each reuse-mode tenant directory.
///
/// All fields are strings for on-disk stability; an empty `gid` means no GID
/// was allocated for the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMetadata {
    pub gid: String,
    pub pvc_name: String,
    pub pvc_namespace: String,
    pub storage_class_name: String,
}

impl VolumeMetadata {
    pub fn new(
        gid: Option<u32>,
        pvc_name: impl Into<String>,
        pvc_namespace: impl Into<String>,
        storage_class_name: impl Into<String>,
    ) -> Self {
        Self {
            gid: gid.map(|g| g.to_string()).unwrap_or_default(),
            pvc_name: pvc_name.into(),
            pvc_namespace: pvc_namespace.into(),
            storage_class_name: storage_class_name.into(),
        }
    }

    /// The recorded GID as a number. `Ok(None)` when no GID was recorded;
    /// `Err` when the field holds something that is not a u32.
    pub fn gid_as_u32(&self) -> Result<Option<u32>, std::num::ParseIntError> {
        if self.gid.is_empty() {
            return Ok(None);
        }
        self.gid.parse::<u32>().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gid_as_u32() {
        let md = VolumeMetadata::new(Some(2000), "claim-a", "ns1", "gold");
        assert_eq!(md.gid_as_u32().unwrap(), Some(2000));

        let md = VolumeMetadata::new(None, "claim-a", "ns1", "gold");
        assert_eq!(md.gid_as_u32().unwrap(), None);

        let mut md = VolumeMetadata::new(None, "claim-a", "ns1", "gold");
        md.gid = "not-a-gid".to_string();
        assert!(md.gid_as_u32().is_err());
    }

    #[test]
    fn test_on_disk_key_names_are_stable() {
        let md = VolumeMetadata::new(Some(2000), "claim-a", "ns1", "gold");
        let json = serde_json::to_string(&md).unwrap();
        assert!(json.contains("\"gid\""));
        assert!(json.contains("\"pvcName\""));
        assert!(json.contains("\"pvcNamespace\""));
        assert!(json.contains("\"storageClassName\""));
    }
}
