// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Published volume descriptor
//!
//! The engine's output for a successful provision: everything a downstream
//! consumer needs to mount the directory, plus the GID annotation when group
//! isolation is in effect. The descriptor is also the input to deletion.

use serde::{Deserialize, Serialize};

/// Annotation key under which the allocated GID is published
pub const VOLUME_GID_ANNOTATION: &str = "pv.beta.kubernetes.io/gid";

/// Default NFS mount options when the request does not override them
pub fn default_mount_options() -> Vec<String> {
    vec!["vers=4.1".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedVolume {
    /// Volume identifier, unique per provisioning event
    pub name: String,

    /// Address of the network filesystem backend
    pub server: String,

    /// Remote path rooted at the backend's exported root
    pub path: String,

    /// Storage class the volume was provisioned under. Deletion releases the
    /// GID into this class's allocation table.
    pub storage_class: String,

    #[serde(default = "default_mount_options")]
    pub mount_options: Vec<String>,

    /// Allocated GID, when group isolation is in effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,

    /// Capacity, passed through from the request untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,

    /// Access modes, passed through from the request untouched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
}

impl ProvisionedVolume {
    /// The GID annotation pair, when a GID was allocated
    pub fn gid_annotation(&self) -> Option<(&'static str, String)> {
        self.gid.map(|gid| (VOLUME_GID_ANNOTATION, gid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> ProvisionedVolume {
        ProvisionedVolume {
            name: "pvc-0000".to_string(),
            server: "fs.example.com".to_string(),
            path: "/export/claim-a-ns1".to_string(),
            storage_class: "gold".to_string(),
            mount_options: default_mount_options(),
            gid: Some(2000),
            capacity: None,
            access_modes: Vec::new(),
        }
    }

    #[test]
    fn test_gid_annotation() {
        let (key, value) = volume().gid_annotation().unwrap();
        assert_eq!(key, VOLUME_GID_ANNOTATION);
        assert_eq!(value, "2000");

        let mut no_gid = volume();
        no_gid.gid = None;
        assert!(no_gid.gid_annotation().is_none());
    }

    #[test]
    fn test_descriptor_round_trips_with_stable_keys() {
        let json = serde_json::to_string(&volume()).unwrap();
        assert!(json.contains("\"storageClass\""));
        assert!(json.contains("\"mountOptions\""));
        let back: ProvisionedVolume = serde_json::from_str(&json).unwrap();
        assert_eq!(back, volume());
    }

    #[test]
    fn test_missing_mount_options_fall_back_to_default() {
        let back: ProvisionedVolume = serde_json::from_str(
            r#"{"name":"pvc-1","server":"fs.example.com","path":"/export/d","storageClass":"gold"}"#,
        )
        .unwrap();
        assert_eq!(back.mount_options, vec!["vers=4.1".to_string()]);
        assert!(back.gid.is_none());
    }
}
