// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Claim identity and provisioning request
//!
//! A `VolumeRequest` carries the claim identity, the storage class, and the
//! class's free-form string parameters. The recognized parameters mirror the
//! storage-class contract:
//!
//! - `reuseVolumes`: boolean; selects deterministic directory naming so the
//!   same claim reattaches to the same directory across its lifetime.
//! - `volumePrefix`: optional prefix for reuse-mode directory names.
//! - `gidAllocate`: boolean (default true); whether to allocate a GID.
//! - `gidMin` / `gidMax`: bounds of the class's GID allocation range.

use crate::domain::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const PARAM_REUSE_VOLUMES: &str = "reuseVolumes";
pub const PARAM_VOLUME_PREFIX: &str = "volumePrefix";
pub const PARAM_GID_ALLOCATE: &str = "gidAllocate";
pub const PARAM_GID_MIN: &str = "gidMin";
pub const PARAM_GID_MAX: &str = "gidMax";

/// Default GID allocation range when the class does not bound it.
pub const DEFAULT_GID_MIN: u32 = 2000;
pub const DEFAULT_GID_MAX: u32 = 2147483647;

/// Identity of the claim a volume is provisioned for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    /// Claim name
    pub name: String,

    /// Claim namespace
    pub namespace: String,
}

impl ClaimRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ClaimRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A single provisioning request, as handed over by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeRequest {
    /// Unique volume identifier for this provisioning event. Generated when
    /// the orchestrator does not supply one.
    #[serde(default = "generate_volume_name")]
    pub volume_name: String,

    /// The claim this volume is provisioned for
    pub claim: ClaimRef,

    /// Storage class the claim was bound to
    pub storage_class: String,

    /// Free-form storage-class parameters
    #[serde(default)]
    pub parameters: HashMap<String, String>,

    /// Mount options for the published descriptor; `None` keeps the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_options: Option<Vec<String>>,

    /// Requested capacity, passed through to the descriptor untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,

    /// Requested access modes, passed through to the descriptor untouched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
}

fn generate_volume_name() -> String {
    format!("pvc-{}", Uuid::new_v4())
}

impl VolumeRequest {
    pub fn new(claim: ClaimRef, storage_class: impl Into<String>) -> Self {
        Self {
            volume_name: generate_volume_name(),
            claim,
            storage_class: storage_class.into(),
            parameters: HashMap::new(),
            mount_options: None,
            capacity: None,
            access_modes: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    fn bool_parameter(&self, key: &str, default: bool) -> Result<bool, ProvisionError> {
        match self.lookup(key) {
            None => Ok(default),
            Some(value) => value
                .parse::<bool>()
                .map_err(|e| ProvisionError::InvalidParameter {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    fn gid_parameter(&self, key: &str, default: u32) -> Result<u32, ProvisionError> {
        match self.lookup(key) {
            None => Ok(default),
            Some(value) => value
                .parse::<u32>()
                .map_err(|e| ProvisionError::InvalidParameter {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Case-insensitive parameter lookup
    fn lookup(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this request runs in reuse mode
    pub fn reuse_volumes(&self) -> Result<bool, ProvisionError> {
        self.bool_parameter(PARAM_REUSE_VOLUMES, false)
    }

    /// Whether a GID should be allocated for a freshly created directory
    pub fn gid_allocate(&self) -> Result<bool, ProvisionError> {
        self.bool_parameter(PARAM_GID_ALLOCATE, true)
    }

    /// The class's GID allocation range, `(min, max)` inclusive
    pub fn gid_range(&self) -> Result<(u32, u32), ProvisionError> {
        let min = self.gid_parameter(PARAM_GID_MIN, DEFAULT_GID_MIN)?;
        let max = self.gid_parameter(PARAM_GID_MAX, DEFAULT_GID_MAX)?;
        Ok((min, max))
    }

    /// Optional directory-name prefix for reuse mode
    pub fn volume_prefix(&self) -> Option<&str> {
        self.lookup(PARAM_VOLUME_PREFIX).filter(|p| !p.is_empty())
    }

    /// Name of the directory to create for this request.
    ///
    /// Reuse mode derives a deterministic name from the claim identity so the
    /// same claim always maps to the same directory. Ephemeral mode appends
    /// the unique volume identifier instead, guaranteeing no collision and no
    /// reattachment.
    pub fn directory_name(&self) -> Result<String, ProvisionError> {
        if self.reuse_volumes()? {
            let prefix = self
                .volume_prefix()
                .map(|p| format!("{p}-"))
                .unwrap_or_default();
            Ok(format!("{}{}-{}", prefix, self.claim.name, self.claim.namespace))
        } else {
            Ok(format!("{}-{}", self.claim.name, self.volume_name))
        }
    }
}
