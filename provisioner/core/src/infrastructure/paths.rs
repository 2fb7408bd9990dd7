// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local/remote path translation
//!
//! Maps between a directory name, its local path under the mount point, and
//! its remote path under the backend's exported root. The exported root is
//! derived from the raw mount source string (`<server>:<exported-root>`) by
//! stripping the server prefix. The transform is a bijection over the subtree
//! rooted at the mount, which is what makes `reverse_translate` safe to run
//! on deletion requests.

use crate::domain::error::ProvisionError;
use std::path::{Path, PathBuf};

pub struct PathTranslator {
    server: String,
    mount_point: PathBuf,
    source: String,
}

impl PathTranslator {
    /// # Arguments
    /// * `server` - DNS name of the network filesystem backend
    /// * `mount_point` - where the backend is mounted locally
    /// * `source` - the raw mount source string (e.g. `fs.example.com:/export`)
    pub fn new(
        server: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            mount_point: mount_point.into(),
            source: source.into(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// The backend's exported root, normalized (no trailing slash, leading
    /// slash guaranteed)
    pub fn exported_root(&self) -> String {
        let prefix = format!("{}:", self.server);
        let root = self
            .source
            .strip_prefix(&prefix)
            .unwrap_or(self.source.as_str());
        let trimmed = root.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }

    /// Local path of a tenant directory
    pub fn local_path(&self, directory_name: &str) -> PathBuf {
        self.mount_point.join(directory_name)
    }

    /// Remote path of a tenant directory
    pub fn remote_path(&self, directory_name: &str) -> String {
        let root = self.exported_root();
        if root == "/" {
            format!("/{directory_name}")
        } else {
            format!("{root}/{directory_name}")
        }
    }

    /// Local path corresponding to a remote path presented at deletion time.
    ///
    /// Rejects with `PathMismatch` when the declared server is not this
    /// instance's server, or when the remote path does not lie strictly below
    /// the exported root. A deletion request for a path this instance does
    /// not own must never touch the filesystem, and the exported root itself
    /// is never a deletable volume.
    pub fn reverse_translate(
        &self,
        server: &str,
        remote_path: &str,
    ) -> Result<PathBuf, ProvisionError> {
        if server != self.server {
            return Err(ProvisionError::PathMismatch(format!(
                "volume server {} does not match the server {} this provisioner creates volumes on",
                server, self.server
            )));
        }

        let root = self.exported_root();
        let subpath = match remote_path.strip_prefix(root.as_str()) {
            // The prefix match must end on a path-component boundary;
            // "/exported" is not a child of "/export".
            Some(rest) if rest.starts_with('/') || root == "/" => rest.trim_start_matches('/'),
            _ => {
                return Err(ProvisionError::PathMismatch(format!(
                    "volume path {} is not a child of the exported root {} mounted at {}",
                    remote_path,
                    root,
                    self.mount_point.display()
                )));
            }
        };

        // An empty subpath would map to the mount root itself; deleting it
        // would take every tenant directory with it.
        if subpath.is_empty() {
            return Err(ProvisionError::PathMismatch(format!(
                "volume path {} is the exported root itself, not a directory under it",
                remote_path
            )));
        }

        Ok(self.mount_point.join(subpath))
    }
}
