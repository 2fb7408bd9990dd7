// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount-table discovery
//!
//! Locates the pre-mounted network filesystem by scanning a mounts table in
//! `/proc/mounts` format for the entry whose source starts with the
//! configured server address. The table path is injectable so tests can run
//! against fixture files.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("failed to read mount table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no mount entry found for {server} among entries {entries}")]
    NotFound { server: String, entries: String },
}

/// One mount-table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Raw mount source (e.g. `fs.example.com:/export`)
    pub source: String,

    /// Local mount point
    pub mount_point: PathBuf,

    /// Filesystem type
    pub fs_type: String,
}

#[derive(Debug, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    /// Parse a mounts table from a file (normally `/proc/mounts`)
    pub fn load(path: &Path) -> Result<Self, MountError> {
        let contents = std::fs::read_to_string(path).map_err(|e| MountError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::parse(&contents))
    }

    /// Parse `/proc/mounts`-format content
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let source = fields.next()?;
                let mount_point = fields.next()?;
                let fs_type = fields.next().unwrap_or_default();
                Some(MountEntry {
                    source: unescape_mount_field(source),
                    mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                    fs_type: fs_type.to_string(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// The entry whose source starts with the given server address
    pub fn find_source_prefix(&self, server: &str) -> Result<&MountEntry, MountError> {
        self.entries
            .iter()
            .find(|e| e.source.starts_with(server))
            .ok_or_else(|| MountError::NotFound {
                server: server.to_string(),
                entries: self
                    .entries
                    .iter()
                    .map(|e| format!("{}:{}", e.source, e.mount_point.display()))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Undo the octal escapes the kernel applies to whitespace in mount fields
fn unescape_mount_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let digits: String = chars.clone().take(3).collect();
        if digits.len() == 3 {
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
fs.example.com:/export /mnt/efs nfs4 rw,relatime,vers=4.1 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
";

    #[test]
    fn test_parse_and_find() {
        let table = MountTable::parse(SAMPLE);
        assert_eq!(table.entries().len(), 4);

        let entry = table.find_source_prefix("fs.example.com").unwrap();
        assert_eq!(entry.source, "fs.example.com:/export");
        assert_eq!(entry.mount_point, PathBuf::from("/mnt/efs"));
        assert_eq!(entry.fs_type, "nfs4");
    }

    #[test]
    fn test_not_found_lists_entries() {
        let table = MountTable::parse(SAMPLE);
        let err = table.find_source_prefix("other.example.com").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("other.example.com"));
        assert!(message.contains("/dev/sda1:/"));
    }

    #[test]
    fn test_unescapes_whitespace_in_fields() {
        let table = MountTable::parse("fs.example.com:/export /mnt/efs\\040share nfs4 rw 0 0\n");
        assert_eq!(
            table.entries()[0].mount_point,
            PathBuf::from("/mnt/efs share")
        );
    }

    #[test]
    fn test_short_lines_are_skipped() {
        let table = MountTable::parse("garbage\n\nfs.example.com:/export /mnt/efs nfs4 rw 0 0\n");
        assert_eq!(table.entries().len(), 1);
    }
}
