// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Group-ownership changes
//!
//! Small capability trait so the lifecycle engine's rollback behavior can be
//! exercised in tests without root privileges.

use std::path::Path;

pub trait GroupChanger: Send + Sync {
    /// Set the group owner of `path` to `gid`
    fn change_group(&self, path: &Path, gid: u32) -> std::io::Result<()>;
}

/// Production implementation backed by chown(2) with the owner left unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct FsGroupChanger;

impl GroupChanger for FsGroupChanger {
    fn change_group(&self, path: &Path, gid: u32) -> std::io::Result<()> {
        std::os::unix::fs::chown(path, None, Some(gid))
    }
}
