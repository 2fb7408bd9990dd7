// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod groups;
pub mod metadata;
pub mod mounts;
pub mod paths;
pub mod probe;
pub mod reclaim;

pub use groups::{FsGroupChanger, GroupChanger};
pub use metadata::MetadataStore;
pub use mounts::{MountEntry, MountError, MountTable};
pub use paths::PathTranslator;
pub use probe::BackendProbe;
pub use reclaim::FsGidReclaimer;
