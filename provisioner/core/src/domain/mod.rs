// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod claim;
pub mod error;
pub mod gid;
pub mod metadata;
pub mod volume;

pub use claim::{ClaimRef, VolumeRequest};
pub use error::ProvisionError;
pub use gid::{GidAllocator, GidError, GidReclaimer, GidTable};
pub use metadata::VolumeMetadata;
pub use volume::{ProvisionedVolume, VOLUME_GID_ANNOTATION};
