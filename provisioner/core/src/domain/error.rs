// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning error taxonomy
//!
//! Every per-request failure surfaces as one of these variants; none of them
//! is retried internally. Retry policy belongs to the external orchestrator.

use crate::domain::gid::GidError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required startup parameter is absent. Fatal: the process exits.
    #[error("required configuration value {0} is not set")]
    ConfigurationMissing(String),

    /// The target path exists but is not a directory.
    #[error("{path} already exists but is not a directory")]
    UnexpectedFileType { path: String },

    /// A reuse-mode directory exists without a sidecar metadata file. An
    /// unmanaged directory is never silently adopted.
    #[error("{path} already exists but has no volume metadata")]
    MissingMetadata { path: String },

    /// The existing directory's metadata names a different claim or storage
    /// class than the incoming request.
    #[error("{path} already exists but was created for {recorded}, not for the requested {requested}")]
    OwnershipMismatch {
        path: String,
        recorded: String,
        requested: String,
    },

    /// The metadata's recorded GID does not match the directory's actual
    /// on-disk group owner. A consistency violation, never auto-repaired.
    #[error("{path} has on-disk group id {on_disk} but its volume metadata records gid '{recorded}'")]
    GidInconsistency {
        path: String,
        on_disk: u32,
        recorded: String,
    },

    /// A deletion request presented a remote path this instance does not own.
    #[error("path mismatch: {0}")]
    PathMismatch(String),

    /// A recognized request parameter carried a malformed value.
    #[error("invalid value '{value}' for parameter {key}: {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: String,
    },

    #[error("gid allocation failed: {0}")]
    Gid(#[from] GidError),

    /// Sidecar metadata could not be serialized or parsed.
    #[error("volume metadata error for {path}: {reason}")]
    Metadata { path: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// True for failures caused by the request contents or the state of the
    /// target directory, as opposed to environmental IO failures.
    pub fn is_request_fault(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedFileType { .. }
                | Self::MissingMetadata { .. }
                | Self::OwnershipMismatch { .. }
                | Self::GidInconsistency { .. }
                | Self::PathMismatch(_)
                | Self::InvalidParameter { .. }
                | Self::Gid(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_fault_classification() {
        let err = ProvisionError::PathMismatch("other server".to_string());
        assert!(err.is_request_fault());

        let err = ProvisionError::Io(std::io::Error::other("disk gone"));
        assert!(!err.is_request_fault());
    }

    #[test]
    fn test_error_messages_name_the_path() {
        let err = ProvisionError::MissingMetadata {
            path: "/mnt/efs/claim-a-ns1".to_string(),
        };
        assert!(err.to_string().contains("/mnt/efs/claim-a-ns1"));
    }
}
