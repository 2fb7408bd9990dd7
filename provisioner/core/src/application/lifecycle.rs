// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Lifecycle Engine
//!
//! The orchestrating component. For each provisioning request it decides
//! create-vs-reuse-vs-reject, performs directory creation with the correct
//! permission and group ownership, and persists the ownership record when
//! operating in reuse mode. Deletion releases the volume's GID and removes
//! the directory tree after reverse-translating the published remote path.
//!
//! Requests for different claims may run concurrently; the orchestrator is
//! expected to serialize requests that target the same directory name. All
//! filesystem work is blocking and sequential within a request.

use crate::domain::claim::VolumeRequest;
use crate::domain::error::ProvisionError;
use crate::domain::gid::{GidAllocator, GidReclaimer};
use crate::domain::metadata::VolumeMetadata;
use crate::domain::volume::{default_mount_options, ProvisionedVolume};
use crate::infrastructure::groups::GroupChanger;
use crate::infrastructure::metadata::MetadataStore;
use crate::infrastructure::paths::PathTranslator;
use async_trait::async_trait;
use std::fs::Permissions;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// The provision/delete capability pair invoked by the external orchestrator
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create or reattach a tenant volume directory and publish its descriptor
    async fn provision(&self, request: VolumeRequest) -> Result<ProvisionedVolume, ProvisionError>;

    /// Release the volume's GID and remove its directory tree
    async fn delete(&self, volume: ProvisionedVolume) -> Result<(), ProvisionError>;
}

pub struct VolumeLifecycleEngine {
    translator: PathTranslator,
    store: MetadataStore,
    allocator: GidAllocator,
    groups: Arc<dyn GroupChanger>,
}

impl VolumeLifecycleEngine {
    pub fn new(
        translator: PathTranslator,
        reclaimer: Arc<dyn GidReclaimer>,
        groups: Arc<dyn GroupChanger>,
    ) -> Self {
        Self {
            translator,
            store: MetadataStore::new(),
            allocator: GidAllocator::new(reclaimer),
            groups,
        }
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    pub fn allocator(&self) -> &GidAllocator {
        &self.allocator
    }

    fn do_provision(&self, request: &VolumeRequest) -> Result<ProvisionedVolume, ProvisionError> {
        let reuse = request.reuse_volumes()?;
        let directory_name = request.directory_name()?;
        let local_path = self.translator.local_path(&directory_name);

        info!("provisioning volume at {}", local_path.display());

        let existing_gid = if reuse {
            self.stat_existing(&local_path)?
        } else {
            None
        };

        let gid = match existing_gid {
            Some(on_disk_gid) => {
                let gid = self.validate_existing(request, &local_path, on_disk_gid)?;
                info!(
                    "{} was reused since the preexisting volume metadata matches the claim",
                    local_path.display()
                );
                gid
            }
            None => {
                let gid = if request.gid_allocate()? {
                    let (min, max) = request.gid_range()?;
                    Some(
                        self.allocator
                            .allocate_next(&request.storage_class, min, max)?,
                    )
                } else {
                    None
                };

                if let Err(e) = self.create_directory(&local_path, gid) {
                    if let Some(gid) = gid {
                        self.allocator.release(&request.storage_class, gid);
                    }
                    return Err(e);
                }

                // A directory without its sidecar record can never be
                // reattached, so a failed metadata write rolls back the
                // whole creation like a failed chmod or chgrp.
                if reuse {
                    let record = VolumeMetadata::new(
                        gid,
                        &request.claim.name,
                        &request.claim.namespace,
                        &request.storage_class,
                    );
                    if let Err(e) = self.store.write(&local_path, &record) {
                        self.rollback(&local_path);
                        if let Some(gid) = gid {
                            self.allocator.release(&request.storage_class, gid);
                        }
                        return Err(e);
                    }
                }
                gid
            }
        };

        Ok(ProvisionedVolume {
            name: request.volume_name.clone(),
            server: self.translator.server().to_string(),
            path: self.translator.remote_path(&directory_name),
            storage_class: request.storage_class.clone(),
            mount_options: request
                .mount_options
                .clone()
                .unwrap_or_else(default_mount_options),
            gid,
            capacity: request.capacity.clone(),
            access_modes: request.access_modes.clone(),
        })
    }

    /// Stat the target path. `Ok(None)` when absent; `Ok(Some(gid))` with the
    /// directory's on-disk group owner when present and a directory.
    fn stat_existing(&self, path: &Path) -> Result<Option<u32>, ProvisionError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(Some(meta.gid())),
            Ok(_) => Err(ProvisionError::UnexpectedFileType {
                path: path.display().to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                error!("failed to determine if {} already exists: {}", path.display(), e);
                Err(ProvisionError::Io(e))
            }
        }
    }

    /// Validate a preexisting directory against the incoming request.
    ///
    /// The directory is handed back to the claim only when the persisted
    /// ownership record matches the claim identity and storage class, and any
    /// recorded GID matches the directory's actual group owner. Returns the
    /// GID to reuse, without re-allocating it.
    fn validate_existing(
        &self,
        request: &VolumeRequest,
        path: &Path,
        on_disk_gid: u32,
    ) -> Result<Option<u32>, ProvisionError> {
        let metadata =
            self.store
                .read(path)?
                .ok_or_else(|| ProvisionError::MissingMetadata {
                    path: path.display().to_string(),
                })?;

        if metadata.storage_class_name != request.storage_class
            || metadata.pvc_name != request.claim.name
            || metadata.pvc_namespace != request.claim.namespace
        {
            return Err(ProvisionError::OwnershipMismatch {
                path: path.display().to_string(),
                recorded: format!(
                    "claim {}/{} of storage class {}",
                    metadata.pvc_namespace, metadata.pvc_name, metadata.storage_class_name
                ),
                requested: format!(
                    "claim {} of storage class {}",
                    request.claim, request.storage_class
                ),
            });
        }

        let recorded_gid = metadata
            .gid_as_u32()
            .map_err(|_| ProvisionError::Metadata {
                path: path.display().to_string(),
                reason: format!("metadata contains an invalid gid value '{}'", metadata.gid),
            })?;

        match recorded_gid {
            None => Ok(None),
            Some(gid) if gid == on_disk_gid => Ok(Some(gid)),
            Some(_) => Err(ProvisionError::GidInconsistency {
                path: path.display().to_string(),
                on_disk: on_disk_gid,
                recorded: metadata.gid,
            }),
        }
    }

    /// Create the directory with the correct permission bits and group owner.
    ///
    /// Any failure after the directory exists deletes the just-created tree:
    /// a failed provision never leaves a partially configured directory
    /// behind.
    fn create_directory(&self, path: &Path, gid: Option<u32>) -> Result<(), ProvisionError> {
        // World-writable without group isolation; setgid + no world access
        // with it, so files created inside inherit the directory's group.
        let mode = if gid.is_some() { 0o2771 } else { 0o777 };

        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)?;

        // Directory creation is narrowed by the process umask; re-apply the
        // requested bits explicitly.
        if let Err(e) = std::fs::set_permissions(path, Permissions::from_mode(mode)) {
            self.rollback(path);
            return Err(ProvisionError::Io(e));
        }

        if let Some(gid) = gid {
            if let Err(e) = self.groups.change_group(path, gid) {
                error!("failed to set group {} on {}: {}", gid, path.display(), e);
                self.rollback(path);
                return Err(ProvisionError::Io(e));
            }
        }

        Ok(())
    }

    fn rollback(&self, path: &Path) {
        if let Err(e) = std::fs::remove_dir_all(path) {
            error!(
                "failed to roll back partially created volume directory {}: {}",
                path.display(),
                e
            );
        }
    }

    fn do_delete(&self, volume: &ProvisionedVolume) -> Result<(), ProvisionError> {
        if let Some(gid) = volume.gid {
            self.allocator.release(&volume.storage_class, gid);
        }

        let local_path = self
            .translator
            .reverse_translate(&volume.server, &volume.path)?;

        info!("deleting {}", local_path.display());

        match std::fs::remove_dir_all(&local_path) {
            Ok(()) => Ok(()),
            // Already gone; deletion is idempotent from the caller's view.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProvisionError::Io(e)),
        }
    }
}

#[async_trait]
impl Provisioner for VolumeLifecycleEngine {
    async fn provision(&self, request: VolumeRequest) -> Result<ProvisionedVolume, ProvisionError> {
        self.do_provision(&request)
    }

    async fn delete(&self, volume: ProvisionedVolume) -> Result<(), ProvisionError> {
        self.do_delete(&volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::claim::{ClaimRef, PARAM_GID_ALLOCATE, PARAM_GID_MAX, PARAM_GID_MIN, PARAM_REUSE_VOLUMES};
    use crate::infrastructure::metadata::METADATA_FILE;
    use crate::infrastructure::reclaim::FsGidReclaimer;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Records group changes without touching the filesystem
    #[derive(Default)]
    struct RecordingGroupChanger {
        calls: Mutex<Vec<(PathBuf, u32)>>,
    }

    impl GroupChanger for RecordingGroupChanger {
        fn change_group(&self, path: &Path, gid: u32) -> std::io::Result<()> {
            self.calls.lock().push((path.to_path_buf(), gid));
            Ok(())
        }
    }

    struct FailingGroupChanger;

    impl GroupChanger for FailingGroupChanger {
        fn change_group(&self, _path: &Path, _gid: u32) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            ))
        }
    }

    /// Approves the group change but leaves a directory squatting on the
    /// sidecar path, so the metadata write that follows fails
    struct SidecarBlockingGroupChanger;

    impl GroupChanger for SidecarBlockingGroupChanger {
        fn change_group(&self, path: &Path, _gid: u32) -> std::io::Result<()> {
            std::fs::create_dir(path.join(METADATA_FILE))
        }
    }

    fn engine(mount: &Path, groups: Arc<dyn GroupChanger>) -> VolumeLifecycleEngine {
        VolumeLifecycleEngine::new(
            PathTranslator::new("fs.example.com", mount, "fs.example.com:/export"),
            Arc::new(FsGidReclaimer::new(mount)),
            groups,
        )
    }

    fn request() -> VolumeRequest {
        VolumeRequest::new(ClaimRef::new("claim-a", "ns1"), "gold")
            .with_parameter(PARAM_GID_MIN, "2000")
            .with_parameter(PARAM_GID_MAX, "2100")
    }

    fn reuse_request() -> VolumeRequest {
        request().with_parameter(PARAM_REUSE_VOLUMES, "true")
    }

    #[tokio::test]
    async fn test_ephemeral_provision_allocates_gid_and_sets_mode() {
        let mount = TempDir::new().unwrap();
        let groups = Arc::new(RecordingGroupChanger::default());
        let engine = engine(mount.path(), groups.clone());

        let volume = engine.provision(request()).await.unwrap();

        assert_eq!(volume.server, "fs.example.com");
        assert_eq!(volume.gid, Some(2000));
        assert_eq!(volume.mount_options, vec!["vers=4.1".to_string()]);
        assert!(volume.path.starts_with("/export/claim-a-pvc-"));

        let local = mount
            .path()
            .join(volume.path.strip_prefix("/export/").unwrap());
        let mode = std::fs::metadata(&local).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o2771);

        let calls = groups.calls.lock();
        assert_eq!(calls.as_slice(), &[(local.clone(), 2000)]);

        // Ephemeral mode never persists metadata.
        assert!(!local.join(METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn test_provision_without_gid_is_world_writable() {
        let mount = TempDir::new().unwrap();
        let groups = Arc::new(RecordingGroupChanger::default());
        let engine = engine(mount.path(), groups.clone());

        let req = request().with_parameter(PARAM_GID_ALLOCATE, "false");
        let volume = engine.provision(req).await.unwrap();

        assert_eq!(volume.gid, None);
        let local = mount
            .path()
            .join(volume.path.strip_prefix("/export/").unwrap());
        let mode = std::fs::metadata(&local).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o777);
        assert!(groups.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ephemeral_provisions_never_collide() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let a = engine.provision(request()).await.unwrap();
        let b = engine.provision(request()).await.unwrap();
        assert_ne!(a.path, b.path);
        assert_ne!(a.gid, b.gid);
    }

    #[tokio::test]
    async fn test_reuse_mode_persists_metadata() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let volume = engine.provision(reuse_request()).await.unwrap();
        assert_eq!(volume.path, "/export/claim-a-ns1");

        let metadata = MetadataStore::new()
            .read(&mount.path().join("claim-a-ns1"))
            .unwrap()
            .unwrap();
        assert_eq!(metadata.pvc_name, "claim-a");
        assert_eq!(metadata.pvc_namespace, "ns1");
        assert_eq!(metadata.storage_class_name, "gold");
        assert_eq!(metadata.gid, "2000");
    }

    #[tokio::test]
    async fn test_reuse_mode_reattaches_without_recreating() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let req = reuse_request().with_parameter(PARAM_GID_ALLOCATE, "false");
        let first = engine.provision(req.clone()).await.unwrap();

        // A file written between the two calls survives the second one: the
        // directory is reattached, not recreated.
        let local = mount.path().join("claim-a-ns1");
        std::fs::write(local.join("data.txt"), b"tenant data").unwrap();

        let second = engine.provision(req).await.unwrap();
        assert_eq!(first.path, second.path);
        assert!(local.join("data.txt").exists());
    }

    #[tokio::test]
    async fn test_reuse_with_matching_on_disk_gid() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        // A directory left over from a previous process lifetime, with the
        // metadata gid matching the directory's actual group owner.
        let local = mount.path().join("claim-a-ns1");
        std::fs::create_dir(&local).unwrap();
        let on_disk_gid = std::fs::metadata(&local).unwrap().gid();
        MetadataStore::new()
            .write(
                &local,
                &VolumeMetadata::new(Some(on_disk_gid), "claim-a", "ns1", "gold"),
            )
            .unwrap();

        let volume = engine.provision(reuse_request()).await.unwrap();
        assert_eq!(volume.gid, Some(on_disk_gid));
        assert_eq!(volume.path, "/export/claim-a-ns1");
    }

    #[tokio::test]
    async fn test_reuse_gid_inconsistency_is_fatal() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let local = mount.path().join("claim-a-ns1");
        std::fs::create_dir(&local).unwrap();
        let wrong_gid = std::fs::metadata(&local).unwrap().gid() + 1;
        MetadataStore::new()
            .write(
                &local,
                &VolumeMetadata::new(Some(wrong_gid), "claim-a", "ns1", "gold"),
            )
            .unwrap();

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::GidInconsistency { .. }));
    }

    #[tokio::test]
    async fn test_reuse_missing_metadata_is_fatal() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        std::fs::create_dir(mount.path().join("claim-a-ns1")).unwrap();

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingMetadata { .. }));
    }

    #[tokio::test]
    async fn test_reuse_ownership_mismatch_leaves_directory_untouched() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let local = mount.path().join("claim-a-ns1");
        std::fs::create_dir(&local).unwrap();
        MetadataStore::new()
            .write(&local, &VolumeMetadata::new(None, "claim-b", "ns2", "gold"))
            .unwrap();
        std::fs::write(local.join("data.txt"), b"someone else's data").unwrap();

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::OwnershipMismatch { .. }));
        assert!(local.join("data.txt").exists());
    }

    #[tokio::test]
    async fn test_reuse_class_mismatch_is_ownership_mismatch() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let local = mount.path().join("claim-a-ns1");
        std::fs::create_dir(&local).unwrap();
        MetadataStore::new()
            .write(&local, &VolumeMetadata::new(None, "claim-a", "ns1", "silver"))
            .unwrap();

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::OwnershipMismatch { .. }));
    }

    #[tokio::test]
    async fn test_reuse_target_that_is_a_file_is_fatal() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        std::fs::write(mount.path().join("claim-a-ns1"), b"not a directory").unwrap();

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::UnexpectedFileType { .. }));
    }

    #[tokio::test]
    async fn test_failed_group_change_rolls_back_directory_and_gid() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(FailingGroupChanger));

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Io(_)));

        // No orphaned directory, no leaked gid.
        assert!(!mount.path().join("claim-a-ns1").exists());
        assert!(!engine.allocator().is_allocated("gold", 2000));
    }

    #[tokio::test]
    async fn test_failed_metadata_write_rolls_back_directory_and_gid() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(SidecarBlockingGroupChanger));

        let err = engine.provision(reuse_request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Io(_)));

        // No orphaned directory that every retry would reject as
        // MissingMetadata, and no leaked gid.
        assert!(!mount.path().join("claim-a-ns1").exists());
        assert!(!engine.allocator().is_allocated("gold", 2000));
    }

    #[tokio::test]
    async fn test_delete_removes_directory_and_releases_gid() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let volume = engine.provision(request()).await.unwrap();
        let gid = volume.gid.unwrap();
        let local = mount
            .path()
            .join(volume.path.strip_prefix("/export/").unwrap());
        assert!(local.exists());
        assert!(engine.allocator().is_allocated("gold", gid));

        engine.delete(volume).await.unwrap();
        assert!(!local.exists());
        assert!(!engine.allocator().is_allocated("gold", gid));

        // The released gid is only reissued after the release, never before:
        // the next provision picks it up again.
        let next = engine.provision(request()).await.unwrap();
        assert_eq!(next.gid, Some(gid));
    }

    #[tokio::test]
    async fn test_gid_is_not_reused_while_volume_lives() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let first = engine.provision(request()).await.unwrap();
        let second = engine.provision(request()).await.unwrap();
        assert_ne!(first.gid, second.gid);
    }

    #[tokio::test]
    async fn test_delete_rejects_foreign_server() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let mut volume = engine.provision(reuse_request()).await.unwrap();
        volume.server = "other.example.com".to_string();

        let err = engine.delete(volume).await.unwrap_err();
        assert!(matches!(err, ProvisionError::PathMismatch(_)));
        assert!(mount.path().join("claim-a-ns1").exists());
    }

    #[tokio::test]
    async fn test_delete_rejects_path_outside_export() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let mut volume = engine.provision(reuse_request()).await.unwrap();
        volume.path = "/elsewhere/claim-a-ns1".to_string();

        let err = engine.delete(volume).await.unwrap_err();
        assert!(matches!(err, ProvisionError::PathMismatch(_)));
    }

    #[tokio::test]
    async fn test_delete_of_missing_directory_is_idempotent() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let volume = engine.provision(reuse_request()).await.unwrap();
        engine.delete(volume.clone()).await.unwrap();
        engine.delete(volume).await.unwrap();
    }

    #[tokio::test]
    async fn test_reclaim_primes_allocation_from_existing_directories() {
        let mount = TempDir::new().unwrap();

        // A directory surviving from a previous process lifetime already
        // holds gid 2000 for this class.
        let survivor = mount.path().join("claim-z-ns9");
        std::fs::create_dir(&survivor).unwrap();
        MetadataStore::new()
            .write(
                &survivor,
                &VolumeMetadata::new(Some(2000), "claim-z", "ns9", "gold"),
            )
            .unwrap();

        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));
        let volume = engine.provision(request()).await.unwrap();
        assert_eq!(volume.gid, Some(2001));
    }

    #[tokio::test]
    async fn test_malformed_parameter_is_rejected() {
        let mount = TempDir::new().unwrap();
        let engine = engine(mount.path(), Arc::new(RecordingGroupChanger::default()));

        let req = request().with_parameter(PARAM_REUSE_VOLUMES, "maybe");
        let err = engine.provision(req).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidParameter { .. }));
    }
}
