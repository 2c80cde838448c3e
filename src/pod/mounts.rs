//! # Mount Resolution
//!
//! Turns the pod's volume bindings into a mount table for jail(8).
//!
//! Resolution runs in two phases. [`resolve_mounts`] is pure: it matches
//! every binding to a volume and an image mount point and checks that each
//! declared mount point is covered. Only when that succeeds does
//! [`Pod::prepare_jail`] touch the filesystem:
//!
//! ```text
//! rootfs/etc/resolv.conf   copied from the host; rootfs/etc must exist
//! volumes/<index>/         created for empty volumes, ownership copied
//!                          from the directory it is mounted over
//! fstab                    written when the table is non-empty
//! jail.conf                written last, mount.fstab pointing at fstab
//! ```
//!
//! Entries keep a fixed order: Linux compatibility filesystems first, then
//! bindings in manifest order.

use super::{Pod, PodManifest, RuntimeApp, VolumeKind, write_file};
use crate::constants::{
    EMPTY_VOLUME_MODE, FSTAB_ANNOTATION, FSTAB_FILE, FSTAB_MODE, JAIL_CONF_FILE, JAIL_CONF_MODE,
    LINUX_COMPAT_MOUNTS, POD_RESOLV_CONF, RESOLV_CONF_MODE, ROOTFS_DIR, VOLUMES_DIR,
};
use crate::error::{Error, Result};
use crate::image::Image;
use std::collections::HashSet;
use std::fmt;
use std::fs::{DirBuilder, Permissions};
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One fstab(5) line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub fstype: String,
    pub read_only: bool,
}

impl fmt::Display for FstabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} 0 0",
            self.source.display(),
            self.target.display(),
            self.fstype,
            if self.read_only { "ro" } else { "rw" }
        )
    }
}

/// Empty volume directory to allocate before mounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyVolume {
    /// Backing directory, `volumes/<index>`.
    pub dir: PathBuf,
    /// Mount target inside the rootfs; its ownership is copied if it exists.
    pub target: PathBuf,
}

/// Resolved mounts of a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountTable {
    pub entries: Vec<FstabEntry>,
    pub empty_volumes: Vec<EmptyVolume>,
}

impl MountTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Resolves an app's mounts without touching the filesystem.
///
/// # Errors
///
/// - `VolumeNotFound` if a binding names an undeclared volume
/// - `MountPointNotFound` if a binding names a mount point the image lacks
/// - `UnfulfilledMountPoints` if image mount points are left unbound, listed
///   in image declaration order
pub fn resolve_mounts(
    pod_dir: &Path,
    manifest: &PodManifest,
    app: &RuntimeApp,
    image: &Image,
) -> Result<MountTable> {
    let rootfs = pod_dir.join(ROOTFS_DIR);
    let mut table = MountTable::default();

    if image.is_linux() {
        for (source, target, fstype) in LINUX_COMPAT_MOUNTS {
            table.entries.push(FstabEntry {
                source: PathBuf::from(source),
                target: rootfs.join(target),
                fstype: fstype.to_string(),
                read_only: false,
            });
        }
    }

    let Some(image_app) = image.manifest.app.as_ref() else {
        return Ok(table);
    };

    let mut fulfilled = HashSet::new();
    for mount in &app.mounts {
        let (index, volume) = manifest
            .volume(&mount.volume)
            .ok_or_else(|| Error::VolumeNotFound(mount.volume.clone()))?;
        let mount_point = image_app
            .mount_point(&mount.mount_point)
            .ok_or_else(|| Error::MountPointNotFound(mount.mount_point.clone()))?;

        let target = rootfs.join(mount_point.path.trim_start_matches('/'));
        let source = match &volume.kind {
            VolumeKind::Empty => {
                let dir = pod_dir.join(VOLUMES_DIR).join(index.to_string());
                table.empty_volumes.push(EmptyVolume {
                    dir: dir.clone(),
                    target: target.clone(),
                });
                dir
            }
            VolumeKind::Host { source } => source.clone(),
        };

        fulfilled.insert(mount_point.name.as_str());
        table.entries.push(FstabEntry {
            source,
            target,
            fstype: "nullfs".to_string(),
            read_only: volume.read_only == Some(true) || mount_point.read_only,
        });
    }

    let missing: Vec<String> = image_app
        .mount_points
        .iter()
        .filter(|mp| !fulfilled.contains(mp.name.as_str()))
        .map(|mp| mp.name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(Error::UnfulfilledMountPoints {
            image: image.manifest.name.clone(),
            missing,
        });
    }

    Ok(table)
}

impl Pod {
    /// Prepares the pod's on-disk state for jail creation.
    ///
    /// Resolves the image and the mount table, then writes resolv.conf,
    /// empty volume directories, fstab and jail.conf. Sets the
    /// `jetpack/jail.conf/mount.fstab` annotation when mounts exist.
    pub async fn prepare_jail(&mut self) -> Result<()> {
        let app = match self.manifest.apps.as_slice() {
            [app] => app.clone(),
            apps => {
                return Err(Error::InvalidManifest(format!(
                    "expected exactly one app, found {}",
                    apps.len()
                )));
            }
        };

        // Fails on a missing ip-address before anything is written.
        self.jail_conf()?;

        let image = self.host.images().get_image_by_hash(&app.image.id).await?;
        let table = resolve_mounts(&self.dir(), &self.manifest, &app, &image)?;

        self.copy_resolv_conf()?;
        for volume in &table.empty_volumes {
            prepare_empty_volume(volume)?;
        }

        if !table.is_empty() {
            let fstab = self.path([FSTAB_FILE]);
            write_file(&fstab, table.to_string().as_bytes(), FSTAB_MODE)?;
            self.set_annotation(FSTAB_ANNOTATION, fstab.to_string_lossy());
            debug!(pod = %self.uuid, entries = table.entries.len(), "Wrote fstab");
        }

        let conf = self.jail_conf()?;
        write_file(
            &self.path([JAIL_CONF_FILE]),
            conf.to_string().as_bytes(),
            JAIL_CONF_MODE,
        )?;
        info!(pod = %self.uuid, jail = %conf.name(), "Prepared jail");
        Ok(())
    }

    fn copy_resolv_conf(&self) -> Result<()> {
        let source = self.host.resolv_conf();
        let content = std::fs::read(source).map_err(|e| Error::io(source, e))?;

        // The image provides rootfs/etc; a missing one is not created here.
        write_file(
            &self.path([ROOTFS_DIR, POD_RESOLV_CONF]),
            &content,
            RESOLV_CONF_MODE,
        )
    }
}

/// Creates an empty volume directory, taking mode and ownership from the
/// directory it will be mounted over.
fn prepare_empty_volume(volume: &EmptyVolume) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(EMPTY_VOLUME_MODE)
        .create(&volume.dir)
        .map_err(|e| Error::io(&volume.dir, e))?;

    let meta = match std::fs::metadata(&volume.target) {
        Ok(meta) if meta.is_dir() => meta,
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(&volume.target, e)),
    };

    std::fs::set_permissions(&volume.dir, Permissions::from_mode(meta.mode() & 0o7777))
        .map_err(|e| Error::io(&volume.dir, e))?;
    std::os::unix::fs::chown(&volume.dir, Some(meta.uid()), Some(meta.gid()))
        .map_err(|e| Error::io(&volume.dir, e))?;
    debug!(
        volume = %volume.dir.display(),
        mode = %format!("{:o}", meta.mode() & 0o7777),
        uid = meta.uid(),
        gid = meta.gid(),
        "Copied ownership to empty volume"
    );
    Ok(())
}
