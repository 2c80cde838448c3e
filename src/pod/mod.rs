//! # Pod Lifecycle
//!
//! A pod is one application in one jail. This module owns its whole life:
//!
//! ```text
//!  manifest ──▶ Manifest Store ──┬──▶ Mount Resolver ──▶ fstab, volumes/
//!                                │          │ (mount.fstab annotation)
//!                                │          ▼
//!                                └──▶ Jail Conf Builder ──▶ jail.conf
//!                                                              │
//!                                         jail(8) -c / -r ◀────┘
//!                                              │
//!  Lifecycle Controller ◀── Status Oracle ◀── jls(8)
//!        │
//!        └──▶ App Launcher ──▶ stage2
//! ```
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  stage2   ┌─────────┐   kill    ┌─────────┐
//!   │ Stopped │ ────────▶ │ Running │ ────────▶ │  Dying  │
//!   └─────────┘           └─────────┘           └────┬────┘
//!        ▲                                           │
//!        └───────────────────────────────────────────┘
//!                      OS reaps the jail
//! ```
//!
//! Status is never stored; every read derives it from the live jail.
//!
//! ## Sealing
//!
//! Once a manifest has been loaded or saved the pod is sealed: the manifest
//! is the single source of truth and can no longer be replaced. Annotations
//! stay writable; the mount resolver uses them to hand the fstab path to the
//! jail configuration builder.
//!
//! ## Concurrency
//!
//! Operations on one pod must be serialized by the caller (`&mut self`
//! enforces it within a process). Different pods are independent.

mod jail_conf;
mod launcher;
mod lifecycle;
mod manifest;
mod mounts;
mod state;
mod store;

use crate::constants::{PODS_DIR, PROP_JAIL_NAME_PREFIX};
use crate::error::{Error, Result};
use crate::host::Host;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub use jail_conf::JailConf;
pub use launcher::{console_app, stage2_args};
pub use manifest::{
    AC_VERSION, Annotation, Annotations, App, EnvVar, ImageRef, Isolator, Mount, MountPoint,
    POD_MANIFEST_KIND, PodManifest, RuntimeApp, Volume, VolumeKind,
};
pub use mounts::{EmptyVolume, FstabEntry, MountTable, resolve_mounts};
pub use state::PodStatus;

/// A single-application pod.
pub struct Pod {
    uuid: Uuid,
    host: Arc<Host>,
    manifest: PodManifest,
    sealed: bool,
}

impl Pod {
    /// Creates a transient pod with an empty manifest, ready for [`Pod::load`].
    pub fn new(host: Arc<Host>, uuid: Uuid) -> Self {
        Self::create(host, uuid, PodManifest::default())
    }

    /// Creates a transient pod around a new manifest, ready for [`Pod::save`].
    pub fn create(host: Arc<Host>, uuid: Uuid, manifest: PodManifest) -> Self {
        Self {
            uuid,
            host,
            manifest,
            sealed: false,
        }
    }

    /// Opens an existing pod.
    ///
    /// # Errors
    ///
    /// `PodNotFound` if it has no manifest, `InvalidManifest` if the
    /// manifest is unsupported.
    pub fn open(host: Arc<Host>, uuid: Uuid) -> Result<Self> {
        let mut pod = Self::new(host, uuid);
        pod.load()?;
        Ok(pod)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn manifest(&self) -> &PodManifest {
        &self.manifest
    }

    /// Mutable manifest access, only before the pod is sealed.
    pub fn manifest_mut(&mut self) -> Result<&mut PodManifest> {
        if self.sealed {
            return Err(Error::Fatal(format!(
                "pod {} is sealed, its manifest cannot change",
                self.uuid
            )));
        }
        Ok(&mut self.manifest)
    }

    /// Sets an annotation. Allowed on sealed pods.
    pub fn set_annotation(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.manifest.annotations.set(name, value);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// The pod's directory, `<root>/pods/<uuid>`.
    pub fn dir(&self) -> PathBuf {
        self.host.path([PODS_DIR, self.uuid.to_string().as_str()])
    }

    /// Resolves a path inside the pod's directory.
    pub fn path<I, P>(&self, elems: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut path = self.dir();
        for elem in elems {
            path.push(elem);
        }
        path
    }

    /// Jail name: host name prefix followed by the pod UUID.
    pub fn jail_name(&self) -> Result<String> {
        let prefix = self
            .host
            .properties()
            .must_get_string(PROP_JAIL_NAME_PREFIX)?;
        Ok(format!("{prefix}{}", self.uuid))
    }
}

impl std::fmt::Debug for Pod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pod")
            .field("uuid", &self.uuid)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}

/// Writes a file atomically with the given mode.
///
/// The content lands in a uniquely named temp file first and is renamed
/// over the target, so readers never see a partial file and read-only
/// targets can be regenerated.
pub(crate) fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp.{}", Uuid::now_v7()));

    let written = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(&temp_path)
        .and_then(|mut f| {
            f.write_all(contents)?;
            f.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp_path, path));

    written.map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        Error::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_replaces_read_only_target() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jail.conf");

        write_file(&path, b"first", 0o400).unwrap();
        write_file(&path, b"second", 0o400).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
