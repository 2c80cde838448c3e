//! Manifest persistence.
//!
//! The manifest is stored as JSON at `<pod>/manifest`, mode 0400. Loading
//! or saving seals the pod.

use super::{Pod, write_file};
use crate::constants::{MANIFEST_FILE, MANIFEST_MODE, POD_DIR_MODE};
use crate::error::{Error, Result};
use crate::pod::PodManifest;
use std::os::unix::fs::DirBuilderExt;
use tracing::debug;

impl Pod {
    /// Whether the pod's manifest exists on disk.
    pub fn exists(&self) -> Result<bool> {
        let path = self.path([MANIFEST_FILE]);
        path.try_exists().map_err(|e| Error::io(&path, e))
    }

    /// Reads the manifest from disk and seals the pod.
    ///
    /// # Errors
    ///
    /// - `Fatal` if the pod is already sealed
    /// - `PodNotFound` if the manifest is missing
    /// - `Serialization` if it is not a pod manifest
    /// - `InvalidManifest` if it describes an unsupported pod
    pub fn load(&mut self) -> Result<()> {
        if self.sealed {
            return Err(Error::Fatal(format!(
                "pod {} is already sealed, refusing to reload",
                self.uuid
            )));
        }
        if !self.exists()? {
            return Err(Error::PodNotFound(self.uuid));
        }

        let path = self.path([MANIFEST_FILE]);
        let content = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let manifest: PodManifest = serde_json::from_slice(&content).map_err(|e| {
            Error::Serialization(format!("pod manifest {}: {e}", path.display()))
        })?;
        manifest.validate()?;

        self.manifest = manifest;
        self.sealed = true;
        debug!(pod = %self.uuid, "Loaded pod manifest");
        Ok(())
    }

    /// Writes the manifest to disk and seals the pod.
    ///
    /// Creates the pod directory if needed.
    pub fn save(&mut self) -> Result<()> {
        let dir = self.dir();
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(POD_DIR_MODE)
            .create(&dir)
            .map_err(|e| Error::io(&dir, e))?;

        let json = serde_json::to_vec(&self.manifest)
            .map_err(|e| Error::Serialization(format!("pod manifest: {e}")))?;
        write_file(&self.path([MANIFEST_FILE]), &json, MANIFEST_MODE)?;

        self.sealed = true;
        debug!(pod = %self.uuid, "Saved pod manifest");
        Ok(())
    }
}
