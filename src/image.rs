//! # Image Lookup
//!
//! Pods reference images by content hash only. Fetching, unpacking and
//! content addressing belong to the image store; the pod layer needs just
//! [`ImageStore::get_image_by_hash`] to learn an image's default app, its
//! mount points and its target OS.
//!
//! [`DirImageStore`] is the on-host implementation: each image lives at
//! `<root>/images/<hash>/manifest` as a JSON image manifest.

use crate::constants::{IMAGES_DIR, MANIFEST_FILE};
use crate::error::{Error, Result};
use crate::pod::App;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Image manifest label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Manifest an image carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Default app; images without one only provide a console.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
}

impl ImageManifest {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

/// A resolved image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Content hash the image is addressed by.
    pub hash: String,
    pub manifest: ImageManifest,
}

impl Image {
    /// Target OS declared by the `os` label.
    pub fn os(&self) -> Option<&str> {
        self.manifest.label("os")
    }

    /// Returns true if the image needs Linux emulation mounts.
    pub fn is_linux(&self) -> bool {
        self.os() == Some("linux")
    }
}

/// Content-addressed image lookup.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Resolves an image by content hash.
    ///
    /// # Errors
    ///
    /// `ImageNotFound` if no image carries that hash.
    async fn get_image_by_hash(&self, hash: &str) -> Result<Image>;
}

/// Image store backed by a directory of unpacked images.
pub struct DirImageStore {
    base_dir: PathBuf,
}

impl DirImageStore {
    /// Creates a store rooted at `<root>/images`.
    pub fn new(root: &Path) -> Self {
        Self::with_path(root.join(IMAGES_DIR))
    }

    /// Creates a store at an explicit directory.
    pub fn with_path(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn manifest_path(&self, hash: &str) -> Result<PathBuf> {
        // Hashes name a single directory; anything path-like is not a hash.
        if hash.is_empty() || hash.contains('/') || hash.starts_with('.') {
            return Err(Error::ImageNotFound(hash.to_string()));
        }
        Ok(self.base_dir.join(hash).join(MANIFEST_FILE))
    }
}

#[async_trait]
impl ImageStore for DirImageStore {
    async fn get_image_by_hash(&self, hash: &str) -> Result<Image> {
        let path = self.manifest_path(hash)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ImageNotFound(hash.to_string()));
            }
            Err(e) => return Err(Error::io(&path, e)),
        };
        let manifest: ImageManifest = serde_json::from_slice(&bytes).map_err(|e| {
            Error::Serialization(format!("image manifest {}: {e}", path.display()))
        })?;
        debug!(image = %hash, name = %manifest.name, "Resolved image");
        Ok(Image {
            hash: hash.to_string(),
            manifest,
        })
    }
}
