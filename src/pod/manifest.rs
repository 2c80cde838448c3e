//! Pod manifest schema.
//!
//! JSON shape follows the App Container pod manifest:
//!
//! ```json
//! {
//!   "acKind": "PodManifest",
//!   "acVersion": "0.5.1",
//!   "apps": [{
//!     "name": "web",
//!     "image": { "id": "sha512-..." },
//!     "mounts": [{ "volume": "data", "mountPoint": "data" }]
//!   }],
//!   "volumes": [{ "name": "data", "kind": "empty" }],
//!   "annotations": [{ "name": "ip-address", "value": "10.1.0.2" }]
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Manifest kind written by this runtime.
pub const POD_MANIFEST_KIND: &str = "PodManifest";

/// Schema version written by this runtime.
pub const AC_VERSION: &str = "0.5.1";

// =============================================================================
// Pod Manifest
// =============================================================================

/// Declarative description of a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodManifest {
    #[serde(default = "default_kind")]
    pub ac_kind: String,
    #[serde(default = "default_version")]
    pub ac_version: String,
    pub apps: Vec<RuntimeApp>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub isolators: Vec<Isolator>,
    #[serde(default)]
    pub annotations: Annotations,
}

fn default_kind() -> String {
    POD_MANIFEST_KIND.to_string()
}

fn default_version() -> String {
    AC_VERSION.to_string()
}

impl Default for PodManifest {
    fn default() -> Self {
        Self {
            ac_kind: default_kind(),
            ac_version: default_version(),
            apps: Vec::new(),
            volumes: Vec::new(),
            isolators: Vec::new(),
            annotations: Annotations::default(),
        }
    }
}

impl PodManifest {
    /// Creates a manifest running a single app.
    pub fn new(app: RuntimeApp) -> Self {
        Self {
            apps: vec![app],
            ..Self::default()
        }
    }

    /// Checks the constraints this runtime places on manifests.
    ///
    /// # Errors
    ///
    /// `InvalidManifest` when the pod has no app, more than one app,
    /// isolators, or duplicate app/volume names.
    pub fn validate(&self) -> Result<()> {
        match self.apps.len() {
            0 => return Err(Error::InvalidManifest("no application set".to_string())),
            1 => {}
            n => {
                return Err(Error::InvalidManifest(format!(
                    "multi-application pods are not supported ({n} apps)"
                )));
            }
        }

        if !self.isolators.is_empty() {
            return Err(Error::InvalidManifest(
                "isolators are not supported".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for app in &self.apps {
            if !names.insert(app.name.as_str()) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate app name '{}'",
                    app.name
                )));
            }
        }

        let mut names = HashSet::new();
        for vol in &self.volumes {
            if !names.insert(vol.name.as_str()) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate volume name '{}'",
                    vol.name
                )));
            }
        }

        Ok(())
    }

    /// Looks up a runtime app by name.
    pub fn app(&self, name: &str) -> Option<&RuntimeApp> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Looks up a volume by name, returning its declaration index too.
    ///
    /// The index names the backing directory of empty volumes.
    pub fn volume(&self, name: &str) -> Option<(usize, &Volume)> {
        self.volumes.iter().enumerate().find(|(_, v)| v.name == name)
    }
}

// =============================================================================
// Apps
// =============================================================================

/// An application entry in a pod manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeApp {
    /// App name, unique within the pod.
    pub name: String,
    /// Image the app runs from.
    pub image: ImageRef,
    /// Overrides the image's default app when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    /// Volume to mount point bindings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

/// Content-addressed image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Binds a pod volume to an image mount point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    pub volume: String,
    pub mount_point: String,
}

/// Execution descriptor, either an image default or a pod override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(default)]
    pub exec: Vec<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<MountPoint>,
}

impl App {
    /// Looks up a declared mount point by name.
    pub fn mount_point(&self, name: &str) -> Option<&MountPoint> {
        self.mount_points.iter().find(|m| m.name == name)
    }
}

/// Environment variable passed to an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Location inside an image that a volume must be mounted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPoint {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
}

// =============================================================================
// Volumes
// =============================================================================

/// Named storage binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(flatten)]
    pub kind: VolumeKind,
    /// Forces a read-only mount when true. A read-only mount point does too.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

impl Volume {
    /// Creates a runtime-allocated volume.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VolumeKind::Empty,
            read_only: None,
        }
    }

    /// Creates a volume backed by an existing host path.
    pub fn host(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: VolumeKind::Host {
                source: source.into(),
            },
            read_only: None,
        }
    }
}

/// Where a volume's data lives on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VolumeKind {
    /// Directory allocated per pod under `volumes/<index>`.
    Empty,
    /// Pre-existing host path.
    Host { source: PathBuf },
}

// =============================================================================
// Isolators & Annotations
// =============================================================================

/// Resource isolator. Parsed so it can be rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isolator {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Key-value pair attached to a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    pub value: String,
}

/// Ordered annotation list with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Sets an annotation, replacing the value in place if the name exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.0.push(Annotation { name, value }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.0.iter().position(|a| a.name == name)?;
        Some(self.0.remove(idx).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Annotations {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut annotations = Self::default();
        for (k, v) in iter {
            annotations.set(k, v);
        }
        annotations
    }
}
