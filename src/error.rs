//! Error types for the pod lifecycle layer.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for pod lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing a pod.
///
/// Variants fall into four categories, queryable with [`Error::is_not_found`],
/// [`Error::is_validation`] and [`Error::is_fatal`]; everything else is a
/// failure of an external facility (jail tools, dataset manager, filesystem).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Not Found
    // =========================================================================
    /// Pod has no manifest on disk.
    #[error("pod not found: {0}")]
    PodNotFound(uuid::Uuid),

    /// Named application is not part of the pod manifest.
    #[error("app not found: {0}")]
    AppNotFound(String),

    /// Mount references a volume the manifest does not declare.
    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    /// Mount references a mount point the image does not declare.
    #[error("mount point not found: {0}")]
    MountPointNotFound(String),

    /// Image lookup by hash failed.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// Dataset lookup by path failed.
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Manifest is structurally unsupported by this runtime.
    #[error("invalid pod manifest: {0}")]
    InvalidManifest(String),

    /// Image mount points left without a volume binding.
    #[error("unfulfilled mount points for {image}: {}", missing.join(", "))]
    UnfulfilledMountPoints { image: String, missing: Vec<String> },

    // =========================================================================
    // Precondition Violations
    // =========================================================================
    /// Required host property is not set.
    #[error("required host property not set: {0}")]
    MissingProperty(String),

    /// Invariant violated; the operation halts instead of guessing.
    #[error("fatal: {0}")]
    Fatal(String),

    // =========================================================================
    // External Facility Errors
    // =========================================================================
    /// External program exited unsuccessfully or could not be spawned.
    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// Filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Host configuration file could not be parsed.
    #[error("invalid configuration at {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    // =========================================================================
    // Timeout Errors
    // =========================================================================
    /// Jail stayed alive past the kill retry budget.
    #[error("jail '{jail}' still alive after {waited:?}")]
    KillTimeout { jail: String, waited: Duration },
}

impl Error {
    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors a caller may recover from by creating or
    /// reporting the missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PodNotFound(_)
                | Self::AppNotFound(_)
                | Self::VolumeNotFound(_)
                | Self::MountPointNotFound(_)
                | Self::ImageNotFound(_)
                | Self::DatasetNotFound(_)
        )
    }

    /// Returns true for manifests this runtime refuses to run.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidManifest(_) | Self::UnfulfilledMountPoints { .. }
        )
    }

    /// Returns true for missing host configuration and broken invariants.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingProperty(_) | Self::Fatal(_))
    }
}
