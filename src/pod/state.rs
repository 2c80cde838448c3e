//! Pod status.
//!
//! Derived from the live jail on every read, never stored.

use super::Pod;
use crate::error::{Error, Result};
use crate::jail::JailStatus;
use std::fmt;

/// Observed lifecycle state of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodStatus {
    /// No jail exists.
    Stopped,
    /// A live jail exists.
    Running,
    /// The jail was removed and its processes are being reaped.
    Dying,
}

impl PodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Dying => "dying",
        }
    }
}

impl From<JailStatus> for PodStatus {
    fn from(status: JailStatus) -> Self {
        match status {
            JailStatus { jid: 0, .. } => Self::Stopped,
            JailStatus { dying: true, .. } => Self::Dying,
            JailStatus { .. } => Self::Running,
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Pod {
    /// Current status, possibly answered from the host's status cache.
    pub async fn status(&self) -> Result<PodStatus> {
        self.jail_status(false).await.map(PodStatus::from)
    }

    /// Current status, always queried from the OS.
    pub async fn status_refreshed(&self) -> Result<PodStatus> {
        self.jail_status(true).await.map(PodStatus::from)
    }

    /// Numeric jail id, 0 when the pod has no jail.
    pub async fn jid(&self) -> Result<u32> {
        self.jail_status(false).await.map(|s| s.jid)
    }

    /// Queries the pod's jail. A failed query is fatal to the caller.
    pub(crate) async fn jail_status(&self, refresh: bool) -> Result<JailStatus> {
        let name = self.jail_name()?;
        self.host
            .jail_status(&name, refresh)
            .await
            .map_err(|e| Error::Fatal(format!("cannot query jail {name}: {e}")))
    }
}
