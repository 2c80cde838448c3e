//! Backing datasets.
//!
//! A pod's filesystem tree may live on its own dataset, owned by the volume
//! manager and referenced here only by path relative to the host's parent
//! dataset (`pods/<uuid>`). Destroying a pod destroys that dataset
//! recursively before its directory is removed.

use crate::command;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Handle to an existing dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// Full dataset name, e.g. `zroot/jetpack/pods/<uuid>`.
    pub name: String,
    pub mountpoint: Option<PathBuf>,
}

/// Dataset manager collaborator.
#[async_trait]
pub trait DatasetManager: Send + Sync {
    /// Looks up a dataset by path relative to the managed root.
    ///
    /// # Errors
    ///
    /// `DatasetNotFound` if it does not exist.
    async fn get_dataset(&self, path: &str) -> Result<Dataset>;

    /// Destroys a dataset, with its children when `recursive`.
    async fn destroy(&self, dataset: &Dataset, recursive: bool) -> Result<()>;
}

/// [`DatasetManager`] backed by zfs(8).
#[derive(Debug, Clone)]
pub struct ZfsDatasets {
    parent: String,
}

impl ZfsDatasets {
    /// Manages datasets below `parent` (e.g. `zroot/jetpack`).
    pub fn new(parent: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
        }
    }

    fn full_name(&self, path: &str) -> String {
        format!("{}/{}", self.parent.trim_end_matches('/'), path.trim_matches('/'))
    }
}

#[async_trait]
impl DatasetManager for ZfsDatasets {
    async fn get_dataset(&self, path: &str) -> Result<Dataset> {
        let name = self.full_name(path);
        let output = match command::output(
            "zfs",
            &["list", "-H", "-o", "name,mountpoint", name.as_str()][..],
        )
        .await
        {
            Ok(output) => output,
            Err(Error::CommandFailed { reason, .. }) if reason.contains("does not exist") => {
                return Err(Error::DatasetNotFound(name));
            }
            Err(e) => return Err(e),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_zfs_list_line(&stdout).ok_or(Error::DatasetNotFound(name))
    }

    async fn destroy(&self, dataset: &Dataset, recursive: bool) -> Result<()> {
        let mut args = vec!["destroy"];
        if recursive {
            args.push("-r");
        }
        args.push(&dataset.name);
        command::output("zfs", &args[..]).await?;
        info!(dataset = %dataset.name, recursive, "Destroyed dataset");
        Ok(())
    }
}

/// Parses a `name<TAB>mountpoint` line from `zfs list -H`.
fn parse_zfs_list_line(line: &str) -> Option<Dataset> {
    let line = line.lines().next()?;
    let mut fields = line.split('\t');
    let name = fields.next().filter(|n| !n.is_empty())?.to_string();
    let mountpoint = fields
        .next()
        .filter(|m| m.starts_with('/'))
        .map(PathBuf::from);
    Some(Dataset { name, mountpoint })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name() {
        let zfs = ZfsDatasets::new("zroot/jetpack/");
        assert_eq!(zfs.full_name("pods/abc"), "zroot/jetpack/pods/abc");
    }

    #[test]
    fn test_parse_zfs_list_line() {
        let ds = parse_zfs_list_line("zroot/jetpack/pods/abc\t/var/jetpack/pods/abc\n").unwrap();
        assert_eq!(ds.name, "zroot/jetpack/pods/abc");
        assert_eq!(ds.mountpoint, Some(PathBuf::from("/var/jetpack/pods/abc")));

        let ds = parse_zfs_list_line("tank/x\tnone").unwrap();
        assert_eq!(ds.mountpoint, None);

        assert!(parse_zfs_list_line("").is_none());
    }
}
