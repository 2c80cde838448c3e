//! # Host
//!
//! The host owns everything pods resolve against but never own themselves:
//!
//! - **Paths**: the root directory pods and images live under
//! - **Properties**: the host property store (`jail.interface`, ...)
//! - **Collaborators**: image store, dataset manager, jail facility
//! - **Jail status cache**: the last jls(8) answer per jail name
//!
//! ## Configuration
//!
//! ```yaml
//! root: /var/jetpack
//! libexec: /usr/local/libexec/jetpack
//! resolv_conf: /etc/resolv.conf
//! properties:
//!   jail.interface: lo1
//!   jail.namePrefix: "jetpack:"
//!   debug: false
//!   zfs.dataset: zroot/jetpack
//! ```
//!
//! ## Status Cache
//!
//! Jail status is cached per host instance, never process-wide. A lookup
//! with `refresh` set always queries the facility; every create or remove
//! issued through the host drops the cached entry for that jail.

use crate::constants::{
    DEFAULT_LIBEXEC, DEFAULT_RESOLV_CONF, DEFAULT_ROOT, PODS_DIR, PROP_DEBUG, PROP_ZFS_DATASET,
};
use crate::dataset::{DatasetManager, ZfsDatasets};
use crate::error::{Error, Result};
use crate::image::{DirImageStore, ImageStore};
use crate::jail::{JailCommand, JailFacility, JailOp, JailStatus};
use crate::pod::{Pod, PodManifest};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Parent dataset used when `zfs.dataset` is not configured.
const DEFAULT_ZFS_DATASET: &str = "zroot/jetpack";

// =============================================================================
// Properties
// =============================================================================

/// Host property store.
///
/// Scalar YAML values are kept in their string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, serde_yaml::Value>")]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns a required property.
    ///
    /// # Errors
    ///
    /// `MissingProperty` if the key is not set.
    pub fn must_get_string(&self, key: &str) -> Result<&str> {
        self.get_string(key)
            .ok_or_else(|| Error::MissingProperty(key.to_string()))
    }

    /// Returns a boolean property, or `default` when unset or unparseable.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).map(str::to_ascii_lowercase).as_deref() {
            Some("true" | "yes" | "on" | "1") => true,
            Some("false" | "no" | "off" | "0") => false,
            _ => default,
        }
    }
}

impl From<BTreeMap<String, serde_yaml::Value>> for Properties {
    fn from(map: BTreeMap<String, serde_yaml::Value>) -> Self {
        let props = map
            .into_iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Null => String::new(),
                    other => serde_yaml::to_string(&other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                (k, value)
            })
            .collect();
        Self(props)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// =============================================================================
// Host Configuration
// =============================================================================

/// Host configuration file contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_libexec")]
    pub libexec: PathBuf,
    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,
    #[serde(default)]
    pub properties: Properties,
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_libexec() -> PathBuf {
    PathBuf::from(DEFAULT_LIBEXEC)
}

fn default_resolv_conf() -> PathBuf {
    PathBuf::from(DEFAULT_RESOLV_CONF)
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            libexec: default_libexec(),
            resolv_conf: default_resolv_conf(),
            properties: Properties::default(),
        }
    }
}

impl HostConfig {
    /// Configuration rooted at `root` with default paths elsewhere.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Reads a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_yaml(&content).map_err(|reason| Error::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parses YAML configuration text.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    }
}

// =============================================================================
// Host
// =============================================================================

/// Host a set of pods runs on.
pub struct Host {
    root: PathBuf,
    libexec: PathBuf,
    resolv_conf: PathBuf,
    properties: Properties,
    images: Arc<dyn ImageStore>,
    datasets: Arc<dyn DatasetManager>,
    jails: Arc<dyn JailFacility>,
    /// Jail name → last observed status (`None` = no such jail).
    jail_statuses: RwLock<HashMap<String, Option<JailStatus>>>,
}

impl Host {
    /// Creates a host using the on-system collaborators.
    pub fn new(config: HostConfig) -> Self {
        let images = Arc::new(DirImageStore::new(&config.root));
        let datasets = Arc::new(ZfsDatasets::new(
            config
                .properties
                .get_string(PROP_ZFS_DATASET)
                .unwrap_or(DEFAULT_ZFS_DATASET),
        ));
        Self::with_collaborators(config, images, datasets, Arc::new(JailCommand::new()))
    }

    /// Creates a host with explicit collaborators.
    pub fn with_collaborators(
        config: HostConfig,
        images: Arc<dyn ImageStore>,
        datasets: Arc<dyn DatasetManager>,
        jails: Arc<dyn JailFacility>,
    ) -> Self {
        Self {
            root: config.root,
            libexec: config.libexec,
            resolv_conf: config.resolv_conf,
            properties: config.properties,
            images,
            datasets,
            jails,
            jail_statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves a path below the host root.
    pub fn path<I, P>(&self, elems: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut path = self.root.clone();
        for elem in elems {
            path.push(elem);
        }
        path
    }

    pub fn libexec(&self) -> &Path {
        &self.libexec
    }

    pub fn resolv_conf(&self) -> &Path {
        &self.resolv_conf
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn images(&self) -> &dyn ImageStore {
        self.images.as_ref()
    }

    pub fn datasets(&self) -> &dyn DatasetManager {
        self.datasets.as_ref()
    }

    pub fn jails(&self) -> &dyn JailFacility {
        self.jails.as_ref()
    }

    /// Returns true when jail(8) should run verbosely.
    pub fn debug(&self) -> bool {
        self.properties.get_bool(PROP_DEBUG, false)
    }

    // =========================================================================
    // Jail Status
    // =========================================================================

    /// Looks up a jail's status, querying the OS on a cache miss or when
    /// `refresh` is set.
    pub async fn jail_status(&self, name: &str, refresh: bool) -> Result<JailStatus> {
        if !refresh {
            let cache = self
                .jail_statuses
                .read()
                .map_err(|_| Error::Fatal("jail status cache lock poisoned".to_string()))?;
            if let Some(cached) = cache.get(name) {
                return Ok(cached.unwrap_or(JailStatus::NONE));
            }
        }

        let status = self.jails.query(name).await?;
        debug!(jail = %name, ?status, "Queried jail status");

        self.jail_statuses
            .write()
            .map_err(|_| Error::Fatal("jail status cache lock poisoned".to_string()))?
            .insert(name.to_string(), status);
        Ok(status.unwrap_or(JailStatus::NONE))
    }

    /// Issues a jail(8) operation and invalidates the cached status.
    pub async fn run_jail(&self, conf: &Path, op: JailOp, name: &str) -> Result<()> {
        let result = self.jails.run_jail(conf, self.debug(), op, name).await;
        self.jail_statuses
            .write()
            .map_err(|_| Error::Fatal("jail status cache lock poisoned".to_string()))?
            .remove(name);
        result
    }

    // =========================================================================
    // Pods
    // =========================================================================

    /// Creates and persists a new pod with a fresh UUID.
    pub fn create_pod(self: &Arc<Self>, manifest: PodManifest) -> Result<Pod> {
        manifest.validate()?;
        let mut pod = Pod::create(Arc::clone(self), Uuid::new_v4(), manifest);
        pod.save()?;
        info!(pod = %pod.uuid(), "Created pod");
        Ok(pod)
    }

    /// Loads an existing pod.
    pub fn get_pod(self: &Arc<Self>, id: Uuid) -> Result<Pod> {
        Pod::open(Arc::clone(self), id)
    }

    /// Lists the UUIDs of pods present on disk.
    pub fn pod_ids(&self) -> Result<Vec<Uuid>> {
        let dir = self.path([PODS_DIR]);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|n| Uuid::parse_str(n).ok())
                && entry.path().is_dir()
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("root", &self.root)
            .field("libexec", &self.libexec)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_yaml() {
        let config = HostConfig::from_yaml(
            r#"
root: /tmp/jp
properties:
  jail.interface: lo1
  jail.namePrefix: "jetpack:"
  debug: true
  answer: 42
"#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/tmp/jp"));
        assert_eq!(config.libexec, PathBuf::from(DEFAULT_LIBEXEC));
        let props = &config.properties;
        assert_eq!(props.must_get_string("jail.interface").unwrap(), "lo1");
        assert_eq!(props.get_string("jail.namePrefix"), Some("jetpack:"));
        assert!(props.get_bool("debug", false));
        assert_eq!(props.get_string("answer"), Some("42"));
    }

    #[test]
    fn test_must_get_string_missing_is_fatal() {
        let props = Properties::new();
        let err = props.must_get_string("jail.interface").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_get_bool_default() {
        let props: Properties = [("a", "yes"), ("b", "maybe")].into_iter().collect();
        assert!(props.get_bool("a", false));
        assert!(props.get_bool("b", true));
        assert!(!props.get_bool("missing", false));
    }

    #[test]
    fn test_host_path() {
        let host = Host::new(HostConfig::with_root("/var/jp"));
        assert_eq!(
            host.path(["pods", "x", "rootfs"]),
            PathBuf::from("/var/jp/pods/x/rootfs")
        );
    }

    #[test]
    fn test_pod_ids_skips_non_uuid_entries() {
        let temp = tempfile::TempDir::new().unwrap();
        let host = Host::new(HostConfig::with_root(temp.path()));
        let id = Uuid::new_v4();
        std::fs::create_dir_all(temp.path().join(PODS_DIR).join(id.to_string())).unwrap();
        std::fs::create_dir_all(temp.path().join(PODS_DIR).join("scratch")).unwrap();
        assert_eq!(host.pod_ids().unwrap(), vec![id]);
    }
}
