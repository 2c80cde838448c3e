//! Shared fixtures: a temp host with fake jail and dataset facilities.
//!
//! The fake jail facility simulates one jail per name: `create` gives it a
//! jid, `remove` marks it dying for a configurable number of status queries
//! before it disappears. Every external call lands in a shared event log so
//! tests can check ordering across collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use jetpack::image::{ImageManifest, Label};
use jetpack::pod::{ImageRef, MountPoint, RuntimeApp};
use jetpack::{
    App, Dataset, DatasetManager, DirImageStore, Error, Host, HostConfig, JailFacility, JailOp,
    JailStatus, Pod, PodManifest, Result,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const IMAGE_HASH: &str = "sha512-0123abcd";
pub const NAME_PREFIX: &str = "jetpack:";

/// Ordered record of external calls.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Events other than status queries.
    pub fn actions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| !e.starts_with("query"))
            .collect()
    }
}

// =============================================================================
// Fake Jail Facility
// =============================================================================

#[derive(Default)]
struct JailState {
    jails: HashMap<String, JailStatus>,
    dying_left: HashMap<String, u32>,
    next_jid: u32,
    removes: u32,
}

pub struct FakeJails {
    log: EventLog,
    state: Mutex<JailState>,
    /// Status queries a removed jail stays dying for.
    pub dying_polls: u32,
    /// When false, `create` succeeds without producing a jail.
    pub create_attaches: bool,
    /// When true, `remove` fails.
    pub fail_remove: bool,
    /// Number of leading `remove` calls that leave the jail running.
    pub ignored_removes: u32,
}

impl FakeJails {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            state: Mutex::new(JailState {
                next_jid: 1,
                ..JailState::default()
            }),
            dying_polls: 0,
            create_attaches: true,
            fail_remove: false,
            ignored_removes: 0,
        }
    }

    /// Puts a running jail in place without going through `run_jail`.
    pub fn insert_running(&self, name: &str, jid: u32) {
        self.state
            .lock()
            .unwrap()
            .jails
            .insert(name.to_string(), JailStatus { jid, dying: false });
    }
}

#[async_trait]
impl JailFacility for FakeJails {
    async fn query(&self, name: &str) -> Result<Option<JailStatus>> {
        self.log.push(format!("query {name}"));
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(status) = state.jails.get(name).copied() else {
            return Ok(None);
        };
        if !status.dying {
            return Ok(Some(status));
        }

        let left = state.dying_left.entry(name.to_string()).or_insert(0);
        if *left == 0 {
            state.jails.remove(name);
            state.dying_left.remove(name);
            return Ok(None);
        }
        if *left != u32::MAX {
            *left -= 1;
        }
        Ok(Some(status))
    }

    async fn run_jail(&self, conf: &Path, _verbose: bool, op: JailOp, name: &str) -> Result<()> {
        self.log.push(format!("{op} {name} conf_exists={}", conf.exists()));
        let mut state = self.state.lock().unwrap();
        match op {
            JailOp::Create => {
                if self.create_attaches {
                    let jid = state.next_jid;
                    state.next_jid += 1;
                    state
                        .jails
                        .insert(name.to_string(), JailStatus { jid, dying: false });
                }
            }
            JailOp::Remove => {
                if self.fail_remove {
                    return Err(Error::CommandFailed {
                        command: format!("jail -r {name}"),
                        reason: "operation not permitted".to_string(),
                    });
                }
                state.removes += 1;
                if state.removes <= self.ignored_removes {
                    return Ok(());
                }
                if let Some(status) = state.jails.get_mut(name) {
                    status.dying = true;
                }
                state.dying_left.insert(name.to_string(), self.dying_polls);
            }
        }
        Ok(())
    }

    async fn stage2(&self, program: &Path, args: &[String]) -> Result<()> {
        self.log
            .push(format!("stage2 {} {}", program.display(), args.join(" ")));
        Ok(())
    }
}

// =============================================================================
// Fake Dataset Manager
// =============================================================================

pub struct FakeDatasets {
    log: EventLog,
    existing: Mutex<HashSet<String>>,
    /// Directory whose presence is recorded at destroy time.
    pub watch: Mutex<Option<PathBuf>>,
    pub fail_destroy: bool,
}

impl FakeDatasets {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            existing: Mutex::new(HashSet::new()),
            watch: Mutex::new(None),
            fail_destroy: false,
        }
    }

    pub fn add(&self, path: &str) {
        self.existing.lock().unwrap().insert(path.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.existing.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl DatasetManager for FakeDatasets {
    async fn get_dataset(&self, path: &str) -> Result<Dataset> {
        if self.contains(path) {
            Ok(Dataset {
                name: path.to_string(),
                mountpoint: None,
            })
        } else {
            Err(Error::DatasetNotFound(path.to_string()))
        }
    }

    async fn destroy(&self, dataset: &Dataset, recursive: bool) -> Result<()> {
        let dir_exists = self
            .watch
            .lock()
            .unwrap()
            .as_ref()
            .map(|p| p.exists())
            .unwrap_or(false);
        self.log.push(format!(
            "destroy {} recursive={recursive} dir_exists={dir_exists}",
            dataset.name
        ));
        if self.fail_destroy {
            return Err(Error::CommandFailed {
                command: format!("zfs destroy {}", dataset.name),
                reason: "dataset is busy".to_string(),
            });
        }
        self.existing.lock().unwrap().remove(&dataset.name);
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub temp: TempDir,
    pub host: Arc<Host>,
    pub jails: Arc<FakeJails>,
    pub datasets: Arc<FakeDatasets>,
    pub log: EventLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(|_| {}, |_| {})
    }

    /// Builds a harness, letting the caller tune the fakes first.
    pub fn build(
        jails: impl FnOnce(&mut FakeJails),
        datasets: impl FnOnce(&mut FakeDatasets),
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let log = EventLog::default();

        let resolv_conf = temp.path().join("resolv.conf");
        std::fs::write(&resolv_conf, "nameserver 192.0.2.53\n").unwrap();

        let mut config = HostConfig::with_root(temp.path().join("jetpack"));
        config.libexec = PathBuf::from("/usr/local/libexec/jetpack");
        config.resolv_conf = resolv_conf;
        config.properties.set("jail.interface", "lo1");
        config.properties.set("jail.namePrefix", NAME_PREFIX);

        let mut fake_jails = FakeJails::new(log.clone());
        jails(&mut fake_jails);
        let mut fake_datasets = FakeDatasets::new(log.clone());
        datasets(&mut fake_datasets);

        let jails = Arc::new(fake_jails);
        let datasets = Arc::new(fake_datasets);
        let images = Arc::new(DirImageStore::new(&config.root));
        let host = Arc::new(Host::with_collaborators(
            config,
            images,
            datasets.clone(),
            jails.clone(),
        ));

        Self {
            temp,
            host,
            jails,
            datasets,
            log,
        }
    }

    /// Writes an image manifest into the host's image store.
    pub fn add_image(&self, manifest: &ImageManifest) {
        let dir = self.host.path(["images", IMAGE_HASH]);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("manifest"), serde_json::to_vec(manifest).unwrap()).unwrap();
    }

    /// Creates and saves a pod with the `rootfs/etc` an unpacked image has.
    pub fn create_pod(&self, manifest: PodManifest) -> Pod {
        let pod = self.host.create_pod(manifest).unwrap();
        std::fs::create_dir_all(pod.path(["rootfs", "etc"])).unwrap();
        pod
    }

    pub fn jail_name(&self, pod: &Pod) -> String {
        format!("{NAME_PREFIX}{}", pod.uuid())
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Image whose default app runs `/usr/local/bin/web`.
pub fn image(os: &str, mount_points: &[(&str, &str)]) -> ImageManifest {
    ImageManifest {
        name: "example.org/web".to_string(),
        labels: vec![Label {
            name: "os".to_string(),
            value: os.to_string(),
        }],
        app: Some(App {
            exec: vec!["/usr/local/bin/web".to_string(), "--serve".to_string()],
            user: "www".to_string(),
            group: "www".to_string(),
            mount_points: mount_points
                .iter()
                .map(|(name, path)| MountPoint {
                    name: name.to_string(),
                    path: path.to_string(),
                    read_only: false,
                })
                .collect(),
            ..App::default()
        }),
    }
}

/// Runtime app `web` from [`IMAGE_HASH`] with the given bindings.
pub fn runtime_app(mounts: &[(&str, &str)]) -> RuntimeApp {
    RuntimeApp {
        name: "web".to_string(),
        image: ImageRef {
            id: IMAGE_HASH.to_string(),
            name: None,
        },
        app: None,
        mounts: mounts
            .iter()
            .map(|(volume, mount_point)| jetpack::pod::Mount {
                volume: volume.to_string(),
                mount_point: mount_point.to_string(),
            })
            .collect(),
    }
}

/// Single-app manifest with an IP address.
pub fn manifest(mounts: &[(&str, &str)]) -> PodManifest {
    let mut manifest = PodManifest::new(runtime_app(mounts));
    manifest.annotations.set("ip-address", "10.1.0.2");
    manifest
}
