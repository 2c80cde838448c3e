//! # Pod Runtime Constants
//!
//! Fixed jail policy, on-disk layout names, host property keys and timing
//! used throughout the crate. Values that shape the generated jail
//! configuration live here so tests and the builder agree on them.

use std::time::Duration;

// =============================================================================
// Jail Policy
// =============================================================================
//
// Parameters every pod jail receives regardless of its manifest. Annotations
// under JAIL_CONF_ANNOTATION_PREFIX may still override any of them.
// =============================================================================

/// devfs ruleset applied inside pod jails (the stock "jail" ruleset).
pub const JAIL_DEVFS_RULESET: &str = "4";

/// Fixed policy parameters merged into every jail configuration.
pub const JAIL_POLICY: &[(&str, &str)] = &[
    ("devfs_ruleset", JAIL_DEVFS_RULESET),
    ("exec.clean", "true"),
    ("mount.devfs", "true"),
    ("persist", "true"),
];

/// Annotation prefix that injects a raw jail parameter.
///
/// `jetpack/jail.conf/allow-raw-sockets` becomes `allow_raw_sockets`.
pub const JAIL_CONF_ANNOTATION_PREFIX: &str = "jetpack/jail.conf/";

/// Annotation carrying the pod hostname.
pub const HOSTNAME_ANNOTATION: &str = "hostname";

/// Annotation carrying the pod IPv4 address. Required to start a jail.
pub const IP_ADDRESS_ANNOTATION: &str = "ip-address";

// =============================================================================
// Host Property Keys
// =============================================================================

/// Network interface pod addresses are attached to. Required.
pub const PROP_JAIL_INTERFACE: &str = "jail.interface";

/// Prefix prepended to the pod UUID to form the jail name. Required.
pub const PROP_JAIL_NAME_PREFIX: &str = "jail.namePrefix";

/// Enables verbose output from jail(8).
pub const PROP_DEBUG: &str = "debug";

/// Parent dataset under which pod datasets are created.
pub const PROP_ZFS_DATASET: &str = "zfs.dataset";

// =============================================================================
// Pod Layout
// =============================================================================
//
// <root>/pods/<uuid>/
//   manifest        serialized pod manifest (0400)
//   jail.conf       generated jail configuration (0400)
//   fstab           generated mount table, only when mounts exist (0600)
//   rootfs/         application root filesystem
//   volumes/<n>/    backing directories for empty volumes
// =============================================================================

/// Directory under the host root holding all pods.
pub const PODS_DIR: &str = "pods";

/// Directory under the host root holding all images.
pub const IMAGES_DIR: &str = "images";

/// Manifest file name (both pods and images).
pub const MANIFEST_FILE: &str = "manifest";

/// Generated jail configuration file name.
pub const JAIL_CONF_FILE: &str = "jail.conf";

/// Generated mount table file name.
pub const FSTAB_FILE: &str = "fstab";

/// Root filesystem directory name.
pub const ROOTFS_DIR: &str = "rootfs";

/// Empty volume backing directory name.
pub const VOLUMES_DIR: &str = "volumes";

/// Mode of a pod directory created on save.
pub const POD_DIR_MODE: u32 = 0o700;

/// Mode of the pod manifest file.
pub const MANIFEST_MODE: u32 = 0o400;

/// Mode of the generated jail configuration.
pub const JAIL_CONF_MODE: u32 = 0o400;

/// Mode of the generated mount table.
pub const FSTAB_MODE: u32 = 0o600;

/// Mode of freshly allocated empty volume directories.
pub const EMPTY_VOLUME_MODE: u32 = 0o700;

/// Mode of the resolver configuration copied into the pod.
pub const RESOLV_CONF_MODE: u32 = 0o644;

// =============================================================================
// Mounts
// =============================================================================

/// Annotation through which the mount table reaches the jail configuration.
pub const FSTAB_ANNOTATION: &str = "jetpack/jail.conf/mount.fstab";

/// Filesystems mounted into pods running Linux images, as
/// `(source, rootfs-relative target, fstype)`.
pub const LINUX_COMPAT_MOUNTS: &[(&str, &str, &str)] = &[
    ("linsys", "sys", "linsysfs"),
    ("linproc", "proc", "linprocfs"),
];

/// Location of the resolver configuration inside the rootfs.
pub const POD_RESOLV_CONF: &str = "etc/resolv.conf";

// =============================================================================
// Applications
// =============================================================================

/// User applications run as when the descriptor names none.
pub const DEFAULT_APP_USER: &str = "root";

/// Shell started by the console app.
pub const CONSOLE_SHELL: &[&str] = &["/usr/bin/login", "-f"];

/// Name of the launcher program inside the libexec directory.
pub const STAGE2_PROGRAM: &str = "stage2";

// =============================================================================
// Timing
// =============================================================================

/// Backoff between status checks while a jail is dying.
pub const KILL_RETRY_INTERVAL: Duration = Duration::from_millis(2500);

/// Upper bound on kill loop iterations (5 minutes of dying backoff).
pub const KILL_MAX_ATTEMPTS: u32 = 120;

// =============================================================================
// Defaults
// =============================================================================

/// Default host configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/jetpack.conf.yaml";

/// Default host root directory.
pub const DEFAULT_ROOT: &str = "/var/jetpack";

/// Default libexec directory.
pub const DEFAULT_LIBEXEC: &str = "/usr/local/libexec/jetpack";

/// Host resolver configuration copied into every pod.
pub const DEFAULT_RESOLV_CONF: &str = "/etc/resolv.conf";
