//! # jetpack
//!
//! **Pod runtime for FreeBSD jails**
//!
//! A pod is a single application described by a pod manifest, run inside
//! its own jail. This crate covers the pod lifecycle: persisting the
//! manifest, generating the jail configuration and mount table, deriving
//! status from the live jail, and starting, stopping and destroying it.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              Host                                   │
//! │   root dir │ libexec │ properties │ jail status cache               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                               Pod                                   │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌────────────┐  │
//! │  │Manifest Store│ │ Jail Config  │ │Mount Resolver│ │   Status   │  │
//! │  │ load / save  │ │   Builder    │ │ fstab, vols  │ │   Oracle   │  │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └────────────┘  │
//! │  ┌─────────────────────────────────┐ ┌──────────────────────────┐   │
//! │  │ Lifecycle: stage2 / kill / destroy│ │ App Launcher (stage2 args)│ │
//! │  └─────────────────────────────────┘ └──────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                          Collaborators                              │
//! │  ┌──────────────┐  ┌────────────────┐  ┌────────────────────────┐   │
//! │  │  ImageStore  │  │ DatasetManager │  │      JailFacility      │   │
//! │  │ images/<hash>│  │    zfs(8)      │  │ jail(8) jls(8) stage2  │   │
//! │  └──────────────┘  └────────────────┘  └────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Collaborators are traits so the pod layer can run against fakes.
//!
//! # Example
//!
//! ```rust,ignore
//! use jetpack::{Host, HostConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> jetpack::Result<()> {
//!     let config = HostConfig::load("/usr/local/etc/jetpack.conf.yaml".as_ref())?;
//!     let host = Arc::new(Host::new(config));
//!     for id in host.pod_ids()? {
//!         let pod = host.get_pod(id)?;
//!         println!("{id} {}", pod.status().await?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod constants;
pub mod dataset;
pub mod error;
pub mod host;
pub mod image;
pub mod jail;
pub mod pod;

mod command;

// Re-exports
pub use dataset::{Dataset, DatasetManager, ZfsDatasets};
pub use error::{Error, Result};
pub use host::{Host, HostConfig, Properties};
pub use image::{DirImageStore, Image, ImageManifest, ImageStore};
pub use jail::{JailCommand, JailFacility, JailOp, JailStatus};
pub use pod::{App, Pod, PodManifest, PodStatus, RuntimeApp, Volume};
