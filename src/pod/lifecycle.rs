//! # Lifecycle Control
//!
//! - **stage2**: prepares and creates the jail when it is not running, then
//!   launches an app inside it.
//! - **kill**: drives the pod to `Stopped`. Running jails are removed;
//!   dying jails are waited on with a fixed backoff. Bounded by
//!   [`KILL_MAX_ATTEMPTS`].
//! - **destroy**: kill, then the backing dataset, then the pod directory.
//!   Each step aborts the rest on failure.
//!
//! Cancelling `kill` mid-loop leaves the pod possibly still dying; nothing
//! about an in-progress kill is persisted.

use super::{App, Pod, PodStatus, stage2_args};
use crate::constants::{
    JAIL_CONF_FILE, KILL_MAX_ATTEMPTS, KILL_RETRY_INTERVAL, PODS_DIR, STAGE2_PROGRAM,
};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::jail::JailOp;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl Pod {
    /// Runs `app` inside the pod's jail under the label `name`.
    ///
    /// Creates the jail first when it has no jid.
    ///
    /// # Errors
    ///
    /// `Fatal` if the jail still has no jid after creation. Mount and
    /// configuration errors from [`Pod::prepare_jail`] abort the start
    /// before jail(8) runs.
    pub async fn stage2(&mut self, name: &str, app: &App) -> Result<()> {
        let mut status = self.jail_status(false).await?;
        if !status.is_attached() {
            self.run_jail(JailOp::Create).await?;
            status = self.jail_status(true).await?;
            if !status.is_attached() {
                return Err(Error::Fatal(format!(
                    "jail {} has no jid after creation",
                    self.jail_name()?
                )));
            }
            info!(pod = %self.uuid, jid = status.jid, "Started jail");
        }

        let program = self.host.libexec().join(STAGE2_PROGRAM);
        let args = stage2_args(status.jid, name, app);
        debug!(pod = %self.uuid, app = %name, jid = status.jid, "Launching app");
        self.host.jails().stage2(&program, &args).await
    }

    /// Stops the pod's jail and waits for it to disappear.
    ///
    /// # Errors
    ///
    /// `KillTimeout` if the jail has not stopped after
    /// [`KILL_MAX_ATTEMPTS`] status checks and one final refreshed check.
    pub async fn kill(&mut self) -> Result<()> {
        let jail = self.jail_name()?;
        let started = Instant::now();

        for attempt in 0..KILL_MAX_ATTEMPTS {
            match PodStatus::from(self.jail_status(attempt > 0).await?) {
                PodStatus::Stopped => {
                    if attempt > 0 {
                        info!(pod = %self.uuid, waited = ?started.elapsed(), "Jail stopped");
                    }
                    return Ok(());
                }
                PodStatus::Running => {
                    info!(pod = %self.uuid, jail = %jail, "Removing jail");
                    self.run_jail(JailOp::Remove).await?;
                }
                PodStatus::Dying => {
                    warn!(
                        pod = %self.uuid,
                        jail = %jail,
                        attempt,
                        "Jail is dying, waiting"
                    );
                    tokio::time::sleep(KILL_RETRY_INTERVAL).await;
                }
            }
        }

        // The last iteration may have just issued the removal.
        if PodStatus::from(self.jail_status(true).await?) == PodStatus::Stopped {
            info!(pod = %self.uuid, waited = ?started.elapsed(), "Jail stopped");
            return Ok(());
        }

        Err(Error::KillTimeout {
            jail,
            waited: started.elapsed(),
        })
    }

    /// Removes the pod: its jail, its dataset, then its directory.
    pub async fn destroy(&mut self) -> Result<()> {
        if self.jail_status(false).await?.is_attached() {
            self.kill().await?;
        }

        if let Some(dataset) = self.dataset().await? {
            self.host.datasets().destroy(&dataset, true).await?;
        }

        let dir = self.dir();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&dir, e)),
        }
        info!(pod = %self.uuid, "Destroyed pod");
        Ok(())
    }

    /// The pod's backing dataset, if it has one.
    pub async fn dataset(&self) -> Result<Option<Dataset>> {
        let path = format!("{PODS_DIR}/{}", self.uuid);
        match self.host.datasets().get_dataset(&path).await {
            Ok(dataset) => Ok(Some(dataset)),
            Err(Error::DatasetNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Issues a jail(8) operation against the pod's jail.conf.
    ///
    /// Creation always regenerates the configuration; removal reuses the one
    /// on disk so the jail is torn down with the mounts it was created with.
    async fn run_jail(&mut self, op: JailOp) -> Result<()> {
        let conf = self.path([JAIL_CONF_FILE]);
        if op == JailOp::Create || !conf.try_exists().map_err(|e| Error::io(&conf, e))? {
            self.prepare_jail().await?;
        }
        let name = self.jail_name()?;
        self.host.run_jail(&conf, op, &name).await
    }
}
