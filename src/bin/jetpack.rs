//! jetpack - FreeBSD jail pod runtime CLI
//!
//! ## Usage
//!
//! ```sh
//! jetpack list
//! jetpack status <pod>
//! jetpack run <pod> [--app NAME]
//! jetpack console <pod> [--app NAME] [--user USER]
//! jetpack kill <pod>
//! jetpack destroy <pod>
//! jetpack jail-conf <pod>
//! ```
//!
//! The host configuration is read from `--config`, `JETPACK_CONF`, or
//! `/usr/local/etc/jetpack.conf.yaml`. Log verbosity follows `JETPACK_LOG`.

use clap::{Parser, Subcommand};
use jetpack::constants::{DEFAULT_APP_USER, DEFAULT_CONFIG_PATH};
use jetpack::{Host, HostConfig, Pod};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "jetpack", version, about = "Pod runtime for FreeBSD jails")]
struct Cli {
    /// Host configuration file.
    #[arg(long, env = "JETPACK_CONF", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug logging and verbose jail(8) output.
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List pods with their status.
    List,
    /// Print a pod's status.
    Status { pod: Uuid },
    /// Run a pod's app, starting its jail if needed.
    Run {
        pod: Uuid,
        /// App to run; defaults to the pod's only app.
        #[arg(long)]
        app: Option<String>,
    },
    /// Open a login shell inside a pod.
    Console {
        pod: Uuid,
        /// Session label; defaults to the pod's app name.
        #[arg(long)]
        app: Option<String>,
        #[arg(long, default_value = DEFAULT_APP_USER)]
        user: String,
    },
    /// Stop a pod's jail.
    Kill { pod: Uuid },
    /// Stop a pod and remove its dataset and files.
    Destroy { pod: Uuid },
    /// Print a pod's jail.conf, or the one it would be created with.
    JailConf { pod: Uuid },
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("JETPACK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> jetpack::Result<()> {
    let mut config = HostConfig::load(&cli.config)?;
    if cli.debug {
        config.properties.set(jetpack::constants::PROP_DEBUG, "true");
    }
    let host = Arc::new(Host::new(config));

    match cli.command {
        Command::List => {
            for id in host.pod_ids()? {
                let pod = host.get_pod(id)?;
                println!("{id}\t{}", pod.status().await?);
            }
        }
        Command::Status { pod } => {
            let pod = host.get_pod(pod)?;
            println!("{}", pod.status().await?);
        }
        Command::Run { pod, app } => {
            let mut pod = host.get_pod(pod)?;
            match app {
                Some(name) => pod.run_app(&name).await?,
                None => pod.run_nth_app(0).await?,
            }
        }
        Command::Console { pod, app, user } => {
            let mut pod = host.get_pod(pod)?;
            let name = session_name(&pod, app);
            pod.console(&name, &user).await?;
        }
        Command::Kill { pod } => host.get_pod(pod)?.kill().await?,
        Command::Destroy { pod } => host.get_pod(pod)?.destroy().await?,
        Command::JailConf { pod } => {
            let pod = host.get_pod(pod)?;
            print!("{}", pod.effective_jail_conf()?);
        }
    }
    Ok(())
}

fn session_name(pod: &Pod, app: Option<String>) -> String {
    app.or_else(|| pod.manifest().apps.first().map(|a| a.name.clone()))
        .unwrap_or_else(|| pod.uuid().to_string())
}
