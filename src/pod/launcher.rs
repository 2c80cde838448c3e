//! App launching through the stage2 helper.
//!
//! ```text
//! stage2 -jid <N> -user <U> -group <G> -name <NAME> [-cwd <DIR>]
//!        [-setenv K=V ...] <exec...>
//! ```

use super::{App, Pod, RuntimeApp};
use crate::constants::{CONSOLE_SHELL, DEFAULT_APP_USER};
use crate::error::{Error, Result};
use tracing::debug;

/// Synthesizes an interactive login shell for `user`.
pub fn console_app(user: &str) -> App {
    let mut exec: Vec<String> = CONSOLE_SHELL.iter().map(|s| s.to_string()).collect();
    exec.push(user.to_string());
    App {
        exec,
        user: user.to_string(),
        group: String::new(),
        ..App::default()
    }
}

/// Builds the stage2 argument vector for running `app` in jail `jid`.
///
/// An empty user runs as root.
pub fn stage2_args(jid: u32, name: &str, app: &App) -> Vec<String> {
    let user = if app.user.is_empty() {
        DEFAULT_APP_USER
    } else {
        app.user.as_str()
    };

    let mut args = vec![
        "-jid".to_string(),
        jid.to_string(),
        "-user".to_string(),
        user.to_string(),
        "-group".to_string(),
        app.group.clone(),
        "-name".to_string(),
        name.to_string(),
    ];
    if let Some(cwd) = app.working_directory.as_deref().filter(|d| !d.is_empty()) {
        args.push("-cwd".to_string());
        args.push(cwd.to_string());
    }
    for env in &app.environment {
        args.push("-setenv".to_string());
        args.push(format!("{}={}", env.name, env.value));
    }
    args.extend(app.exec.iter().cloned());
    args
}

impl Pod {
    /// Runs the named app, starting the jail first if needed.
    pub async fn run_app(&mut self, name: &str) -> Result<()> {
        let app = self
            .manifest
            .app(name)
            .cloned()
            .ok_or_else(|| Error::AppNotFound(name.to_string()))?;
        self.run_runtime_app(&app).await
    }

    /// Runs the app at `index` in manifest order.
    pub async fn run_nth_app(&mut self, index: usize) -> Result<()> {
        let app = self
            .manifest
            .apps
            .get(index)
            .cloned()
            .ok_or_else(|| Error::AppNotFound(format!("#{index}")))?;
        self.run_runtime_app(&app).await
    }

    /// Opens an interactive shell as `user` in the jail.
    ///
    /// `name` labels the session for the launcher.
    pub async fn console(&mut self, name: &str, user: &str) -> Result<()> {
        self.stage2(name, &console_app(user)).await
    }

    /// Picks the descriptor an app runs with: its inline override, else the
    /// image default, else a root console.
    pub async fn resolve_app(&self, app: &RuntimeApp) -> Result<App> {
        if let Some(inline) = &app.app {
            return Ok(inline.clone());
        }
        let image = self.host.images().get_image_by_hash(&app.image.id).await?;
        match image.manifest.app {
            Some(default) if !default.exec.is_empty() => Ok(default),
            _ => {
                debug!(pod = %self.uuid, app = %app.name, "Image has no default app, using console");
                Ok(console_app(DEFAULT_APP_USER))
            }
        }
    }

    async fn run_runtime_app(&mut self, app: &RuntimeApp) -> Result<()> {
        let descriptor = self.resolve_app(app).await?;
        self.stage2(&app.name, &descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::EnvVar;

    #[test]
    fn test_stage2_args_full() {
        let app = App {
            exec: vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()],
            user: "www".to_string(),
            group: "www".to_string(),
            working_directory: Some("/srv".to_string()),
            environment: vec![
                EnvVar {
                    name: "A".to_string(),
                    value: "1".to_string(),
                },
                EnvVar {
                    name: "B".to_string(),
                    value: "x=y".to_string(),
                },
            ],
            mount_points: Vec::new(),
        };

        assert_eq!(
            stage2_args(7, "web", &app),
            [
                "-jid", "7", "-user", "www", "-group", "www", "-name", "web", "-cwd", "/srv",
                "-setenv", "A=1", "-setenv", "B=x=y", "/bin/sh", "-c", "true",
            ]
        );
    }

    #[test]
    fn test_stage2_args_defaults_to_root() {
        let app = App {
            exec: vec!["/bin/true".to_string()],
            ..App::default()
        };
        assert_eq!(
            stage2_args(1, "x", &app),
            ["-jid", "1", "-user", "root", "-group", "", "-name", "x", "/bin/true"]
        );
    }

    #[test]
    fn test_console_app() {
        let app = console_app("alice");
        assert_eq!(app.exec, ["/usr/bin/login", "-f", "alice"]);
        assert_eq!(app.user, "alice");
        assert!(app.group.is_empty());
    }
}
