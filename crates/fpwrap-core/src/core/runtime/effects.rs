use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::process::{run_command, run_command_with_input, RunOutput};

/// Installation scopes the app platform distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformScope {
    User,
    System,
}

impl PlatformScope {
    pub fn flag(self) -> &'static str {
        match self {
            PlatformScope::User => "--user",
            PlatformScope::System => "--system",
        }
    }
}

/// The app platform CLI (`flatpak`), addressed only through this boundary so
/// tests can inject a fake instead of mocking process spawns.
pub trait PlatformCli: Send + Sync {
    /// Absolute path of the platform binary, if it is on the search path.
    fn locate(&self) -> Option<PathBuf>;
    /// `flatpak list --app --columns=application` for one scope.
    fn list_apps(&self, scope: PlatformScope) -> Result<RunOutput>;
}

/// The user-scope service supervisor (`systemctl --user`).
pub trait ServiceManager: Send + Sync {
    fn available(&self) -> bool;
    fn run(&self, args: &[String]) -> Result<RunOutput>;
}

/// The periodic-job editor (`crontab`).
pub trait CronEditor: Send + Sync {
    fn available(&self) -> bool;
    /// Current table; an absent table reads as empty.
    fn read(&self) -> Result<String>;
    fn write(&self, table: &str) -> Result<()>;
}

/// The desktop notifier (`notify-send`). Best effort everywhere.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}

pub trait Effects: Send + Sync {
    fn platform(&self) -> &dyn PlatformCli;
    fn services(&self) -> &dyn ServiceManager;
    fn cron(&self) -> &dyn CronEditor;
    fn notifier(&self) -> &dyn Notifier;
}

pub struct SystemEffects {
    platform: Arc<SystemPlatformCli>,
    services: Arc<SystemServiceManager>,
    cron: Arc<SystemCronEditor>,
    notifier: Arc<SystemNotifier>,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            platform: Arc::new(SystemPlatformCli),
            services: Arc::new(SystemServiceManager),
            cron: Arc::new(SystemCronEditor),
            notifier: Arc::new(SystemNotifier),
        }
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn platform(&self) -> &dyn PlatformCli {
        self.platform.as_ref()
    }

    fn services(&self) -> &dyn ServiceManager {
        self.services.as_ref()
    }

    fn cron(&self) -> &dyn CronEditor {
        self.cron.as_ref()
    }

    fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }
}

struct SystemPlatformCli;

impl PlatformCli for SystemPlatformCli {
    fn locate(&self) -> Option<PathBuf> {
        which::which("flatpak").ok()
    }

    fn list_apps(&self, scope: PlatformScope) -> Result<RunOutput> {
        let binary = self
            .locate()
            .context("flatpak is not on the search path")?;
        run_command(
            &binary,
            &[
                "list".to_string(),
                scope.flag().to_string(),
                "--app".to_string(),
                "--columns=application".to_string(),
            ],
        )
    }
}

struct SystemServiceManager;

impl ServiceManager for SystemServiceManager {
    fn available(&self) -> bool {
        which::which("systemctl").is_ok()
    }

    fn run(&self, args: &[String]) -> Result<RunOutput> {
        let binary = which::which("systemctl").context("systemctl is not on the search path")?;
        let mut full = vec!["--user".to_string()];
        full.extend_from_slice(args);
        run_command(&binary, &full)
    }
}

struct SystemCronEditor;

impl CronEditor for SystemCronEditor {
    fn available(&self) -> bool {
        which::which("crontab").is_ok()
    }

    fn read(&self) -> Result<String> {
        let binary = which::which("crontab").context("crontab is not on the search path")?;
        let output = run_command(&binary, &["-l".to_string()])?;
        if output.success() {
            Ok(output.stdout)
        } else {
            // `crontab -l` exits non-zero when the user has no table yet.
            Ok(String::new())
        }
    }

    fn write(&self, table: &str) -> Result<()> {
        let binary = which::which("crontab").context("crontab is not on the search path")?;
        let output = run_command_with_input(&binary, &["-".to_string()], table)?;
        if output.success() {
            Ok(())
        } else {
            anyhow::bail!("crontab rejected the new table: {}", output.stderr.trim());
        }
    }
}

struct SystemNotifier;

impl Notifier for SystemNotifier {
    fn notify(&self, summary: &str, body: &str) {
        let Ok(binary) = which::which("notify-send") else {
            return;
        };
        let _ = run_command(&binary, &[summary.to_string(), body.to_string()]);
    }
}

pub type SharedEffects = Arc<dyn Effects>;
