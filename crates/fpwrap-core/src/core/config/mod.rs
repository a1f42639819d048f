pub(crate) mod context;

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub json: bool,
    pub emit: bool,
    pub emit_verbose: bool,
    pub config_dir: Option<String>,
}

impl GlobalOptions {
    /// Emit mode logs what would happen without touching the filesystem.
    pub fn emit_mode(&self) -> bool {
        self.emit || self.emit_verbose
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) paths: PathsConfig,
    pub(crate) lock_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// `<config>` of the filesystem layout; every state file lives below it.
    pub config_dir: PathBuf,
    /// Where wrappers go when no pointer and no CLI argument says otherwise.
    pub default_bin_dir: PathBuf,
    /// User-scope systemd unit directory.
    pub systemd_user_dir: PathBuf,
    /// Flatpak export directories the path unit watches.
    pub export_dirs: Vec<PathBuf>,
    /// User-scope data directory, for completion/man cleanup scanning.
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env(global: &GlobalOptions) -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture(), global)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, global: &GlobalOptions) -> Result<Self> {
        let home = snapshot
            .var("HOME")
            .map(PathBuf::from)
            .or_else(dirs_next::home_dir)
            .ok_or_else(|| anyhow!("cannot determine the home directory"))?;

        let xdg_config = snapshot
            .var("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"));
        let xdg_data = snapshot
            .var("XDG_DATA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local").join("share"));

        let config_dir = match &global.config_dir {
            Some(dir) => PathBuf::from(dir),
            None => xdg_config.join("fpwrap"),
        };

        let lock_wait = snapshot
            .var("FPWRAP_LOCK_WAIT_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map_or(DEFAULT_LOCK_WAIT, Duration::from_millis);

        Ok(Self {
            paths: PathsConfig {
                config_dir,
                default_bin_dir: home.join(".local").join("bin"),
                systemd_user_dir: xdg_config.join("systemd").join("user"),
                export_dirs: vec![
                    xdg_data.join("flatpak").join("exports"),
                    PathBuf::from("/var/lib/flatpak/exports"),
                ],
                data_dir: xdg_data,
            },
            lock_wait,
        })
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    pub fn lock_wait(&self) -> Duration {
        self.lock_wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_defaults_to_xdg() {
        let snapshot = EnvSnapshot::testing(&[
            ("HOME", "/home/u"),
            ("XDG_CONFIG_HOME", "/home/u/.config"),
        ]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).expect("config");
        assert_eq!(
            config.paths().config_dir,
            PathBuf::from("/home/u/.config/fpwrap")
        );
        assert_eq!(
            config.paths().default_bin_dir,
            PathBuf::from("/home/u/.local/bin")
        );
    }

    #[test]
    fn explicit_config_dir_wins() {
        let snapshot = EnvSnapshot::testing(&[("HOME", "/home/u")]);
        let global = GlobalOptions {
            config_dir: Some("/tmp/custom".into()),
            ..GlobalOptions::default()
        };
        let config = Config::from_snapshot(&snapshot, &global).expect("config");
        assert_eq!(config.paths().config_dir, PathBuf::from("/tmp/custom"));
    }

    #[test]
    fn lock_wait_env_override_parses() {
        let snapshot = EnvSnapshot::testing(&[("HOME", "/home/u"), ("FPWRAP_LOCK_WAIT_MS", "250")]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).expect("config");
        assert_eq!(config.lock_wait(), Duration::from_millis(250));
    }

    #[test]
    fn export_dirs_cover_user_and_system_scopes() {
        let snapshot = EnvSnapshot::testing(&[("HOME", "/home/u")]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default()).expect("config");
        assert_eq!(config.paths().export_dirs.len(), 2);
        assert!(config.paths().export_dirs[0]
            .to_string_lossy()
            .contains("flatpak/exports"));
    }
}
