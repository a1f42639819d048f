use anyhow::Result;

use crate::config::{Config, GlobalOptions};
use crate::core::runtime::effects::{
    CronEditor, Effects, Notifier, PlatformCli, ServiceManager, SharedEffects,
};
use crate::core::runtime::CommandGroup;
use crate::state::store::ConfigStore;

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

/// Everything a command handler needs: parsed globals, resolved paths, the
/// state store, and the injected subprocess boundary.
pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    store: ConfigStore,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    /// Builds a context from the process environment. Pure: no directories
    /// are created here; handlers call [`ConfigStore::prepare`] when they
    /// intend to write.
    pub fn new(global: &'a GlobalOptions, effects: SharedEffects) -> Result<Self> {
        let config = Config::from_env(global)?;
        let store = ConfigStore::new(config.paths().config_dir.clone());
        Ok(Self {
            global,
            config,
            store,
            effects,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        global: &'a GlobalOptions,
        config: Config,
        effects: SharedEffects,
    ) -> Self {
        let store = ConfigStore::new(config.paths().config_dir.clone());
        Self {
            global,
            config,
            store,
            effects,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    pub fn emit_mode(&self) -> bool {
        self.global.emit_mode()
    }

    pub fn effects(&self) -> &dyn Effects {
        self.effects.as_ref()
    }

    pub fn platform(&self) -> &dyn PlatformCli {
        self.effects.platform()
    }

    pub fn services(&self) -> &dyn ServiceManager {
        self.effects.services()
    }

    pub fn cron(&self) -> &dyn CronEditor {
        self.effects.cron()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.effects.notifier()
    }
}
