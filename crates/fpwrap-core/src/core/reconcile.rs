use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use fpwrap_domain::{sanitize, WrapperName};

use crate::core::wrapper::probe::probe_wrapper;
use crate::state::store::ConfigStore;

#[derive(Debug, Default)]
pub struct ReconcileSummary {
    pub removed: Vec<WrapperName>,
    pub removed_symlinks: usize,
}

impl ReconcileSummary {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Removes wrappers whose embedded id is no longer installed, cascading the
/// deletion to the preference file, env overlay, hook scripts, and any alias
/// targeting the wrapper. Symlinks into a removed wrapper go with it; foreign
/// files are never touched.
///
/// Callers pass the *effective* installed set — blocklisted ids are excluded
/// upstream, which is what makes a blocklisted app look uninstalled here.
pub fn reconcile(
    store: &ConfigStore,
    bin_dir: &Path,
    installed: &BTreeSet<String>,
    emit: bool,
) -> Result<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    let entries = match fs::read_dir(bin_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(summary),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", bin_dir.display()))
        }
    };

    let mut symlinks: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut removed_names: BTreeSet<String> = BTreeSet::new();

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            if let Some(target) = symlink_target_within(&path, bin_dir) {
                symlinks.push((path, target));
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Some(probe) = probe_wrapper(&path) else {
            continue;
        };
        if installed.contains(probe.id.as_str()) {
            continue;
        }

        let name = probe
            .name
            .unwrap_or_else(|| sanitize(&probe.id));
        tracing::info!(wrapper = %name, id = %probe.id, "removing orphaned wrapper");
        if !emit {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            let report = store.cascade_remove(name.as_str())?;
            for alias in &report.aliases {
                tracing::info!(alias, target = %name, "removed alias of orphaned wrapper");
            }
        }
        removed_names.insert(name.as_str().to_string());
        summary.removed.push(name);
    }

    // Second pass: symlinks whose target wrapper just went away.
    for (link, target) in symlinks {
        let Some(target_name) = target.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if removed_names.contains(target_name) {
            tracing::info!(link = %link.display(), "removing symlink into removed wrapper");
            if !emit {
                fs::remove_file(&link)
                    .with_context(|| format!("failed to remove {}", link.display()))?;
            }
            summary.removed_symlinks += 1;
        }
    }

    Ok(summary)
}

/// Resolves a symlink target by name within `bin_dir` only; links pointing
/// outside the bin directory are foreign and left alone.
fn symlink_target_within(link: &Path, bin_dir: &Path) -> Option<PathBuf> {
    let target = fs::read_link(link).ok()?;
    let resolved = if target.is_absolute() {
        target
    } else {
        bin_dir.join(target)
    };
    let resolved = crate::core::wrapper::path::lexical_canonicalize(&resolved);
    let canonical_bin = crate::core::wrapper::path::lexical_canonicalize(bin_dir);
    if resolved.parent() == Some(canonical_bin.as_path()) {
        Some(resolved)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wrapper::template::{render_wrapper, WrapperContext};
    use fpwrap_domain::LaunchTarget;
    use std::collections::BTreeMap;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: ConfigStore,
        bin_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("config"));
        store.prepare().expect("prepare");
        let bin_dir = dir.path().join("bin");
        fs::create_dir_all(&bin_dir).expect("bin dir");
        Fixture {
            _dir: dir,
            store,
            bin_dir,
        }
    }

    fn place_wrapper(fx: &Fixture, name: &str, id: &str) -> PathBuf {
        let script = render_wrapper(&WrapperContext {
            name,
            id,
            pref_dir: &fx.store.root().to_string_lossy(),
            bin_dir: &fx.bin_dir.to_string_lossy(),
        })
        .expect("render");
        let path = fx.bin_dir.join(name);
        fs::write(&path, script).expect("write");
        path
    }

    fn installed(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn removes_orphans_and_cascades_state() {
        let fx = fixture();
        place_wrapper(&fx, "firefox", "org.mozilla.firefox");
        place_wrapper(&fx, "chrome", "com.google.Chrome");
        fx.store
            .write_preference("firefox", LaunchTarget::Sandboxed)
            .expect("pref");
        let mut vars = BTreeMap::new();
        vars.insert("FOO".to_string(), "bar".to_string());
        fx.store.write_env("chrome", &vars).expect("env");
        let mut aliases = fpwrap_domain::AliasTable::new();
        aliases.insert("browser", "chrome").expect("alias");
        fx.store.write_aliases(&aliases).expect("aliases");

        let summary = reconcile(
            &fx.store,
            &fx.bin_dir,
            &installed(&["org.mozilla.firefox"]),
            false,
        )
        .expect("reconcile");

        assert_eq!(summary.removed_count(), 1);
        assert!(!fx.bin_dir.join("chrome").exists());
        assert!(fx.bin_dir.join("firefox").exists());
        assert!(!fx.store.env_path("chrome").exists());
        assert!(fx.store.preference_path("firefox").exists());
        assert!(fx.store.read_aliases().expect("aliases").is_empty());
    }

    #[test]
    fn leaves_foreign_files_alone() {
        let fx = fixture();
        let foreign = fx.bin_dir.join("native-tool");
        fs::write(&foreign, "#!/bin/sh\nexit 0\n").expect("foreign");

        let summary = reconcile(&fx.store, &fx.bin_dir, &installed(&[]), false).expect("reconcile");
        assert_eq!(summary.removed_count(), 0);
        assert!(foreign.exists());
    }

    #[cfg(unix)]
    #[test]
    fn removes_symlinks_into_removed_wrappers() {
        let fx = fixture();
        place_wrapper(&fx, "chrome", "com.google.Chrome");
        let link = fx.bin_dir.join("browser");
        std::os::unix::fs::symlink("chrome", &link).expect("symlink");

        let summary = reconcile(&fx.store, &fx.bin_dir, &installed(&[]), false).expect("reconcile");
        assert_eq!(summary.removed_count(), 1);
        assert_eq!(summary.removed_symlinks, 1);
        assert!(!link.exists());
    }

    #[cfg(unix)]
    #[test]
    fn keeps_symlinks_pointing_outside_the_bin_dir() {
        let fx = fixture();
        let link = fx.bin_dir.join("elsewhere");
        std::os::unix::fs::symlink("/usr/bin/true", &link).expect("symlink");

        reconcile(&fx.store, &fx.bin_dir, &installed(&[]), false).expect("reconcile");
        assert!(link.symlink_metadata().is_ok());
    }

    #[test]
    fn emit_mode_touches_nothing() {
        let fx = fixture();
        place_wrapper(&fx, "chrome", "com.google.Chrome");
        let summary = reconcile(&fx.store, &fx.bin_dir, &installed(&[]), true).expect("reconcile");
        assert_eq!(summary.removed_count(), 1);
        assert!(fx.bin_dir.join("chrome").exists());
    }

    #[test]
    fn empty_bin_dir_is_a_no_op() {
        let fx = fixture();
        let summary = reconcile(&fx.store, &fx.bin_dir, &installed(&[]), false).expect("reconcile");
        assert_eq!(summary.removed_count(), 0);
    }
}
