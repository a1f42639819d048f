use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde_json::json;

use crate::config::context::CommandContext;
use crate::core::service::{cron_entry_present, strip_cron_entries, PATH_UNIT, SERVICE_UNIT, TIMER_UNIT};
use crate::core::wrapper::probe::scan_bin_dir;
use crate::state::store::{ALIASES_FILE, BIN_DIR_POINTER, BLOCKLIST_FILE, LOCK_FILE};
use crate::tooling::outcome::ExecutionOutcome;

#[derive(Debug, Clone, Default)]
pub struct CleanupRequest {
    pub dry_run: bool,
    pub assume_yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Wrapper,
    Symlink,
    Preference,
    EnvOverlay,
    ScriptsDir,
    AliasTable,
    Blocklist,
    BinDirPointer,
    LockFile,
    SystemdUnit,
    CompletionFile,
    ManPage,
}

impl ItemKind {
    fn label(self) -> &'static str {
        match self {
            ItemKind::Wrapper => "wrapper",
            ItemKind::Symlink => "symlink",
            ItemKind::Preference => "preference",
            ItemKind::EnvOverlay => "env overlay",
            ItemKind::ScriptsDir => "hook scripts",
            ItemKind::AliasTable => "alias table",
            ItemKind::Blocklist => "blocklist",
            ItemKind::BinDirPointer => "bin-dir pointer",
            ItemKind::LockFile => "lock file",
            ItemKind::SystemdUnit => "systemd unit",
            ItemKind::CompletionFile => "completion file",
            ItemKind::ManPage => "man page",
        }
    }

    fn is_dir(self) -> bool {
        matches!(self, ItemKind::ScriptsDir)
    }
}

#[derive(Debug, Clone)]
struct Item {
    kind: ItemKind,
    path: PathBuf,
}

/// Everything the cleanup engine found to remove, in typed buckets.
#[derive(Debug, Default)]
pub struct CleanupScan {
    items: Vec<Item>,
    cron_entry: bool,
    config_dir: Option<PathBuf>,
}

impl CleanupScan {
    pub fn total(&self) -> usize {
        self.items.len() + usize::from(self.cron_entry)
    }

    fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .items
            .iter()
            .map(|item| format!("{}: {}", item.kind.label(), item.path.display()))
            .collect();
        if self.cron_entry {
            labels.push("crontab: fpwrap generate entry".to_string());
        }
        labels
    }
}

fn scan(ctx: &CommandContext) -> Result<CleanupScan> {
    let store = ctx.store();
    let mut scan = CleanupScan::default();

    let bin_dir = store
        .read_bin_dir()?
        .unwrap_or_else(|| ctx.config().paths().default_bin_dir.clone());
    let mut our_names = Vec::new();
    for (path, _probe) in scan_bin_dir(&bin_dir)? {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            our_names.push(name.to_string());
        }
        scan.items.push(Item {
            kind: ItemKind::Wrapper,
            path,
        });
    }
    if let Ok(entries) = fs::read_dir(&bin_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_symlink() {
                continue;
            }
            let Ok(target) = fs::read_link(&path) else {
                continue;
            };
            let target_name = target
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if our_names.iter().any(|n| n == target_name) {
                scan.items.push(Item {
                    kind: ItemKind::Symlink,
                    path,
                });
            }
        }
    }

    for (name, _) in store.list_preferences()? {
        scan.items.push(Item {
            kind: ItemKind::Preference,
            path: store.preference_path(&name),
        });
    }
    for name in store.list_env_names()? {
        scan.items.push(Item {
            kind: ItemKind::EnvOverlay,
            path: store.env_path(&name),
        });
    }
    for name in store.list_script_names()? {
        scan.items.push(Item {
            kind: ItemKind::ScriptsDir,
            path: store.scripts_dir(&name),
        });
    }
    for (kind, file) in [
        (ItemKind::AliasTable, ALIASES_FILE),
        (ItemKind::Blocklist, BLOCKLIST_FILE),
        (ItemKind::BinDirPointer, BIN_DIR_POINTER),
        (ItemKind::LockFile, LOCK_FILE),
    ] {
        let path = store.root().join(file);
        if path.exists() {
            scan.items.push(Item { kind, path });
        }
    }

    let unit_dir = &ctx.config().paths().systemd_user_dir;
    for unit in [SERVICE_UNIT, PATH_UNIT, TIMER_UNIT] {
        let path = unit_dir.join(unit);
        if path.exists() {
            scan.items.push(Item {
                kind: ItemKind::SystemdUnit,
                path,
            });
        }
    }

    if ctx.cron().available() {
        if let Ok(table) = ctx.cron().read() {
            scan.cron_entry = cron_entry_present(&table);
        }
    }

    let data_dir = &ctx.config().paths().data_dir;
    for (kind, candidate) in [
        (
            ItemKind::CompletionFile,
            data_dir.join("bash-completion/completions/fpwrap"),
        ),
        (
            ItemKind::CompletionFile,
            data_dir.join("fish/vendor_completions.d/fpwrap.fish"),
        ),
        (
            ItemKind::CompletionFile,
            data_dir.join("zsh/site-functions/_fpwrap"),
        ),
        (ItemKind::ManPage, data_dir.join("man/man1/fpwrap.1")),
    ] {
        if candidate.exists() {
            scan.items.push(Item {
                kind,
                path: candidate,
            });
        }
    }

    if store.root().exists() {
        scan.config_dir = Some(store.root().to_path_buf());
    }
    Ok(scan)
}

/// Scan-and-remove across wrappers, state, and scheduler artifacts.
///
/// `confirm` is asked once with the item count before anything is removed;
/// it is skipped under `--yes`, in dry-run mode, and when there is nothing to
/// do. Individual failures log and continue; the outcome is a failure when
/// any targeted item survived.
pub fn cleanup(
    ctx: &CommandContext,
    request: &CleanupRequest,
    confirm: &mut dyn FnMut(usize) -> bool,
) -> Result<ExecutionOutcome> {
    let scan = scan(ctx)?;
    let labels = scan.labels();

    if scan.total() == 0 {
        return Ok(ExecutionOutcome::success(
            "nothing to clean up",
            json!({ "removed": 0, "items": [] }),
        ));
    }

    if request.dry_run || ctx.emit_mode() {
        return Ok(ExecutionOutcome::success(
            format!("would remove {} items", scan.total()),
            json!({ "dry_run": true, "items": labels }),
        ));
    }

    if !request.assume_yes && !confirm(scan.total()) {
        return Ok(ExecutionOutcome::user_error(
            "cleanup cancelled",
            json!({ "reason": "cancelled", "items": labels }),
        ));
    }

    let mut removed = 0usize;
    let mut failed: Vec<String> = Vec::new();
    for item in &scan.items {
        let result = if item.kind.is_dir() {
            fs::remove_dir_all(&item.path)
        } else {
            fs::remove_file(&item.path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => removed += 1,
            Err(err) => {
                tracing::warn!(path = %item.path.display(), %err, "cleanup item failed");
                failed.push(format!("{}: {err}", item.path.display()));
            }
        }
    }

    if scan.cron_entry {
        let table = ctx.cron().read()?;
        let stripped = strip_cron_entries(&table);
        match ctx.cron().write(&stripped) {
            Ok(()) => removed += 1,
            Err(err) => failed.push(format!("crontab: {err}")),
        }
    }

    // The config dir goes last, and only when the purge emptied it.
    if let Some(config_dir) = &scan.config_dir {
        let empty = fs::read_dir(config_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            if let Err(err) = fs::remove_dir(config_dir) {
                tracing::warn!(%err, "could not remove the empty config dir");
            }
        }
    }

    if failed.is_empty() {
        Ok(ExecutionOutcome::success(
            format!("removed {removed} items"),
            json!({ "removed": removed, "items": labels }),
        ))
    } else {
        Ok(ExecutionOutcome::failure(
            format!("{} of {} items could not be removed", failed.len(), scan.total()),
            json!({ "removed": removed, "failed": failed }),
        ))
    }
}
