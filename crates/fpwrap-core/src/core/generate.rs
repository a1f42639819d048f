use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use fpwrap_domain::{sanitize, ApplicationId};

use crate::config::context::CommandContext;
use crate::core::enumerate::list_installed;
use crate::core::reconcile::reconcile;
use crate::core::wrapper::probe::probe_wrapper;
use crate::core::wrapper::template::{render_wrapper, WrapperContext};
use crate::state::lock::BatchLock;
use crate::state::store::{atomic_write_file, ConfigStore};
use crate::tooling::outcome::ExecutionOutcome;

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Overrides (and rewrites) the bin-dir pointer when given.
    pub bin_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Per-application result of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    Created,
    Updated,
    Unchanged,
    SkippedBlocklisted,
    SkippedCollision,
    SkippedInvalidName,
    FailedIo,
}

impl GenerateOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerateOutcome::Created => "created",
            GenerateOutcome::Updated => "updated",
            GenerateOutcome::Unchanged => "unchanged",
            GenerateOutcome::SkippedBlocklisted => "skipped-blocklisted",
            GenerateOutcome::SkippedCollision => "skipped-collision",
            GenerateOutcome::SkippedInvalidName => "skipped-invalid-name",
            GenerateOutcome::FailedIo => "failed-io",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub skipped_blocklisted: usize,
    pub skipped_collision: usize,
    pub skipped_invalid: usize,
    pub failed: usize,
}

impl GenerateSummary {
    fn record(&mut self, outcome: GenerateOutcome) {
        match outcome {
            GenerateOutcome::Created => self.created += 1,
            GenerateOutcome::Updated => self.updated += 1,
            GenerateOutcome::Unchanged => self.unchanged += 1,
            GenerateOutcome::SkippedBlocklisted => self.skipped_blocklisted += 1,
            GenerateOutcome::SkippedCollision => self.skipped_collision += 1,
            GenerateOutcome::SkippedInvalidName => self.skipped_invalid += 1,
            GenerateOutcome::FailedIo => self.failed += 1,
        }
    }

    fn progressed(&self) -> bool {
        self.created + self.updated + self.unchanged > 0
    }
}

/// Full reconciliation + generation over the installed application set.
///
/// Orphan removal runs before generation, so an application id change looks
/// like a remove followed by a create within one batch. The batch holds the
/// advisory lock in non-emit mode; a second concurrent batch gets `Busy`.
pub fn generate_all(ctx: &CommandContext, request: &GenerateRequest) -> Result<ExecutionOutcome> {
    let store = ctx.store();
    let emit = ctx.emit_mode();

    let installed = match list_installed(ctx.platform()) {
        Ok(ids) => ids,
        Err(err) => return Ok(generation_failure(ctx, &err)),
    };

    if !emit {
        store.prepare()?;
    }
    let _lock = if emit {
        None
    } else {
        match BatchLock::acquire(&store.lock_path(), ctx.config().lock_wait()) {
            Ok(lock) => Some(lock),
            Err(err) => return Ok(generation_failure(ctx, &err)),
        }
    };

    let bin_dir = resolve_bin_dir(ctx, request, emit)?;
    let blocklist = store.read_blocklist()?;
    let effective: BTreeSet<String> = installed
        .iter()
        .map(|id| id.as_str().to_string())
        .filter(|id| !blocklist.contains(id))
        .collect();

    let reconciled = reconcile(store, &bin_dir, &effective, emit)?;

    let mut summary = GenerateSummary {
        removed: reconciled.removed_count(),
        ..GenerateSummary::default()
    };
    for id in &installed {
        let outcome = generate_one(store, &bin_dir, id, &blocklist, emit);
        if request.verbose || !matches!(outcome, GenerateOutcome::Unchanged) {
            tracing::debug!(id = %id, outcome = outcome.as_str(), "generated");
        }
        summary.record(outcome);
    }

    if summary.failed > 0 && !summary.progressed() {
        let outcome = ExecutionOutcome::failure(
            format!("generation made no progress ({} failures)", summary.failed),
            summary_details(&summary, &bin_dir, emit),
        );
        notify_failure(ctx, &outcome.message);
        return Ok(outcome);
    }

    let message = format!(
        "{} applications: {} created, {} updated, {} removed",
        installed.len(),
        summary.created,
        summary.updated,
        summary.removed
    );
    Ok(ExecutionOutcome::success(
        message,
        summary_details(&summary, &bin_dir, emit),
    ))
}

fn summary_details(summary: &GenerateSummary, bin_dir: &Path, emit: bool) -> serde_json::Value {
    json!({
        "created": summary.created,
        "updated": summary.updated,
        "unchanged": summary.unchanged,
        "removed": summary.removed,
        "skipped_blocklisted": summary.skipped_blocklisted,
        "skipped_collision": summary.skipped_collision,
        "skipped_invalid": summary.skipped_invalid,
        "failed": summary.failed,
        "bin_dir": bin_dir.display().to_string(),
        "emit": emit,
    })
}

fn generation_failure(ctx: &CommandContext, err: &anyhow::Error) -> ExecutionOutcome {
    let outcome = crate::core::runtime::engine_error_outcome(err)
        .unwrap_or_else(|| ExecutionOutcome::failure(format!("{err:#}"), json!({})));
    notify_failure(ctx, &outcome.message);
    outcome
}

fn notify_failure(ctx: &CommandContext, message: &str) {
    ctx.notifier()
        .notify("fpwrap generation failed", message);
}

/// The bin-dir argument wins over a disagreeing pointer and rewrites it.
fn resolve_bin_dir(
    ctx: &CommandContext,
    request: &GenerateRequest,
    emit: bool,
) -> Result<PathBuf> {
    let store = ctx.store();
    let pointer = store.read_bin_dir()?;
    let bin_dir = match (&request.bin_dir, pointer) {
        (Some(arg), pointer) => {
            let arg = crate::core::wrapper::path::lexical_canonicalize(arg);
            if pointer.as_deref() != Some(arg.as_path()) && !emit {
                store.write_bin_dir(&arg)?;
            }
            arg
        }
        (None, Some(pointer)) => pointer,
        (None, None) => {
            let default = ctx.config().paths().default_bin_dir.clone();
            if !emit {
                store.write_bin_dir(&default)?;
            }
            default
        }
    };
    if !emit {
        fs::create_dir_all(&bin_dir)
            .with_context(|| format!("failed to create {}", bin_dir.display()))?;
    }
    Ok(bin_dir)
}

/// Generates (or refreshes) the wrapper for one application.
pub(crate) fn generate_one(
    store: &ConfigStore,
    bin_dir: &Path,
    id: &ApplicationId,
    blocklist: &BTreeSet<String>,
    emit: bool,
) -> GenerateOutcome {
    if blocklist.contains(id.as_str()) {
        tracing::info!(id = %id, "skipping blocklisted application");
        return GenerateOutcome::SkippedBlocklisted;
    }

    let name = sanitize(id);
    let path = bin_dir.join(name.as_str());

    let mut existing_ours = false;
    match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_file() => match probe_wrapper(&path) {
            Some(probe) if probe.id == *id => existing_ours = true,
            Some(probe) => {
                tracing::warn!(
                    wrapper = %name,
                    ours = %probe.id,
                    incoming = %id,
                    "wrapper name already claimed by another application"
                );
                return GenerateOutcome::SkippedCollision;
            }
            None => {
                tracing::warn!(wrapper = %name, "name claimed by a foreign file; not touching it");
                return GenerateOutcome::SkippedCollision;
            }
        },
        Ok(_) => {
            tracing::warn!(wrapper = %name, "name claimed by a non-regular file");
            return GenerateOutcome::SkippedCollision;
        }
        Err(_) => {}
    }

    let rendered = match render_wrapper(&WrapperContext {
        name: name.as_str(),
        id: id.as_str(),
        pref_dir: &store.root().to_string_lossy(),
        bin_dir: &bin_dir.to_string_lossy(),
    }) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(id = %id, error = %err, "cannot render a wrapper for this id");
            return GenerateOutcome::SkippedInvalidName;
        }
    };

    if existing_ours && fs::read_to_string(&path).ok().as_deref() == Some(rendered.as_str()) {
        return GenerateOutcome::Unchanged;
    }

    if emit {
        tracing::info!(
            wrapper = %name,
            id = %id,
            path = %path.display(),
            "emit: would write wrapper"
        );
        return if existing_ours {
            GenerateOutcome::Updated
        } else {
            GenerateOutcome::Created
        };
    }

    match atomic_write_file(&path, rendered.as_bytes(), true) {
        Ok(()) => {
            if existing_ours {
                GenerateOutcome::Updated
            } else {
                GenerateOutcome::Created
            }
        }
        Err(err) => {
            tracing::warn!(wrapper = %name, error = %err, "failed to write wrapper");
            GenerateOutcome::FailedIo
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EnvSnapshot, GlobalOptions};
    use crate::core::runtime::effects::testing::FakeEffects;
    use crate::core::runtime::effects::SharedEffects;
    use crate::tooling::outcome::CommandStatus;

    struct Fixture {
        _dir: tempfile::TempDir,
        global: GlobalOptions,
        config: Config,
        bin_dir: PathBuf,
    }

    fn fixture(emit: bool) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let home = dir.path().to_string_lossy().to_string();
        let global = GlobalOptions {
            emit,
            config_dir: Some(dir.path().join("config").to_string_lossy().to_string()),
            ..GlobalOptions::default()
        };
        let snapshot = EnvSnapshot::testing(&[("HOME", &home), ("FPWRAP_LOCK_WAIT_MS", "200")]);
        let config = Config::from_snapshot(&snapshot, &global).expect("config");
        let bin_dir = dir.path().join("bin");
        Fixture {
            _dir: dir,
            global,
            config,
            bin_dir,
        }
    }

    fn run(fx: &Fixture, effects: SharedEffects) -> ExecutionOutcome {
        let ctx = CommandContext::for_tests(&fx.global, fx.config.clone(), effects);
        generate_all(
            &ctx,
            &GenerateRequest {
                bin_dir: Some(fx.bin_dir.clone()),
                verbose: false,
            },
        )
        .expect("generate_all")
    }

    #[test]
    fn creates_wrappers_for_each_installed_app() {
        let fx = fixture(false);
        let effects = FakeEffects::with_apps(
            &["org.mozilla.firefox"],
            &["com.google.Chrome"],
        );
        let outcome = run(&fx, effects);
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.details["created"], 2);
        assert!(fx.bin_dir.join("firefox").exists());
        assert!(fx.bin_dir.join("chrome").exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(fx.bin_dir.join("firefox"))
                .expect("meta")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn second_run_is_idempotent() {
        let fx = fixture(false);
        let effects = FakeEffects::with_apps(&["org.mozilla.firefox", "com.google.Chrome"], &[]);
        run(&fx, effects.clone());
        let before = fs::read_to_string(fx.bin_dir.join("firefox")).expect("read");
        let outcome = run(&fx, effects);
        assert_eq!(outcome.details["created"], 0);
        assert_eq!(outcome.details["updated"], 0);
        assert_eq!(outcome.details["removed"], 0);
        let after = fs::read_to_string(fx.bin_dir.join("firefox")).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn stale_wrapper_content_reports_updated() {
        let fx = fixture(false);
        let effects = FakeEffects::with_apps(&["org.mozilla.firefox"], &[]);
        run(&fx, effects.clone());
        let path = fx.bin_dir.join("firefox");
        let stale =
            "#!/usr/bin/env bash\n# Generated by fpwrap v0.0.0.\nNAME=\"firefox\"\nID=\"org.mozilla.firefox\"\n";
        fs::write(&path, stale).expect("stale");
        let outcome = run(&fx, effects);
        assert_eq!(outcome.details["updated"], 1);
    }

    #[test]
    fn foreign_file_collision_is_skipped_and_untouched() {
        let fx = fixture(false);
        fs::create_dir_all(&fx.bin_dir).expect("bin");
        let foreign = fx.bin_dir.join("firefox");
        fs::write(&foreign, "a native firefox\n").expect("foreign");
        let effects = FakeEffects::with_apps(&["org.mozilla.firefox"], &[]);
        let outcome = run(&fx, effects);
        assert_eq!(outcome.details["skipped_collision"], 1);
        assert_eq!(
            fs::read_to_string(&foreign).expect("read"),
            "a native firefox\n"
        );
    }

    #[test]
    fn colliding_ids_keep_the_first_wrapper() {
        let fx = fixture(false);
        let effects = FakeEffects::with_apps(&["org.one.tool"], &[]);
        run(&fx, effects);
        let effects = FakeEffects::with_apps(&["org.two.tool"], &[]);
        let outcome = run(&fx, effects);
        // org.one.tool is now orphaned and removed first, so org.two.tool
        // takes the name cleanly; this is the rename-looks-like-remove+create
        // ordering promise.
        assert_eq!(outcome.status, CommandStatus::Ok);
        let probe = probe_wrapper(&fx.bin_dir.join("tool")).expect("probe");
        assert_eq!(probe.id.as_str(), "org.two.tool");
    }

    #[test]
    fn blocklisted_apps_are_skipped_and_swept() {
        let fx = fixture(false);
        let effects = FakeEffects::with_apps(&["org.gimp.GIMP"], &[]);
        run(&fx, effects.clone());
        assert!(fx.bin_dir.join("gimp").exists());

        let store = ConfigStore::new(PathBuf::from(
            fx.global.config_dir.as_deref().expect("config dir"),
        ));
        let mut blocked = BTreeSet::new();
        blocked.insert("org.gimp.GIMP".to_string());
        store.write_blocklist(&blocked).expect("blocklist");

        let outcome = run(&fx, effects);
        assert_eq!(outcome.details["skipped_blocklisted"], 1);
        assert_eq!(outcome.details["removed"], 1);
        assert!(!fx.bin_dir.join("gimp").exists());
    }

    #[test]
    fn platform_unavailable_fails_and_notifies() {
        let fx = fixture(false);
        let effects = FakeEffects::unavailable();
        let notifier_probe = effects.clone();
        let outcome = run(&fx, effects);
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.details["reason"], "platform_unavailable");
        let sent = notifier_probe.notifier.sent.lock().expect("sent");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("generation failed"));
    }

    #[test]
    fn emit_mode_writes_nothing() {
        let fx = fixture(true);
        let effects = FakeEffects::with_apps(&["org.mozilla.firefox"], &[]);
        let outcome = run(&fx, effects);
        assert_eq!(outcome.details["created"], 1);
        assert!(!fx.bin_dir.exists());
    }

    #[test]
    fn held_lock_turns_into_busy() {
        let fx = fixture(false);
        let store = ConfigStore::new(PathBuf::from(
            fx.global.config_dir.as_deref().expect("config dir"),
        ));
        store.prepare().expect("prepare");
        let _held = BatchLock::acquire(&store.lock_path(), std::time::Duration::from_millis(100))
            .expect("hold");
        let effects = FakeEffects::with_apps(&["org.mozilla.firefox"], &[]);
        let outcome = run(&fx, effects);
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.details["reason"], "busy");
    }

    #[test]
    fn bin_dir_argument_rewrites_the_pointer() {
        let fx = fixture(false);
        let store = ConfigStore::new(PathBuf::from(
            fx.global.config_dir.as_deref().expect("config dir"),
        ));
        store.prepare().expect("prepare");
        store
            .write_bin_dir(Path::new("/somewhere/else"))
            .expect("pointer");
        let effects = FakeEffects::with_apps(&["org.mozilla.firefox"], &[]);
        run(&fx, effects);
        let pointer = store.read_bin_dir().expect("read").expect("set");
        assert_eq!(
            pointer,
            crate::core::wrapper::path::lexical_canonicalize(&fx.bin_dir)
        );
    }
}
