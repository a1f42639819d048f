use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use crate::config::context::CommandContext;
use crate::core::generate::{generate_all, GenerateRequest};
use crate::state::store::atomic_write_file;
use crate::tooling::outcome::{CommandStatus, ExecutionOutcome};

pub const SERVICE_UNIT: &str = "fpwrap-generate.service";
pub const PATH_UNIT: &str = "fpwrap-generate.path";
pub const TIMER_UNIT: &str = "fpwrap-generate.timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemdAction {
    Enable,
    Disable,
    Status,
    Test,
}

#[derive(Debug, Clone)]
pub struct MonitorRequest {
    pub interval: Duration,
    /// Bounded loop for tests; `None` runs until interrupted.
    pub iterations: Option<u64>,
}

fn generator_command() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.to_str().map(ToString::to_string))
        .unwrap_or_else(|| "fpwrap".to_string())
}

fn render_service_unit(exec: &str) -> String {
    format!(
        "[Unit]\n\
         Description=Regenerate flatpak launch wrappers\n\
         \n\
         [Service]\n\
         Type=oneshot\n\
         ExecStart={exec} generate\n"
    )
}

fn render_path_unit(export_dirs: &[std::path::PathBuf]) -> String {
    let mut watches = String::new();
    for dir in export_dirs {
        watches.push_str(&format!("PathChanged={}\n", dir.display()));
    }
    format!(
        "[Unit]\n\
         Description=Watch flatpak exports for application changes\n\
         \n\
         [Path]\n\
         {watches}\
         Unit={SERVICE_UNIT}\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n"
    )
}

// Timer units carry only [Unit] [Timer] [Install]; the work lives in the
// service unit.
fn render_timer_unit() -> String {
    format!(
        "[Unit]\n\
         Description=Daily flatpak wrapper regeneration\n\
         \n\
         [Timer]\n\
         OnCalendar=daily\n\
         Persistent=true\n\
         Unit={SERVICE_UNIT}\n\
         \n\
         [Install]\n\
         WantedBy=timers.target\n"
    )
}

pub(crate) fn cron_line(exec: &str) -> String {
    format!("0 */6 * * * {exec} generate")
}

pub(crate) fn cron_entry_present(table: &str) -> bool {
    table
        .lines()
        .any(|line| line.contains("fpwrap") && line.contains(" generate"))
}

pub(crate) fn strip_cron_entries(table: &str) -> String {
    let mut kept: Vec<&str> = table
        .lines()
        .filter(|line| !(line.contains("fpwrap") && line.contains(" generate")))
        .collect();
    while kept.last().is_some_and(|line| line.trim().is_empty()) {
        kept.pop();
    }
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Installs the supervisor integration: three user units plus enablement,
/// falling back to a six-hourly crontab entry, and failing with the manual
/// command when neither scheduler exists.
pub fn systemd_setup(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let exec = generator_command();
    let unit_dir = ctx.config().paths().systemd_user_dir.clone();

    if ctx.services().available() {
        if ctx.emit_mode() {
            return Ok(ExecutionOutcome::success(
                format!("emit: would install units into {}", unit_dir.display()),
                json!({ "emit": true, "units": [SERVICE_UNIT, PATH_UNIT, TIMER_UNIT] }),
            ));
        }
        write_units(&unit_dir, &exec, ctx.config().paths().export_dirs.as_slice())?;
        let reload = ctx.services().run(&["daemon-reload".to_string()])?;
        if !reload.success() {
            return Ok(ExecutionOutcome::failure(
                "systemctl --user daemon-reload failed",
                json!({ "stderr": reload.stderr.trim() }),
            ));
        }
        let enable = ctx.services().run(&[
            "enable".to_string(),
            "--now".to_string(),
            PATH_UNIT.to_string(),
            TIMER_UNIT.to_string(),
        ])?;
        if !enable.success() {
            return Ok(ExecutionOutcome::failure(
                "could not enable the fpwrap units",
                json!({ "stderr": enable.stderr.trim() }),
            ));
        }
        return Ok(ExecutionOutcome::success(
            "systemd path and timer units installed and enabled",
            json!({
                "unit_dir": unit_dir.display().to_string(),
                "units": [SERVICE_UNIT, PATH_UNIT, TIMER_UNIT],
            }),
        ));
    }

    if ctx.cron().available() {
        if ctx.emit_mode() {
            return Ok(ExecutionOutcome::success(
                "emit: would install a crontab entry",
                json!({ "emit": true, "entry": cron_line(&exec) }),
            ));
        }
        let table = ctx.cron().read()?;
        if cron_entry_present(&table) {
            return Ok(ExecutionOutcome::success(
                "crontab entry already installed",
                json!({ "entry": cron_line(&exec), "changed": false }),
            ));
        }
        let mut updated = table;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&cron_line(&exec));
        updated.push('\n');
        ctx.cron().write(&updated)?;
        return Ok(ExecutionOutcome::success(
            "systemd unavailable; installed a six-hourly crontab entry",
            json!({ "entry": cron_line(&exec), "changed": true }),
        ));
    }

    Ok(ExecutionOutcome::failure(
        format!("neither systemd nor crontab is available; run `{exec} generate` manually"),
        json!({ "reason": "scheduler_unavailable", "manual": format!("{exec} generate") }),
    ))
}

fn write_units(unit_dir: &Path, exec: &str, export_dirs: &[std::path::PathBuf]) -> Result<()> {
    atomic_write_file(
        &unit_dir.join(SERVICE_UNIT),
        render_service_unit(exec).as_bytes(),
        false,
    )?;
    atomic_write_file(
        &unit_dir.join(PATH_UNIT),
        render_path_unit(export_dirs).as_bytes(),
        false,
    )?;
    atomic_write_file(&unit_dir.join(TIMER_UNIT), render_timer_unit().as_bytes(), false)?;
    Ok(())
}

pub fn systemd_control(ctx: &CommandContext, action: SystemdAction) -> Result<ExecutionOutcome> {
    if !ctx.services().available() {
        return Ok(ExecutionOutcome::failure(
            "systemctl is not on the search path",
            json!({ "reason": "scheduler_unavailable" }),
        ));
    }
    let args: Vec<String> = match action {
        SystemdAction::Enable => vec![
            "enable".into(),
            "--now".into(),
            PATH_UNIT.into(),
            TIMER_UNIT.into(),
        ],
        SystemdAction::Disable => vec![
            "disable".into(),
            "--now".into(),
            PATH_UNIT.into(),
            TIMER_UNIT.into(),
        ],
        SystemdAction::Status => vec![
            "status".into(),
            "--no-pager".into(),
            PATH_UNIT.into(),
            TIMER_UNIT.into(),
        ],
        SystemdAction::Test => vec!["start".into(), SERVICE_UNIT.into()],
    };
    if ctx.emit_mode() && action != SystemdAction::Status {
        return Ok(ExecutionOutcome::success(
            format!("emit: would run systemctl --user {}", args.join(" ")),
            json!({ "emit": true }),
        ));
    }
    let output = ctx.services().run(&args)?;
    let outcome = if output.success() {
        ExecutionOutcome::success(
            format!("systemctl --user {} succeeded", args[0]),
            json!({ "stdout": output.stdout, "passthrough": true }),
        )
    } else {
        ExecutionOutcome::failure(
            format!("systemctl --user {} exited with {}", args[0], output.code),
            json!({ "stdout": output.stdout, "stderr": output.stderr }),
        )
    };
    Ok(outcome)
}

/// Foreground reconcile-and-generate loop for hosts without a scheduler.
pub fn monitor(ctx: &CommandContext, request: &MonitorRequest) -> Result<ExecutionOutcome> {
    let mut iteration = 0u64;
    loop {
        let outcome = generate_all(ctx, &GenerateRequest::default())?;
        iteration += 1;
        let done = match request.iterations {
            Some(limit) => iteration >= limit,
            None => false,
        };
        if ctx.emit_mode() || done {
            return Ok(ExecutionOutcome {
                status: outcome.status,
                message: format!("{} (after {iteration} passes)", outcome.message),
                details: outcome.details,
            });
        }
        if outcome.status != CommandStatus::Ok {
            tracing::warn!(message = %outcome.message, "generation pass failed; will retry");
        }
        std::thread::sleep(request.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EnvSnapshot, GlobalOptions};
    use crate::core::runtime::effects::testing::FakeEffects;

    struct Fixture {
        _dir: tempfile::TempDir,
        global: GlobalOptions,
        config: Config,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let home = dir.path().to_string_lossy().to_string();
        let global = GlobalOptions {
            config_dir: Some(dir.path().join("config").to_string_lossy().to_string()),
            ..GlobalOptions::default()
        };
        let snapshot = EnvSnapshot::testing(&[
            ("HOME", &home),
            ("XDG_CONFIG_HOME", &format!("{home}/.config")),
        ]);
        let config = Config::from_snapshot(&snapshot, &global).expect("config");
        Fixture {
            _dir: dir,
            global,
            config,
        }
    }

    #[test]
    fn setup_writes_three_units_and_enables_two() {
        let fx = fixture();
        let effects = FakeEffects::with_apps(&[], &[]);
        let ctx = CommandContext::for_tests(&fx.global, fx.config.clone(), effects.clone());
        let outcome = systemd_setup(&ctx).expect("setup");
        assert_eq!(outcome.status, CommandStatus::Ok);

        let unit_dir = &fx.config.paths().systemd_user_dir;
        for unit in [SERVICE_UNIT, PATH_UNIT, TIMER_UNIT] {
            assert!(unit_dir.join(unit).exists(), "missing {unit}");
        }
        let calls = effects.services.calls.lock().expect("calls");
        assert_eq!(calls[0], vec!["daemon-reload".to_string()]);
        assert!(calls[1].contains(&PATH_UNIT.to_string()));
        assert!(calls[1].contains(&TIMER_UNIT.to_string()));
    }

    #[test]
    fn timer_unit_has_only_unit_timer_install_sections() {
        let text = render_timer_unit();
        for section in ["[Unit]", "[Timer]", "[Install]"] {
            assert!(text.contains(section));
        }
        assert!(!text.contains("[Service]"));
        assert!(text.contains("OnCalendar=daily"));
        assert!(text.contains("Persistent=true"));
    }

    #[test]
    fn path_unit_watches_every_export_dir() {
        let dirs = vec![
            std::path::PathBuf::from("/home/u/.local/share/flatpak/exports"),
            std::path::PathBuf::from("/var/lib/flatpak/exports"),
        ];
        let text = render_path_unit(&dirs);
        assert_eq!(text.matches("PathChanged=").count(), 2);
        assert!(text.contains(&format!("Unit={SERVICE_UNIT}")));
    }

    #[test]
    fn cron_fallback_is_idempotent() {
        let fx = fixture();
        let mut effects = FakeEffects::with_apps(&[], &[]);
        std::sync::Arc::get_mut(&mut effects)
            .expect("fresh arc")
            .services
            .available = false;
        let ctx = CommandContext::for_tests(&fx.global, fx.config.clone(), effects.clone());

        let first = systemd_setup(&ctx).expect("setup");
        assert_eq!(first.status, CommandStatus::Ok);
        assert_eq!(first.details["changed"], true);
        let second = systemd_setup(&ctx).expect("setup");
        assert_eq!(second.details["changed"], false);
        let table = effects.cron.table.lock().expect("table").clone();
        assert_eq!(table.matches("generate").count(), 1);
        assert!(table.contains("0 */6 * * *"));
    }

    #[test]
    fn no_scheduler_reports_the_manual_command() {
        let fx = fixture();
        let mut effects = FakeEffects::with_apps(&[], &[]);
        {
            let inner = std::sync::Arc::get_mut(&mut effects).expect("fresh arc");
            inner.services.available = false;
            inner.cron.available = false;
        }
        let ctx = CommandContext::for_tests(&fx.global, fx.config.clone(), effects);
        let outcome = systemd_setup(&ctx).expect("setup");
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert!(outcome.details["manual"]
            .as_str()
            .is_some_and(|m| m.ends_with(" generate")));
    }

    #[test]
    fn strip_cron_entries_keeps_foreign_lines() {
        let table = "0 */6 * * * /usr/bin/fpwrap generate\n30 1 * * * backup\n";
        let stripped = strip_cron_entries(table);
        assert_eq!(stripped, "30 1 * * * backup\n");
        assert!(!cron_entry_present(&stripped));
    }
}
