#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

/// One isolated fpwrap environment: a temp HOME, a bin dir, and a stub PATH
/// directory standing in for flatpak, systemctl, crontab and notify-send.
pub struct TestBed {
    pub temp: TempDir,
    pub home: PathBuf,
    pub config_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub stub_dir: PathBuf,
    pub log: PathBuf,
    pub apps_dir: PathBuf,
    pub cron_state: PathBuf,
}

pub const ALL_STUBS: &[&str] = &["flatpak", "systemctl", "crontab", "notify-send"];

impl TestBed {
    pub fn new() -> Self {
        Self::with_stubs(ALL_STUBS)
    }

    pub fn with_stubs(stubs: &[&str]) -> Self {
        let temp = tempfile::Builder::new()
            .prefix("fpwrap-test")
            .tempdir()
            .expect("tempdir");
        let home = temp.path().join("home");
        let config_dir = home.join(".config").join("fpwrap");
        let bin_dir = home.join(".local").join("bin");
        let stub_dir = temp.path().join("stubs");
        let apps_dir = temp.path().join("apps");
        let log = temp.path().join("calls.log");
        let cron_state = temp.path().join("crontab.state");
        for dir in [&home, &stub_dir, &apps_dir] {
            fs::create_dir_all(dir).expect("create dir");
        }

        let bed = Self {
            temp,
            home,
            config_dir,
            bin_dir,
            stub_dir,
            log,
            apps_dir,
            cron_state,
        };
        for stub in stubs {
            bed.install_stub(stub);
        }
        bed
    }

    fn install_stub(&self, name: &str) {
        let body = match name {
            "flatpak" => FLATPAK_STUB,
            "systemctl" => SYSTEMCTL_STUB,
            "crontab" => CRONTAB_STUB,
            "notify-send" => NOTIFY_STUB,
            other => panic!("unknown stub {other}"),
        };
        // The stubs are POSIX sh scripts that shell out to coreutils (`cat`),
        // but fpwrap invokes them with a stub-only PATH. Give each stub the
        // host PATH internally so those tools resolve; this is the stub's own
        // lookup path and never affects how fpwrap itself locates binaries, so
        // the "omitted stub means absent" tests still hold.
        let host_path = std::env::var("PATH").unwrap_or_default();
        let script = body.replacen(
            "#!/bin/sh\n",
            &format!("#!/bin/sh\nexport PATH=\"{host_path}\"\n"),
            1,
        );
        write_executable(&self.stub_dir.join(name), &script);
    }

    /// Installed-apps fixture per scope, one id per line.
    pub fn set_apps(&self, user: &[&str], system: &[&str]) {
        fs::write(self.apps_dir.join("user"), format!("{}\n", user.join("\n")))
            .expect("user apps");
        fs::write(
            self.apps_dir.join("system"),
            format!("{}\n", system.join("\n")),
        )
        .expect("system apps");
    }

    /// Stub dir plus the host PATH; wrapper scripts need coreutils and bash.
    pub fn wrapper_path_var(&self) -> String {
        format!(
            "{}:{}",
            self.stub_dir.display(),
            std::env::var("PATH").unwrap_or_default()
        )
    }

    /// The fpwrap binary only ever spawns the stubbed externals, so its PATH
    /// is the stub dir alone; omitting a stub then really means "absent".
    pub fn cli_path_var(&self) -> String {
        self.stub_dir.display().to_string()
    }

    pub fn cmd(&self) -> assert_cmd::Command {
        let mut command = cargo_bin_cmd!("fpwrap");
        command
            .env_clear()
            .env("HOME", &self.home)
            .env("XDG_CONFIG_HOME", self.home.join(".config"))
            .env("XDG_DATA_HOME", self.home.join(".local").join("share"))
            .env("PATH", self.cli_path_var())
            .env("FPWRAP_LOCK_WAIT_MS", "500")
            .env("FPWRAP_TEST_LOG", &self.log)
            .env("FPWRAP_TEST_APPS", &self.apps_dir)
            .env("FPWRAP_TEST_CRON", &self.cron_state);
        command
    }

    /// Runs a generated wrapper through bash with the same stub PATH.
    pub fn wrapper_cmd(&self, name: &str) -> Command {
        let mut command = Command::new("bash");
        command
            .arg(self.bin_dir.join(name))
            .env_clear()
            .env("HOME", &self.home)
            .env("PATH", self.wrapper_path_var())
            .env("FPWRAP_TEST_LOG", &self.log)
            .env("FPWRAP_TEST_APPS", &self.apps_dir);
        command
    }

    pub fn wrapper_path(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    pub fn read_pref(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.config_dir.join(format!("{name}.pref")))
            .ok()
            .map(|text| text.trim().to_string())
    }

    pub fn calls(&self) -> String {
        fs::read_to_string(&self.log).unwrap_or_default()
    }

    /// A fake native binary on the stub PATH that records its argv and exits
    /// with `code`.
    pub fn install_system_binary(&self, name: &str, code: i32) -> PathBuf {
        let marker = self.temp.path().join(format!("{name}.system.log"));
        let body = format!(
            "#!/bin/sh\necho \"system-{name} $*\" >> \"{}\"\nexit {code}\n",
            marker.display()
        );
        write_executable(&self.stub_dir.join(name), &body);
        marker
    }
}

pub fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

const FLATPAK_STUB: &str = r#"#!/bin/sh
[ -n "${FPWRAP_TEST_LOG:-}" ] && echo "flatpak $*" >> "$FPWRAP_TEST_LOG"
case "${1:-}" in
    list)
        scope="user"
        for arg in "$@"; do
            [ "$arg" = "--system" ] && scope="system"
        done
        cat "${FPWRAP_TEST_APPS:-/nonexistent}/$scope" 2>/dev/null || true
        ;;
    run)
        shift
        echo "flatpak-ran $*"
        ;;
    info)
        echo "sandbox info for ${2:-}"
        ;;
    override)
        ;;
esac
exit 0
"#;

const SYSTEMCTL_STUB: &str = r#"#!/bin/sh
[ -n "${FPWRAP_TEST_LOG:-}" ] && echo "systemctl $*" >> "$FPWRAP_TEST_LOG"
exit 0
"#;

const CRONTAB_STUB: &str = r#"#!/bin/sh
state="${FPWRAP_TEST_CRON:-}"
case "${1:-}" in
    -l)
        [ -n "$state" ] && [ -f "$state" ] && cat "$state" && exit 0
        echo "no crontab" >&2
        exit 1
        ;;
    -)
        [ -n "$state" ] && cat > "$state"
        ;;
esac
exit 0
"#;

const NOTIFY_STUB: &str = r#"#!/bin/sh
[ -n "${FPWRAP_TEST_LOG:-}" ] && echo "notify-send $*" >> "$FPWRAP_TEST_LOG"
exit 0
"#;
