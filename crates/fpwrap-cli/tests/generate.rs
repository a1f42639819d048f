use std::fs;

mod common;

use common::{parse_json, TestBed};

#[test]
fn discovery_generation_and_idempotence() {
    let bed = TestBed::new();
    bed.set_apps(&["org.mozilla.firefox"], &["com.google.Chrome"]);

    let assert = bed
        .cmd()
        .args(["--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["created"], 2);
    assert_eq!(payload["details"]["removed"], 0);

    for (name, id) in [
        ("firefox", "org.mozilla.firefox"),
        ("chrome", "com.google.Chrome"),
    ] {
        let path = bed.wrapper_path(name);
        let body = fs::read_to_string(&path).expect("wrapper body");
        assert!(body.starts_with("#!/usr/bin/env bash\n"));
        assert!(body.contains("Generated by fpwrap"));
        assert!(body.contains(&format!("ID=\"{id}\"")));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("meta").permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    let before = fs::read_to_string(bed.wrapper_path("firefox")).expect("read");
    let assert = bed
        .cmd()
        .args(["--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["created"], 0);
    assert_eq!(payload["details"]["updated"], 0);
    assert_eq!(payload["details"]["removed"], 0);
    let after = fs::read_to_string(bed.wrapper_path("firefox")).expect("read");
    assert_eq!(before, after);
}

#[test]
fn orphan_sweep_cascades_state() {
    let bed = TestBed::new();
    bed.set_apps(&["org.mozilla.firefox", "com.google.Chrome"], &[]);
    bed.cmd()
        .args(["generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();

    bed.cmd()
        .args(["set-pref", "firefox", "flatpak"])
        .assert()
        .success();
    bed.cmd()
        .args(["env", "set", "chrome", "FOO", "bar"])
        .assert()
        .success();
    bed.cmd()
        .args(["alias", "browser", "chrome"])
        .assert()
        .success();

    // Chrome disappears from the installed set.
    bed.set_apps(&["org.mozilla.firefox"], &[]);
    let assert = bed
        .cmd()
        .args(["--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["removed"], 1);

    assert!(!bed.wrapper_path("chrome").exists());
    assert!(!bed.config_dir.join("chrome.env").exists());
    assert!(bed.wrapper_path("firefox").exists());
    assert_eq!(bed.read_pref("firefox").as_deref(), Some("flatpak"));
    let aliases = fs::read_to_string(bed.config_dir.join("aliases")).unwrap_or_default();
    assert!(!aliases.contains("browser"));
}

#[test]
fn blocklisted_apps_get_no_wrapper_and_lose_existing_ones() {
    let bed = TestBed::new();
    bed.set_apps(&["org.gimp.GIMP"], &[]);
    bed.cmd()
        .args(["generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    assert!(bed.wrapper_path("gimp").exists());

    bed.cmd()
        .args(["block", "org.gimp.GIMP"])
        .assert()
        .success();
    let assert = bed
        .cmd()
        .args(["--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["created"], 0);
    assert_eq!(payload["details"]["skipped_blocklisted"], 1);
    assert_eq!(payload["details"]["removed"], 1);
    assert!(!bed.wrapper_path("gimp").exists());
}

#[test]
fn foreign_file_collisions_are_skipped_untouched() {
    let bed = TestBed::new();
    bed.set_apps(&["org.mozilla.firefox"], &[]);
    fs::create_dir_all(&bed.bin_dir).expect("bin dir");
    fs::write(bed.wrapper_path("firefox"), "a hand-written script\n").expect("foreign");

    let assert = bed
        .cmd()
        .args(["--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["skipped_collision"], 1);
    assert_eq!(
        fs::read_to_string(bed.wrapper_path("firefox")).expect("read"),
        "a hand-written script\n"
    );
}

#[test]
fn emit_mode_reports_without_writing() {
    let bed = TestBed::new();
    bed.set_apps(&["org.mozilla.firefox"], &[]);
    let assert = bed
        .cmd()
        .args(["--json", "--emit", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["created"], 1);
    assert_eq!(payload["details"]["emit"], true);
    assert!(!bed.bin_dir.exists());
}

#[test]
fn broken_platform_is_a_reported_failure() {
    let bed = TestBed::new();
    // Both list scopes failing is indistinguishable from no platform at all.
    common::write_executable(
        &bed.stub_dir.join("flatpak"),
        "#!/bin/sh\necho 'error: cannot talk to the daemon' >&2\nexit 1\n",
    );
    let assert = bed
        .cmd()
        .args(["--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["details"]["reason"], "platform_unavailable");
    // The desktop notifier is told about generation failures.
    assert!(bed.calls().contains("notify-send"));
}

#[test]
fn bin_dir_argument_overrides_and_rewrites_the_pointer() {
    let bed = TestBed::new();
    bed.set_apps(&["org.mozilla.firefox"], &[]);
    bed.cmd()
        .args(["generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();

    let other = bed.temp.path().join("other-bin");
    bed.cmd().args(["generate"]).arg(&other).assert().success();

    let pointer = fs::read_to_string(bed.config_dir.join("bin_dir")).expect("pointer");
    assert_eq!(pointer.trim(), other.to_string_lossy());
    assert!(other.join("firefox").exists());
}
