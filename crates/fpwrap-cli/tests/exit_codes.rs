mod common;

use common::{parse_json, TestBed};

#[test]
fn success_exits_zero() {
    let bed = TestBed::new();
    bed.set_apps(&[], &[]);
    bed.cmd()
        .args(["generate"])
        .arg(&bed.bin_dir)
        .assert()
        .code(0);
}

#[test]
fn unknown_subcommand_exits_two() {
    let bed = TestBed::new();
    bed.cmd().args(["frobnicate"]).assert().code(2);
}

#[test]
fn semantic_user_errors_exit_two() {
    let bed = TestBed::new();
    bed.cmd()
        .args(["set-pref", "firefox", "sandbox"])
        .assert()
        .code(2);
}

#[test]
fn operational_failures_exit_one() {
    let bed = TestBed::with_stubs(&["systemctl", "crontab", "notify-send"]);
    // No flatpak stub and a stub-only PATH: the platform is truly absent.
    bed.cmd()
        .args(["generate"])
        .arg(&bed.bin_dir)
        .assert()
        .code(1);
}

#[test]
fn errors_print_to_stderr_not_stdout() {
    let bed = TestBed::new();
    let assert = bed
        .cmd()
        .args(["set-pref", "firefox", "sandbox"])
        .assert()
        .code(2);
    let output = assert.get_output();
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR:"), "got {stderr}");
}

#[test]
fn version_and_help_render() {
    let bed = TestBed::new();
    bed.cmd().arg("--version").assert().success();
    let assert = bed.cmd().arg("--help").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("generate"));
    assert!(stdout.contains("cleanup"));
}

#[test]
fn completions_emit_a_script() {
    let bed = TestBed::new();
    let assert = bed.cmd().args(["completions", "bash"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("fpwrap"));
    assert!(!stdout.is_empty());
}

#[test]
fn quiet_suppresses_human_output_but_not_json() {
    let bed = TestBed::new();
    bed.set_apps(&[], &[]);
    let assert = bed
        .cmd()
        .args(["--quiet", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    assert!(assert.get_output().stdout.is_empty());

    let assert = bed
        .cmd()
        .args(["--quiet", "--json", "generate"])
        .arg(&bed.bin_dir)
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
}
