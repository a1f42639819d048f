use anyhow::Result;

use crate::core::runtime::FPWRAP_VERSION;
use crate::tooling::errors::EngineError;

/// Bumped whenever the rendered script changes shape; `generate` rewrites
/// wrappers whose content differs, so existing installs converge on the
/// current template on their next run.
pub const TEMPLATE_VERSION: &str = "1";

#[derive(Clone, Copy, Debug)]
pub struct WrapperContext<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub pref_dir: &'a str,
    pub bin_dir: &'a str,
}

/// Renders the wrapper script for one application.
///
/// Every slot value is checked before interpolation: double quotes and
/// newlines would break the shell assignments in the header, so they are
/// refused as `InvalidInput` rather than escaped.
pub fn render_wrapper(ctx: &WrapperContext<'_>) -> Result<String> {
    for (slot, value) in [
        ("NAME", ctx.name),
        ("ID", ctx.id),
        ("PREF_DIR", ctx.pref_dir),
        ("BIN_DIR", ctx.bin_dir),
    ] {
        validate_slot(slot, value)?;
    }
    Ok(WRAPPER_TEMPLATE
        .replace("{{TOOL_VERSION}}", FPWRAP_VERSION)
        .replace("{{TEMPLATE_VERSION}}", TEMPLATE_VERSION)
        .replace("{{NAME}}", ctx.name)
        .replace("{{ID}}", ctx.id)
        .replace("{{PREF_DIR}}", ctx.pref_dir)
        .replace("{{BIN_DIR}}", ctx.bin_dir))
}

fn validate_slot(slot: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(EngineError::InvalidInput(format!("template slot {slot} is empty")).into());
    }
    if value.contains('"') || value.contains('\n') {
        return Err(EngineError::InvalidInput(format!(
            "template slot {slot} contains a quote or newline: {value:?}"
        ))
        .into());
    }
    Ok(())
}

/// The wrapper runtime. This text is the public protocol between fpwrap and
/// the shell user; treat it as a fixture and change it deliberately.
const WRAPPER_TEMPLATE: &str = r##"#!/usr/bin/env bash
# Generated by fpwrap v{{TOOL_VERSION}} (template {{TEMPLATE_VERSION}}).
# Regenerated by `fpwrap generate`; manual edits will be overwritten.
NAME="{{NAME}}"
ID="{{ID}}"
PREF_DIR="{{PREF_DIR}}"
SCRIPT_BIN_DIR="{{BIN_DIR}}"

set -u

PREF_FILE="$PREF_DIR/$NAME.pref"
ENV_FILE="$PREF_DIR/$NAME.env"
SCRIPTS_DIR="$PREF_DIR/scripts/$NAME"
PRE_HOOK="$SCRIPTS_DIR/pre-launch.sh"
POST_HOOK="$SCRIPTS_DIR/post-run.sh"

# Per-app environment overlay, loaded before anything looks at argv.
if [ -f "$ENV_FILE" ]; then
    # shellcheck disable=SC1090
    . "$ENV_FILE"
fi

test_env_active() {
    [ "${FPWRAPPER_TEST_ENV:-}" = "true" ]
}

canon_path() {
    local input="$1"
    case "$input" in
        /*) ;;
        *) input="$PWD/$input" ;;
    esac
    local result="" seg
    local IFS='/'
    for seg in $input; do
        case "$seg" in
            ''|'.') ;;
            '..') result="${result%/*}" ;;
            *) result="$result/$seg" ;;
        esac
    done
    printf '%s\n' "${result:-/}"
}

find_system_binary() {
    local self dir candidate
    self="$(canon_path "${BASH_SOURCE[0]}")"
    local IFS=':'
    for dir in $PATH; do
        [ -n "$dir" ] || dir="."
        candidate="$dir/$NAME"
        if [ -f "$candidate" ] && [ -x "$candidate" ]; then
            if [ "$(canon_path "$candidate")" != "$self" ]; then
                printf '%s\n' "$candidate"
                return 0
            fi
        fi
    done
    return 1
}

is_interactive() {
    case "${FPWRAPPER_FORCE:-}" in
        interactive) return 0 ;;
        desktop|non-interactive) return 1 ;;
    esac
    [ -t 0 ] && [ -t 1 ]
}

read_pref() {
    local token=""
    if [ -f "$PREF_FILE" ]; then
        IFS= read -r token < "$PREF_FILE" || true
        token="${token%%[[:space:]]*}"
    fi
    case "$token" in
        system|flatpak) printf '%s\n' "$token" ;;
        *) printf 'none\n' ;;
    esac
}

write_pref() {
    local tmp
    if ! mkdir -p "$PREF_DIR" 2>/dev/null; then
        echo "WARN: cannot create $PREF_DIR" >&2
        return 1
    fi
    tmp="$(mktemp "$PREF_DIR/.$NAME.pref.XXXXXX")" || return 1
    printf '%s\n' "$1" > "$tmp" && mv -f "$tmp" "$PREF_FILE"
}

run_pre_hook() {
    [ -x "$PRE_HOOK" ] || return 0
    local code=0
    "$PRE_HOOK" "$@" || code=$?
    [ "$code" -eq 0 ] && return 0
    case "${FPWRAPPER_HOOK_MODE:-warn}" in
        ignore) ;;
        abort)
            echo "ERROR: pre-launch hook failed with exit code $code" >&2
            exit "$code"
            ;;
        *)
            echo "WARN: pre-launch hook failed with exit code $code" >&2
            ;;
    esac
    return 0
}

run_post_hook() {
    [ -x "$POST_HOOK" ] || return 0
    FPWRAPPER_EXIT_CODE="$1" \
    FPWRAPPER_SOURCE="$2" \
    FPWRAPPER_WRAPPER_NAME="$NAME" \
    FPWRAPPER_APP_ID="$ID" \
        "$POST_HOOK" || echo "WARN: post-run hook failed" >&2
}

guarded_exec() {
    if test_env_active; then
        printf 'fpwrapper-test: exec %s\n' "$*"
        exit 0
    fi
    exec "$@"
}

launch_via() {
    # $1 launch source, $2 system binary path (empty for flatpak), rest argv.
    local source="$1" sys_bin="$2"
    shift 2
    run_pre_hook "$@"
    if [ -x "$POST_HOOK" ] && ! test_env_active; then
        # A post-run hook means we must wait for the child instead of exec'ing.
        local code=0
        if [ "$source" = "system" ]; then
            "$sys_bin" "$@" || code=$?
        else
            flatpak run "$ID" "$@" || code=$?
        fi
        run_post_hook "$code" "$source"
        exit "$code"
    fi
    if [ "$source" = "system" ]; then
        guarded_exec "$sys_bin" "$@"
    else
        guarded_exec flatpak run "$ID" "$@"
    fi
}

print_help() {
    cat <<HELP
$NAME - fpwrap launch wrapper for $ID

Wrapper flags (recognized only as the first argument):
  --fpwrapper-help                      show this catalog
  --fpwrapper-info                      show name, app id, and preference
  --fpwrapper-config-dir                print the per-app data directory
  --fpwrapper-sandbox-info              show sandbox metadata (flatpak info)
  --fpwrapper-sandbox-yolo              grant the sandbox full filesystem access
  --fpwrapper-sandbox-reset             reset sandbox overrides
  --fpwrapper-edit-sandbox              interactive sandbox menu
  --fpwrapper-run-unrestricted [ARG..]  run without the sandbox
  --fpwrapper-set-override TARGET       persist 'system' or 'flatpak'
  --fpwrapper-set-preference TARGET     alias of --fpwrapper-set-override
  --fpwrapper-launch TARGET [ARG..]     one-shot launch override (not persisted)
  --fpwrapper-set-pre-script FILE       install the pre-launch hook
  --fpwrapper-set-post-script FILE      install the post-run hook
  --fpwrapper-remove-pre-script         remove the pre-launch hook
  --fpwrapper-remove-post-script        remove the post-run hook
  --fpwrapper-force-interactive         treat this launch as interactive

Anything else is passed through to the application.
HELP
}

edit_sandbox_menu() {
    if ! is_interactive; then
        echo "the sandbox menu needs an interactive terminal" >&2
        return 0
    fi
    printf 'Sandbox options for %s:\n' "$ID"
    printf '  1) show sandbox metadata\n'
    printf '  2) grant full filesystem access\n'
    printf '  3) reset overrides\n'
    printf '  q) quit\n'
    printf 'Select: '
    local selection
    IFS= read -r selection || selection="q"
    case "$selection" in
        1) flatpak info "$ID" ;;
        2) flatpak override --user "$ID" --filesystem=host ;;
        3) flatpak override --reset "$ID" ;;
        *) ;;
    esac
}

install_hook() {
    # $1 destination, $2 source file.
    if [ -z "${2:-}" ] || [ ! -f "$2" ]; then
        echo "ERROR: expected an existing script file" >&2
        return 2
    fi
    mkdir -p "$SCRIPTS_DIR" || return 1
    cp "$2" "$1" && chmod 0755 "$1"
}

one_shot=""
case "${1:-}" in
    --fpwrapper-help)
        print_help
        exit 0
        ;;
    --fpwrapper-info)
        printf 'name:       %s\n' "$NAME"
        printf 'app id:     %s\n' "$ID"
        printf 'preference: %s\n' "$(read_pref)"
        printf 'usage:      %s [--fpwrapper-help] [ARG...]\n' "$NAME"
        exit 0
        ;;
    --fpwrapper-config-dir)
        printf '%s/.var/app/%s\n' "$HOME" "$ID"
        exit 0
        ;;
    --fpwrapper-sandbox-info)
        if command -v flatpak >/dev/null 2>&1; then
            flatpak info "$ID"
            exit $?
        fi
        echo "flatpak is not installed; no sandbox information for $ID"
        exit 0
        ;;
    --fpwrapper-sandbox-yolo)
        flatpak override --user "$ID" --filesystem=host
        exit $?
        ;;
    --fpwrapper-sandbox-reset)
        flatpak override --reset "$ID"
        exit $?
        ;;
    --fpwrapper-edit-sandbox)
        edit_sandbox_menu
        exit $?
        ;;
    --fpwrapper-run-unrestricted)
        shift
        run_pre_hook "$@"
        guarded_exec flatpak run --no-sandbox "$ID" "$@"
        ;;
    --fpwrapper-set-override|--fpwrapper-set-preference)
        case "${2:-}" in
            system|flatpak)
                if write_pref "$2"; then
                    exit 0
                fi
                exit 1
                ;;
            *)
                echo "ERROR: expected 'system' or 'flatpak', got '${2:-}'" >&2
                exit 2
                ;;
        esac
        ;;
    --fpwrapper-launch)
        case "${2:-}" in
            system|flatpak)
                one_shot="$2"
                shift 2
                ;;
            *)
                echo "ERROR: --fpwrapper-launch expects 'system' or 'flatpak'" >&2
                exit 2
                ;;
        esac
        ;;
    --fpwrapper-set-pre-script)
        install_hook "$PRE_HOOK" "${2:-}"
        exit $?
        ;;
    --fpwrapper-set-post-script)
        install_hook "$POST_HOOK" "${2:-}"
        exit $?
        ;;
    --fpwrapper-remove-pre-script)
        rm -f "$PRE_HOOK"
        exit 0
        ;;
    --fpwrapper-remove-post-script)
        rm -f "$POST_HOOK"
        exit 0
        ;;
    --fpwrapper-force-interactive)
        FPWRAPPER_FORCE="interactive"
        export FPWRAPPER_FORCE
        shift
        ;;
esac

sys_bin="$(find_system_binary)" || sys_bin=""

if [ -n "$one_shot" ]; then
    # One-shot overrides never touch the preference file.
    if [ "$one_shot" = "system" ] && [ -n "$sys_bin" ]; then
        launch_via system "$sys_bin" "$@"
    fi
    launch_via flatpak "" "$@"
fi

pref="$(read_pref)"
case "$pref" in
    system)
        if [ -n "$sys_bin" ]; then
            launch_via system "$sys_bin" "$@"
        fi
        # The system binary is gone; remember the sandbox from now on.
        write_pref flatpak || true
        launch_via flatpak "" "$@"
        ;;
    flatpak)
        launch_via flatpak "" "$@"
        ;;
esac

# No preference yet: pin one without asking when we cannot ask.
if ! is_interactive; then
    if [ -n "$sys_bin" ]; then
        write_pref system || true
        launch_via system "$sys_bin" "$@"
    fi
    write_pref flatpak || true
    launch_via flatpak "" "$@"
fi

if [ -z "$sys_bin" ]; then
    write_pref flatpak || true
    launch_via flatpak "" "$@"
fi

printf '%s exists both as a flatpak (%s) and as a system binary (%s).\n' \
    "$NAME" "$ID" "$sys_bin"
choice=""
while [ -z "$choice" ]; do
    printf 'Default launch target, [f]latpak or [s]ystem? '
    IFS= read -r answer || answer="f"
    case "$answer" in
        f|F|flatpak|'') choice="flatpak" ;;
        s|S|system) choice="system" ;;
        *) echo "Please answer 'f' or 's'." ;;
    esac
done
write_pref "$choice" || true
if [ "$choice" = "system" ]; then
    launch_via system "$sys_bin" "$@"
fi
launch_via flatpak "" "$@"
"##;
