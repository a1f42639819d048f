pub(crate) mod effects;
pub(crate) mod process;

use std::fmt;

use serde_json::{json, Value};

use crate::config::context::CommandInfo;
use crate::tooling::errors::EngineError;
use crate::tooling::outcome::{CommandStatus, ExecutionOutcome};

pub const FPWRAP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandGroup {
    Generate,
    SetPref,
    List,
    Info,
    Search,
    Remove,
    Alias,
    Unalias,
    Block,
    Unblock,
    Env,
    Script,
    Export,
    Import,
    Config,
    Cleanup,
    SystemdSetup,
    Systemd,
    Monitor,
    Completions,
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandGroup::Generate => "generate",
            CommandGroup::SetPref => "set-pref",
            CommandGroup::List => "list",
            CommandGroup::Info => "info",
            CommandGroup::Search => "search",
            CommandGroup::Remove => "rm",
            CommandGroup::Alias => "alias",
            CommandGroup::Unalias => "unalias",
            CommandGroup::Block => "block",
            CommandGroup::Unblock => "unblock",
            CommandGroup::Env => "env",
            CommandGroup::Script => "script",
            CommandGroup::Export => "export",
            CommandGroup::Import => "import",
            CommandGroup::Config => "config",
            CommandGroup::Cleanup => "cleanup",
            CommandGroup::SystemdSetup => "systemd-setup",
            CommandGroup::Systemd => "systemd",
            CommandGroup::Monitor => "monitor",
            CommandGroup::Completions => "completions",
        };
        f.write_str(name)
    }
}

#[must_use]
pub fn to_json_response(info: CommandInfo, outcome: &ExecutionOutcome, _code: i32) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "message": format_status_message(info, &outcome.message),
        "details": details,
    })
}

#[must_use]
pub fn format_status_message(info: CommandInfo, message: &str) -> String {
    let group_name = info.group.to_string();
    let prefix = if group_name == info.name {
        format!("fpwrap {}", info.name)
    } else {
        format!("fpwrap {} {}", group_name, info.name)
    };
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}

/// Maps a typed [`EngineError`] found in an error chain onto the outcome it
/// stands for; anything else stays a plain failure for the caller to render.
#[must_use]
pub fn engine_error_outcome(err: &anyhow::Error) -> Option<ExecutionOutcome> {
    for cause in err.chain() {
        if let Some(engine) = cause.downcast_ref::<EngineError>() {
            let mut details = json!({
                "reason": engine.reason(),
                "code": engine.code(),
            });
            if let Some(hint) = engine.hint() {
                details["hint"] = json!(hint);
            }
            let outcome = if engine.is_user_error() {
                ExecutionOutcome::user_error(engine.to_string(), details)
            } else {
                ExecutionOutcome::failure(engine.to_string(), details)
            };
            return Some(outcome);
        }
    }
    None
}
