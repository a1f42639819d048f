use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use fpwrap_domain::{
    AliasError, ApplicationId, ExportDocument, LaunchTarget, EXPORT_VERSION,
};

use crate::config::context::CommandContext;
use crate::core::wrapper::probe::scan_bin_dir;
use crate::state::store::{atomic_write_file, ConfigStore, POST_HOOK_FILE, PRE_HOOK_FILE};
use crate::tooling::outcome::ExecutionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Pre,
    Post,
}

impl HookKind {
    pub fn file_name(self) -> &'static str {
        match self {
            HookKind::Pre => PRE_HOOK_FILE,
            HookKind::Post => POST_HOOK_FILE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HookKind::Pre => "pre-launch",
            HookKind::Post => "post-run",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AliasRequest {
    pub alias: String,
    pub target: String,
    pub validate_target: bool,
}

#[derive(Debug, Clone)]
pub struct RemoveRequest {
    pub name: String,
    pub force: bool,
}

/// The bin directory the manager operates on: the pointer if set, the
/// configured default otherwise. Reads never rewrite the pointer.
fn current_bin_dir(ctx: &CommandContext) -> Result<PathBuf> {
    Ok(ctx
        .store()
        .read_bin_dir()?
        .unwrap_or_else(|| ctx.config().paths().default_bin_dir.clone()))
}

fn emit_skip(ctx: &CommandContext, action: &str) -> Option<ExecutionOutcome> {
    if !ctx.emit_mode() {
        return None;
    }
    tracing::info!(action, "emit: skipping write");
    Some(ExecutionOutcome::success(
        format!("emit: would {action}"),
        json!({ "emit": true }),
    ))
}

// --- preferences ---------------------------------------------------------

pub fn set_preference(ctx: &CommandContext, name: &str, token: &str) -> Result<ExecutionOutcome> {
    let Some(target) = LaunchTarget::parse_token(token) else {
        return Ok(ExecutionOutcome::user_error(
            format!("invalid preference token {token:?} (expected 'system' or 'flatpak')"),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    };
    if name.trim().is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "wrapper name is empty",
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }
    if let Some(outcome) = emit_skip(ctx, &format!("set preference of {name} to {token}")) {
        return Ok(outcome);
    }
    ctx.store().prepare()?;
    ctx.store().write_preference(name, target)?;
    Ok(ExecutionOutcome::success(
        format!("{name} now prefers the {token} launch"),
        json!({ "name": name, "preference": token }),
    ))
}

pub fn get_preference(ctx: &CommandContext, name: &str) -> Result<ExecutionOutcome> {
    let preference = ctx.store().read_preference(name)?;
    let token = preference.map_or("none", LaunchTarget::as_token);
    Ok(ExecutionOutcome::success(
        format!("{name}: {token}"),
        json!({ "name": name, "preference": token }),
    ))
}

// --- aliases -------------------------------------------------------------

pub fn create_alias(ctx: &CommandContext, request: &AliasRequest) -> Result<ExecutionOutcome> {
    let alias = request.alias.trim();
    let target = request.target.trim();
    if alias.is_empty() || target.is_empty() {
        return Ok(ExecutionOutcome::user_error(
            "alias and target must be non-empty",
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }

    let bin_dir = current_bin_dir(ctx)?;
    if request.validate_target && !bin_dir.join(target).is_file() {
        return Ok(ExecutionOutcome::user_error(
            format!("no wrapper named {target:?} in {}", bin_dir.display()),
            json!({ "reason": "invalid_input", "code": "FW120", "target": target }),
        ));
    }
    let mut overlap = false;
    if bin_dir.join(alias).is_file() {
        // I3: overlap with an existing wrapper is warned about, not refused.
        tracing::warn!(alias, "a wrapper with this name exists; the wrapper wins on PATH");
        overlap = true;
    }

    let mut table = ctx.store().read_aliases()?;
    if let Err(err) = table.insert(alias, target) {
        let (message, reason, code) = match err {
            AliasError::AlreadyExists(_) => (
                format!("alias {alias:?} already exists"),
                "invalid_input",
                "FW120",
            ),
            AliasError::CycleOrDepth(_) => (
                format!("alias {alias:?} -> {target:?} would introduce a cycle"),
                "alias_cycle",
                "FW150",
            ),
            other => (other.to_string(), "invalid_input", "FW120"),
        };
        return Ok(ExecutionOutcome::user_error(
            message,
            json!({ "reason": reason, "code": code }),
        ));
    }

    if let Some(outcome) = emit_skip(ctx, &format!("create alias {alias} -> {target}")) {
        return Ok(outcome);
    }
    ctx.store().prepare()?;
    ctx.store().write_aliases(&table)?;
    Ok(ExecutionOutcome::success(
        format!("alias {alias} -> {target}"),
        json!({ "alias": alias, "target": target, "shadowed_by_wrapper": overlap }),
    ))
}

pub fn remove_alias(ctx: &CommandContext, alias: &str) -> Result<ExecutionOutcome> {
    let mut table = ctx.store().read_aliases()?;
    match table.remove(alias) {
        Ok(target) => {
            if let Some(outcome) = emit_skip(ctx, &format!("remove alias {alias}")) {
                return Ok(outcome);
            }
            ctx.store().write_aliases(&table)?;
            Ok(ExecutionOutcome::success(
                format!("removed alias {alias} -> {target}"),
                json!({ "alias": alias, "target": target }),
            ))
        }
        Err(_) => Ok(ExecutionOutcome::user_error(
            format!("no alias named {alias:?}"),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        )),
    }
}

// --- blocklist -----------------------------------------------------------

pub fn block_app(ctx: &CommandContext, id: &str) -> Result<ExecutionOutcome> {
    let Ok(id) = ApplicationId::parse(id) else {
        return Ok(ExecutionOutcome::user_error(
            format!("{id:?} is not an application id"),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    };
    let mut blocklist = ctx.store().read_blocklist()?;
    let added = blocklist.insert(id.as_str().to_string());
    if let Some(outcome) = emit_skip(ctx, &format!("block {id}")) {
        return Ok(outcome);
    }
    if added {
        ctx.store().prepare()?;
        ctx.store().write_blocklist(&blocklist)?;
    }
    Ok(ExecutionOutcome::success(
        format!("{id} is blocklisted"),
        json!({ "id": id.as_str(), "changed": added }),
    ))
}

pub fn unblock_app(ctx: &CommandContext, id: &str) -> Result<ExecutionOutcome> {
    let mut blocklist = ctx.store().read_blocklist()?;
    let removed = blocklist.remove(id.trim());
    if let Some(outcome) = emit_skip(ctx, &format!("unblock {id}")) {
        return Ok(outcome);
    }
    if removed {
        ctx.store().write_blocklist(&blocklist)?;
    }
    Ok(ExecutionOutcome::success(
        format!("{id} is not blocklisted"),
        json!({ "id": id, "changed": removed }),
    ))
}

// --- environment overlays ------------------------------------------------

fn valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn set_env(
    ctx: &CommandContext,
    name: &str,
    key: &str,
    value: &str,
) -> Result<ExecutionOutcome> {
    if !valid_env_key(key) {
        return Ok(ExecutionOutcome::user_error(
            format!("{key:?} is not a valid environment variable name"),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }
    if value.contains('\n') || value.contains('"') {
        return Ok(ExecutionOutcome::user_error(
            "environment values must not contain quotes or newlines",
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }
    if let Some(outcome) = emit_skip(ctx, &format!("set {key} for {name}")) {
        return Ok(outcome);
    }
    ctx.store().prepare()?;
    let mut vars = ctx.store().read_env(name)?;
    vars.insert(key.to_string(), value.to_string());
    ctx.store().write_env(name, &vars)?;
    Ok(ExecutionOutcome::success(
        format!("{name}: {key} set"),
        json!({ "name": name, "key": key }),
    ))
}

pub fn unset_env(ctx: &CommandContext, name: &str, key: &str) -> Result<ExecutionOutcome> {
    let mut vars = ctx.store().read_env(name)?;
    let removed = vars.remove(key).is_some();
    if let Some(outcome) = emit_skip(ctx, &format!("unset {key} for {name}")) {
        return Ok(outcome);
    }
    if removed {
        ctx.store().write_env(name, &vars)?;
    }
    Ok(ExecutionOutcome::success(
        format!("{name}: {key} unset"),
        json!({ "name": name, "key": key, "changed": removed }),
    ))
}

// --- hook scripts --------------------------------------------------------

pub fn set_hook(
    ctx: &CommandContext,
    name: &str,
    kind: HookKind,
    source: &Path,
) -> Result<ExecutionOutcome> {
    if !source.is_file() {
        return Ok(ExecutionOutcome::user_error(
            format!("{} is not a file", source.display()),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }
    if let Some(outcome) = emit_skip(ctx, &format!("install {} hook for {name}", kind.label())) {
        return Ok(outcome);
    }
    ctx.store().prepare()?;
    ctx.store().install_hook(name, kind.file_name(), source)?;
    Ok(ExecutionOutcome::success(
        format!("{name}: {} hook installed", kind.label()),
        json!({ "name": name, "hook": kind.label() }),
    ))
}

pub fn remove_hook(ctx: &CommandContext, name: &str, kind: HookKind) -> Result<ExecutionOutcome> {
    if let Some(outcome) = emit_skip(ctx, &format!("remove {} hook for {name}", kind.label())) {
        return Ok(outcome);
    }
    let removed = ctx.store().remove_hook(name, kind.file_name())?;
    Ok(ExecutionOutcome::success(
        format!("{name}: {} hook removed", kind.label()),
        json!({ "name": name, "hook": kind.label(), "changed": removed }),
    ))
}

// --- wrapper removal -----------------------------------------------------

pub fn remove_wrapper(ctx: &CommandContext, request: &RemoveRequest) -> Result<ExecutionOutcome> {
    let name = request.name.trim();
    let bin_dir = current_bin_dir(ctx)?;
    let path = bin_dir.join(name);

    let exists = path.is_file();
    if exists && crate::core::wrapper::probe::probe_wrapper(&path).is_none() && !request.force {
        return Ok(ExecutionOutcome::user_error(
            format!("{} was not generated by fpwrap (use --force to remove anyway)", path.display()),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }
    if !exists && !request.force {
        return Ok(ExecutionOutcome::user_error(
            format!("no wrapper named {name:?} in {}", bin_dir.display()),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    }

    if let Some(outcome) = emit_skip(ctx, &format!("remove wrapper {name}")) {
        return Ok(outcome);
    }
    if exists {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    let report = ctx.store().cascade_remove(name)?;
    Ok(ExecutionOutcome::success(
        format!("removed {name}"),
        json!({
            "name": name,
            "wrapper_removed": exists,
            "preference_removed": report.preference,
            "env_removed": report.env,
            "scripts_removed": report.scripts,
            "aliases_removed": report.aliases,
        }),
    ))
}

// --- export / import -----------------------------------------------------

fn collect_export(store: &ConfigStore) -> Result<ExportDocument> {
    let mut doc = ExportDocument::new();
    for (name, target) in store.list_preferences()? {
        doc.preferences.insert(name, target.as_token().to_string());
    }
    for name in store.list_env_names()? {
        let vars = store.read_env(&name)?;
        if !vars.is_empty() {
            doc.env.insert(name, vars);
        }
    }
    for (alias, target) in store.read_aliases()?.iter() {
        doc.aliases.insert(alias.to_string(), target.to_string());
    }
    doc.blocklist = store.read_blocklist()?.into_iter().collect();
    doc.normalize();
    Ok(doc)
}

pub fn export_state(ctx: &CommandContext, path: &Path) -> Result<ExecutionOutcome> {
    let doc = collect_export(ctx.store())?;
    let text = serde_json::to_string_pretty(&doc).context("failed to serialize export")?;
    if let Some(outcome) = emit_skip(ctx, &format!("export state to {}", path.display())) {
        return Ok(outcome);
    }
    let mut contents = text;
    contents.push('\n');
    atomic_write_file(path, contents.as_bytes(), false)?;
    Ok(ExecutionOutcome::success(
        format!("exported state to {}", path.display()),
        json!({
            "path": path.display().to_string(),
            "preferences": doc.preferences.len(),
            "env": doc.env.len(),
            "aliases": doc.aliases.len(),
            "blocklist": doc.blocklist.len(),
        }),
    ))
}

/// Import replaces the portable state wholesale; it never merges.
pub fn import_state(ctx: &CommandContext, path: &Path) -> Result<ExecutionOutcome> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                format!("cannot read {}: {err}", path.display()),
                json!({ "reason": "invalid_input", "code": "FW120" }),
            ));
        }
    };
    let doc: ExportDocument = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(err) => {
            return Ok(ExecutionOutcome::user_error(
                format!("{} is not a valid export document: {err}", path.display()),
                json!({ "reason": "invalid_input", "code": "FW120" }),
            ));
        }
    };
    if doc.version > EXPORT_VERSION {
        return Ok(ExecutionOutcome::user_error(
            format!(
                "export version {} is newer than this fpwrap understands ({EXPORT_VERSION})",
                doc.version
            ),
            json!({ "reason": "invalid_input", "code": "FW120", "version": doc.version }),
        ));
    }

    // Validate everything up front so a bad document changes nothing.
    let mut aliases = fpwrap_domain::AliasTable::new();
    for (alias, target) in &doc.aliases {
        if let Err(err) = aliases.insert(alias, target) {
            return Ok(ExecutionOutcome::user_error(
                format!("alias table in {} is invalid: {err}", path.display()),
                json!({ "reason": "alias_cycle", "code": "FW150" }),
            ));
        }
    }
    let mut preferences = Vec::new();
    for (name, token) in &doc.preferences {
        let Some(target) = LaunchTarget::parse_token(token) else {
            return Ok(ExecutionOutcome::user_error(
                format!("preference for {name} has unknown token {token:?}"),
                json!({ "reason": "invalid_input", "code": "FW120" }),
            ));
        };
        preferences.push((name.clone(), target));
    }

    if let Some(outcome) = emit_skip(ctx, &format!("import state from {}", path.display())) {
        return Ok(outcome);
    }

    let store = ctx.store();
    store.prepare()?;
    for (name, _) in store.list_preferences()? {
        store.remove_preference(&name)?;
    }
    for name in store.list_env_names()? {
        store.remove_env(&name)?;
    }
    for (name, target) in &preferences {
        store.write_preference(name, *target)?;
    }
    for (name, vars) in &doc.env {
        store.write_env(name, vars)?;
    }
    store.write_aliases(&aliases)?;
    let blocklist: BTreeSet<String> = doc.blocklist.iter().cloned().collect();
    store.write_blocklist(&blocklist)?;

    Ok(ExecutionOutcome::success(
        format!("imported state from {}", path.display()),
        json!({
            "path": path.display().to_string(),
            "preferences": preferences.len(),
            "env": doc.env.len(),
            "aliases": doc.aliases.len(),
            "blocklist": doc.blocklist.len(),
        }),
    ))
}

// --- listing / info / search ---------------------------------------------

fn wrapper_rows(ctx: &CommandContext) -> Result<Vec<serde_json::Value>> {
    let bin_dir = current_bin_dir(ctx)?;
    let mut rows = Vec::new();
    for (path, probe) in scan_bin_dir(&bin_dir)? {
        let name = probe
            .name
            .map_or_else(
                || {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default()
                        .to_string()
                },
                |n| n.as_str().to_string(),
            );
        let preference = ctx
            .store()
            .read_preference(&name)?
            .map_or("none", LaunchTarget::as_token);
        rows.push(json!({
            "name": name,
            "id": probe.id.as_str(),
            "preference": preference,
        }));
    }
    Ok(rows)
}

pub fn list_wrappers(ctx: &CommandContext, all: bool) -> Result<ExecutionOutcome> {
    let rows = wrapper_rows(ctx)?;
    let mut details = json!({ "wrappers": rows });
    if all {
        let aliases: BTreeMap<String, String> = ctx
            .store()
            .read_aliases()?
            .iter()
            .map(|(a, t)| (a.to_string(), t.to_string()))
            .collect();
        details["aliases"] = json!(aliases);
        details["blocklist"] = json!(ctx.store().read_blocklist()?);
    }
    let count = details["wrappers"].as_array().map_or(0, Vec::len);
    Ok(ExecutionOutcome::success(
        format!("{count} wrappers"),
        details,
    ))
}

pub fn info_wrapper(ctx: &CommandContext, name: &str) -> Result<ExecutionOutcome> {
    let aliases = ctx.store().read_aliases()?;
    let resolved = match aliases.resolve(name) {
        Ok(resolved) => resolved,
        Err(_) => {
            return Ok(ExecutionOutcome::user_error(
                format!("alias chain for {name:?} hits a cycle or the depth limit"),
                json!({ "reason": "alias_cycle", "code": "FW150" }),
            ));
        }
    };

    let bin_dir = current_bin_dir(ctx)?;
    let path = bin_dir.join(&resolved);
    let Some(probe) = crate::core::wrapper::probe::probe_wrapper(&path) else {
        return Ok(ExecutionOutcome::user_error(
            format!("no wrapper named {resolved:?} in {}", bin_dir.display()),
            json!({ "reason": "invalid_input", "code": "FW120" }),
        ));
    };

    let preference = ctx
        .store()
        .read_preference(&resolved)?
        .map_or("none", LaunchTarget::as_token);
    let env = ctx.store().read_env(&resolved)?;
    let pre_hook = ctx
        .store()
        .hook_path(&resolved, PRE_HOOK_FILE)
        .is_file();
    let post_hook = ctx
        .store()
        .hook_path(&resolved, POST_HOOK_FILE)
        .is_file();
    let aliased_by: Vec<String> = aliases
        .iter()
        .filter(|(_, target)| *target == resolved)
        .map(|(alias, _)| alias.to_string())
        .collect();

    Ok(ExecutionOutcome::success(
        format!("{resolved} wraps {}", probe.id),
        json!({
            "name": resolved,
            "id": probe.id.as_str(),
            "path": path.display().to_string(),
            "preference": preference,
            "env": env,
            "pre_hook": pre_hook,
            "post_hook": post_hook,
            "aliased_by": aliased_by,
        }),
    ))
}

pub fn search_wrappers(ctx: &CommandContext, query: &str) -> Result<ExecutionOutcome> {
    let needle = query.to_ascii_lowercase();
    let rows: Vec<serde_json::Value> = wrapper_rows(ctx)?
        .into_iter()
        .filter(|row| {
            let name = row["name"].as_str().unwrap_or_default().to_ascii_lowercase();
            let id = row["id"].as_str().unwrap_or_default().to_ascii_lowercase();
            name.contains(&needle) || id.contains(&needle)
        })
        .collect();
    let count = rows.len();
    Ok(ExecutionOutcome::success(
        format!("{count} matches for {query:?}"),
        json!({ "query": query, "wrappers": rows }),
    ))
}

pub fn show_config(ctx: &CommandContext) -> Result<ExecutionOutcome> {
    let store = ctx.store();
    let bin_dir = current_bin_dir(ctx)?;
    Ok(ExecutionOutcome::success(
        format!("configuration in {}", store.root().display()),
        json!({
            "config_dir": store.root().display().to_string(),
            "bin_dir": bin_dir.display().to_string(),
            "bin_dir_pinned": store.read_bin_dir()?.is_some(),
            "preferences": store.list_preferences()?.len(),
            "env_overlays": store.list_env_names()?.len(),
            "aliases": store.read_aliases()?.len(),
            "blocklist": store.read_blocklist()?.len(),
        }),
    ))
}
