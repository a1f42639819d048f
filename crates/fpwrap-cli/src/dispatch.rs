use std::io::{self, BufRead, Write};
use std::time::Duration;

use atty::Stream;
use color_eyre::Result;
use fpwrap_core::{
    self as core, AliasRequest, CleanupRequest, CommandContext, CommandGroup, CommandInfo,
    ExecutionOutcome, GenerateRequest, HookKind, MonitorRequest, RemoveRequest, SystemdAction,
};

use crate::{
    CleanupArgs, CommandCli, EnvCommand, GenerateArgs, ScriptCommand, SystemdCommand,
};

pub fn dispatch_command(
    ctx: &CommandContext,
    command: &CommandCli,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match command {
        CommandCli::Generate(args) => {
            let info = CommandInfo::new(CommandGroup::Generate, "generate");
            let request = generate_request_from_args(ctx, args);
            core_call(info, || core::generate_all(ctx, &request))
        }
        CommandCli::SetPref(args) => {
            let info = CommandInfo::new(CommandGroup::SetPref, "set-pref");
            core_call(info, || core::set_preference(ctx, &args.name, &args.target))
        }
        CommandCli::List(args) => {
            let info = CommandInfo::new(CommandGroup::List, "list");
            core_call(info, || core::list_wrappers(ctx, args.all))
        }
        CommandCli::Info(args) => {
            let info = CommandInfo::new(CommandGroup::Info, "info");
            core_call(info, || core::info_wrapper(ctx, &args.name))
        }
        CommandCli::Search(args) => {
            let info = CommandInfo::new(CommandGroup::Search, "search");
            core_call(info, || core::search_wrappers(ctx, &args.query))
        }
        CommandCli::Rm(args) => {
            let info = CommandInfo::new(CommandGroup::Remove, "rm");
            let request = RemoveRequest {
                name: args.name.clone(),
                force: args.force,
            };
            core_call(info, || core::remove_wrapper(ctx, &request))
        }
        CommandCli::Alias(args) => {
            let info = CommandInfo::new(CommandGroup::Alias, "alias");
            let request = AliasRequest {
                alias: args.alias.clone(),
                target: args.target.clone(),
                validate_target: !args.no_validate,
            };
            core_call(info, || core::create_alias(ctx, &request))
        }
        CommandCli::Unalias(args) => {
            let info = CommandInfo::new(CommandGroup::Unalias, "unalias");
            core_call(info, || core::remove_alias(ctx, &args.alias))
        }
        CommandCli::Block(args) => {
            let info = CommandInfo::new(CommandGroup::Block, "block");
            core_call(info, || core::block_app(ctx, &args.id))
        }
        CommandCli::Unblock(args) => {
            let info = CommandInfo::new(CommandGroup::Unblock, "unblock");
            core_call(info, || core::unblock_app(ctx, &args.id))
        }
        CommandCli::Env(cmd) => match cmd {
            EnvCommand::Set(args) => {
                let info = CommandInfo::new(CommandGroup::Env, "set");
                core_call(info, || core::set_env(ctx, &args.name, &args.key, &args.value))
            }
            EnvCommand::Unset(args) => {
                let info = CommandInfo::new(CommandGroup::Env, "unset");
                core_call(info, || core::unset_env(ctx, &args.name, &args.key))
            }
        },
        CommandCli::Script(cmd) => match cmd {
            ScriptCommand::SetPre(args) => {
                let info = CommandInfo::new(CommandGroup::Script, "set-pre");
                core_call(info, || core::set_hook(ctx, &args.name, HookKind::Pre, &args.file))
            }
            ScriptCommand::SetPost(args) => {
                let info = CommandInfo::new(CommandGroup::Script, "set-post");
                core_call(info, || {
                    core::set_hook(ctx, &args.name, HookKind::Post, &args.file)
                })
            }
            ScriptCommand::RemovePre(args) => {
                let info = CommandInfo::new(CommandGroup::Script, "remove-pre");
                core_call(info, || core::remove_hook(ctx, &args.name, HookKind::Pre))
            }
            ScriptCommand::RemovePost(args) => {
                let info = CommandInfo::new(CommandGroup::Script, "remove-post");
                core_call(info, || core::remove_hook(ctx, &args.name, HookKind::Post))
            }
        },
        CommandCli::Export(args) => {
            let info = CommandInfo::new(CommandGroup::Export, "export");
            core_call(info, || core::export_state(ctx, &args.path))
        }
        CommandCli::Import(args) => {
            let info = CommandInfo::new(CommandGroup::Import, "import");
            core_call(info, || core::import_state(ctx, &args.path))
        }
        CommandCli::Config(args) => {
            let info = CommandInfo::new(CommandGroup::Config, "config");
            if args.action != "show" {
                return Ok((
                    info,
                    ExecutionOutcome::user_error(
                        format!("unknown config action {:?} (try 'show')", args.action),
                        serde_json::json!({ "reason": "invalid_input", "code": "FW120" }),
                    ),
                ));
            }
            core_call(info, || core::show_config(ctx))
        }
        CommandCli::Cleanup(args) => dispatch_cleanup(ctx, args),
        CommandCli::SystemdSetup => {
            let info = CommandInfo::new(CommandGroup::SystemdSetup, "systemd-setup");
            core_call(info, || core::systemd_setup(ctx))
        }
        CommandCli::Systemd(cmd) => {
            let (name, action) = match cmd {
                SystemdCommand::Enable => ("enable", SystemdAction::Enable),
                SystemdCommand::Disable => ("disable", SystemdAction::Disable),
                SystemdCommand::Status => ("status", SystemdAction::Status),
                SystemdCommand::Test => ("test", SystemdAction::Test),
            };
            let info = CommandInfo::new(CommandGroup::Systemd, name);
            core_call(info, || core::systemd_control(ctx, action))
        }
        CommandCli::Monitor(args) => {
            let info = CommandInfo::new(CommandGroup::Monitor, "monitor");
            let request = MonitorRequest {
                interval: Duration::from_secs(args.interval),
                iterations: args.iterations,
            };
            core_call(info, || core::monitor(ctx, &request))
        }
        CommandCli::Completions(_) => unreachable!("completions are handled before dispatch"),
    }
}

fn generate_request_from_args(ctx: &CommandContext, args: &GenerateArgs) -> GenerateRequest {
    GenerateRequest {
        bin_dir: args.bin_dir.clone(),
        verbose: ctx.global.verbose > 0 || ctx.global.emit_verbose,
    }
}

fn dispatch_cleanup(
    ctx: &CommandContext,
    args: &CleanupArgs,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    let info = CommandInfo::new(CommandGroup::Cleanup, "cleanup");
    let request = CleanupRequest {
        dry_run: args.dry_run,
        assume_yes: args.yes,
    };
    let mut confirm = |count: usize| confirm_removal(count);
    core_call(info, || core::cleanup(ctx, &request, &mut confirm))
}

fn confirm_removal(count: usize) -> bool {
    if !atty::is(Stream::Stdin) {
        eprintln!("WARN: non-interactive session; pass --yes to clean up");
        return false;
    }
    print!("Remove {count} items? [y/N] ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn core_call(
    info: CommandInfo,
    run: impl FnOnce() -> anyhow::Result<ExecutionOutcome>,
) -> Result<(CommandInfo, ExecutionOutcome)> {
    match run() {
        Ok(outcome) => Ok((info, outcome)),
        Err(err) => {
            if let Some(outcome) = core::engine_error_outcome(&err) {
                return Ok((info, outcome));
            }
            Ok((
                info,
                ExecutionOutcome::failure(
                    format!("{err:#}"),
                    serde_json::json!({ "reason": "internal" }),
                ),
            ))
        }
    }
}
