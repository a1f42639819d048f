use std::path::PathBuf;
use std::sync::Arc;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand};
use color_eyre::Result;
use fpwrap_core::{CommandContext, GlobalOptions, SystemEffects};

mod completion;
mod dispatch;
mod output;
mod style;

use output::OutputOptions;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = FpwrapCli::parse();
    init_tracing(cli.verbose);

    if let CommandCli::Completions(args) = &cli.command {
        completion::emit_completions(args.shell);
        return Ok(());
    }

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        json: cli.json,
        emit: cli.emit,
        emit_verbose: cli.emit_verbose,
        config_dir: cli
            .config_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
    };

    let effects: fpwrap_core::SharedEffects = Arc::new(SystemEffects::new());
    let ctx = CommandContext::new(&global, effects).map_err(|e| color_eyre::eyre::eyre!(e))?;
    let (info, outcome) = dispatch::dispatch_command(&ctx, &cli.command)?;

    let opts = OutputOptions {
        quiet: cli.quiet,
        json: cli.json,
        no_color: cli.no_color,
    };
    let code = output::emit_output(&opts, info, &outcome)?;
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = format!("fpwrap={level},fpwrap_core={level},fpwrap_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Launch wrappers for sandboxed flatpak applications",
    long_about = "Generates per-application launch wrappers that pick between the \
                  sandboxed flatpak build and a native binary of the same name.",
    after_help = "Examples:\n  fpwrap generate\n  fpwrap set-pref firefox system\n  fpwrap --json list --all"
)]
struct FpwrapCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)"
    )]
    quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    verbose: u8,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes")]
    json: bool,
    #[arg(long, help = "Disable colored human output")]
    no_color: bool,
    #[arg(long, help = "Log what would change without touching the filesystem")]
    emit: bool,
    #[arg(
        long = "emit-verbose",
        help = "Emit mode with per-wrapper detail logging"
    )]
    emit_verbose: bool,
    #[arg(
        long,
        value_parser = value_parser!(PathBuf),
        help = "Override the fpwrap configuration directory"
    )]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: CommandCli,
}

#[derive(Subcommand, Debug)]
enum CommandCli {
    #[command(
        about = "Reconcile orphans and generate wrappers for every installed app.",
        override_usage = "fpwrap generate [BIN_DIR] [--emit]",
        after_help = "Examples:\n  fpwrap generate\n  fpwrap generate ~/.local/bin --emit\n"
    )]
    Generate(GenerateArgs),
    #[command(
        name = "set-pref",
        about = "Persist the launch preference for one wrapper.",
        after_help = "Example:\n  fpwrap set-pref firefox system\n"
    )]
    SetPref(SetPrefArgs),
    #[command(about = "List generated wrappers (--all adds aliases and the blocklist).")]
    List(ListArgs),
    #[command(about = "Show one wrapper in detail; aliases are resolved first.")]
    Info(NameArg),
    #[command(about = "Search wrappers by name or application id.")]
    Search(SearchArgs),
    #[command(
        name = "rm",
        about = "Remove a wrapper and every piece of state keyed by it."
    )]
    Rm(RemoveArgs),
    #[command(
        about = "Create an alias for a wrapper name.",
        after_help = "Example:\n  fpwrap alias browser firefox\n"
    )]
    Alias(AliasArgs),
    #[command(about = "Remove an alias.")]
    Unalias(UnaliasArgs),
    #[command(about = "Blocklist an application id; its wrapper goes away on the next generate.")]
    Block(IdArg),
    #[command(about = "Remove an application id from the blocklist.")]
    Unblock(IdArg),
    #[command(subcommand, about = "Per-wrapper environment overlay")]
    Env(EnvCommand),
    #[command(subcommand, about = "Pre-launch and post-run hook scripts")]
    Script(ScriptCommand),
    #[command(about = "Write preferences, env overlays, aliases and blocklist to a file.")]
    Export(PathArg),
    #[command(about = "Replace the portable state with a previously exported document.")]
    Import(PathArg),
    #[command(about = "Show the resolved configuration paths and state counts.")]
    Config(ConfigArgs),
    #[command(
        about = "Remove everything fpwrap ever wrote.",
        after_help = "Examples:\n  fpwrap cleanup --dry-run\n  fpwrap cleanup --yes\n"
    )]
    Cleanup(CleanupArgs),
    #[command(
        name = "systemd-setup",
        about = "Install the path-watch and daily-timer units (crontab fallback)."
    )]
    SystemdSetup,
    #[command(subcommand, about = "Manage the installed supervisor units")]
    Systemd(SystemdCommand),
    #[command(about = "Run the generator in a foreground loop.")]
    Monitor(MonitorArgs),
    #[command(about = "Print shell completions to stdout.")]
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(value_name = "BIN_DIR", help = "Wrapper directory (overrides the pointer)")]
    bin_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SetPrefArgs {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(value_name = "TARGET", help = "'system' or 'flatpak'")]
    target: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, help = "Include aliases and the blocklist")]
    all: bool,
}

#[derive(Args, Debug)]
struct NameArg {
    #[arg(value_name = "NAME")]
    name: String,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(value_name = "QUERY")]
    query: String,
}

#[derive(Args, Debug)]
struct RemoveArgs {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(long, help = "Remove even foreign or missing files")]
    force: bool,
}

#[derive(Args, Debug)]
struct AliasArgs {
    #[arg(value_name = "ALIAS")]
    alias: String,
    #[arg(value_name = "TARGET")]
    target: String,
    #[arg(long, help = "Skip the wrapper-exists check on the target")]
    no_validate: bool,
}

#[derive(Args, Debug)]
struct UnaliasArgs {
    #[arg(value_name = "ALIAS")]
    alias: String,
}

#[derive(Args, Debug)]
struct IdArg {
    #[arg(value_name = "ID", help = "Application id, e.g. org.mozilla.firefox")]
    id: String,
}

#[derive(Subcommand, Debug)]
enum EnvCommand {
    #[command(about = "Set one variable in a wrapper's environment overlay.")]
    Set(EnvSetArgs),
    #[command(about = "Remove one variable from a wrapper's environment overlay.")]
    Unset(EnvUnsetArgs),
}

#[derive(Args, Debug)]
struct EnvSetArgs {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(value_name = "KEY")]
    key: String,
    #[arg(value_name = "VALUE")]
    value: String,
}

#[derive(Args, Debug)]
struct EnvUnsetArgs {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(value_name = "KEY")]
    key: String,
}

#[derive(Subcommand, Debug)]
enum ScriptCommand {
    #[command(name = "set-pre", about = "Install a pre-launch hook from a file.")]
    SetPre(ScriptSetArgs),
    #[command(name = "set-post", about = "Install a post-run hook from a file.")]
    SetPost(ScriptSetArgs),
    #[command(name = "remove-pre", about = "Remove the pre-launch hook.")]
    RemovePre(NameArg),
    #[command(name = "remove-post", about = "Remove the post-run hook.")]
    RemovePost(NameArg),
}

#[derive(Args, Debug)]
struct ScriptSetArgs {
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(value_name = "FILE", value_parser = value_parser!(PathBuf))]
    file: PathBuf,
}

#[derive(Args, Debug)]
struct PathArg {
    #[arg(value_name = "PATH", value_parser = value_parser!(PathBuf))]
    path: PathBuf,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(value_name = "ACTION", help = "Only 'show' is recognized", default_value = "show")]
    action: String,
}

#[derive(Args, Debug)]
struct CleanupArgs {
    #[arg(long, help = "Report what would be removed without deleting anything")]
    dry_run: bool,
    #[arg(long, short = 'y', help = "Skip the confirmation prompt")]
    yes: bool,
}

#[derive(Subcommand, Debug)]
enum SystemdCommand {
    #[command(about = "Enable and start the path and timer units.")]
    Enable,
    #[command(about = "Disable and stop the path and timer units.")]
    Disable,
    #[command(about = "Show the unit status.")]
    Status,
    #[command(about = "Trigger one generation run through the service unit.")]
    Test,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[arg(long, default_value_t = 30, help = "Seconds between generation passes")]
    interval: u64,
    #[arg(long, hide = true, help = "Stop after N passes (testing)")]
    iterations: Option<u64>,
}

#[derive(Args, Debug)]
struct CompletionsArgs {
    #[arg(value_enum, value_name = "SHELL")]
    shell: clap_complete::Shell,
}
