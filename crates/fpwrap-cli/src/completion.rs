use clap::CommandFactory;
use clap_complete::Shell;

use crate::FpwrapCli;

/// Prints the completion script for `shell` to stdout; users pipe it into
/// their shell's completion directory themselves (and `fpwrap cleanup` knows
/// the well-known install locations).
pub fn emit_completions(shell: Shell) {
    let mut command = FpwrapCli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
}
