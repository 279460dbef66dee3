use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::{Cli, CliShellCompletion};

/// Writes the completion script for `shell`, named after the `braid` binary.
pub fn render_shell_completion(
    shell: CliShellCompletion,
    mut writer: impl Write,
) -> io::Result<()> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();
    generate(Shell::from(shell), &mut command, bin_name, &mut writer);
    writer.flush()
}
