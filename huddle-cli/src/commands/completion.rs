use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::{Shell, generate};

/// Name completions are registered under; matches the installed binary.
const BIN_NAME: &str = "huddle";

/// Writes the completion script for `shell` to `out`.
pub fn write_completion(shell: Shell, out: &mut dyn Write) {
    let mut command = crate::Cli::command();
    generate(shell, &mut command, BIN_NAME, out);
}

pub fn generate_completion(shell: Shell) {
    write_completion(shell, &mut io::stdout());
}
