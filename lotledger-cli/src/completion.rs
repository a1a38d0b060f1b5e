//! Shell completion support
//!
//! Scripts are generated from the clap command tree for bash, zsh, fish
//! and PowerShell.

use anyhow::{Context, Result};
use clap::Command;
use clap_complete::{generate, Generator, Shell};
use std::io;
use std::path::{Path, PathBuf};

/// Generate the completion script for `gen` on stdout
pub fn generate_completion<G: Generator>(gen: G, cmd: &mut Command) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, &mut io::stdout());
}

/// File name a shell expects its completion script under
pub fn completion_file_name(shell: Shell) -> Option<&'static str> {
    match shell {
        Shell::Bash => Some("lotledger.bash"),
        Shell::Zsh => Some("_lotledger"),
        Shell::Fish => Some("lotledger.fish"),
        Shell::PowerShell => Some("_lotledger.ps1"),
        _ => None,
    }
}

/// Generate the script for `shell` and write it into `output_dir`
pub fn save_completions(shell: Shell, cmd: &mut Command, output_dir: &Path) -> Result<PathBuf> {
    let file_name = completion_file_name(shell)
        .with_context(|| format!("Unsupported shell: {}", shell))?;

    let output_path = output_dir.join(file_name);
    let mut file = std::fs::File::create(&output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let name = cmd.get_name().to_string();
    generate(shell, cmd, name, &mut file);

    println!("Saved {} completion to {}", shell, output_path.display());
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::CommandFactory;

    #[test]
    fn test_save_completions_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = Cli::command();
        let path = save_completions(Shell::Zsh, &mut cmd, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "_lotledger");
        let script = std::fs::read_to_string(path).unwrap();
        assert!(script.contains("lotledger"));
    }

    #[test]
    fn test_elvish_has_no_file_name() {
        assert_eq!(completion_file_name(Shell::Elvish), None);
        assert_eq!(completion_file_name(Shell::Bash), Some("lotledger.bash"));
    }
}
