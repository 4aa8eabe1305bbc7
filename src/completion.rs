//! `tagdb completions <shell>`: completion scripts for the clap command tree.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Generator, Shell as CompletionShell, generate, generate_to};
use std::{fs, io};
use tracing::info;

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Print the script, or write it into `--out-dir` (stdout when no directory
/// is given). Under `--dry-run` only the target file name is reported.
pub fn run(
    args: CompletionsArgs,
    ctx: &AppContext,
) -> Result<()> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    let shell = CompletionShell::from(args.shell);

    let dir = match args.out_dir {
        Some(dir) if !args.stdout => dir,
        _ => {
            generate(shell, &mut cmd, bin, &mut io::stdout());
            return Ok(());
        }
    };

    if ctx.dry_run {
        let target = dir.join(shell.file_name(&bin));
        println!("would write {}", target.display());
        return Ok(());
    }

    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let path = generate_to(shell, &mut cmd, &bin, &dir)
        .with_context(|| format!("write {shell} completion into {}", dir.display()))?;
    info!(path = %path.display(), "completion script written");
    if !ctx.quiet {
        eprintln!("Wrote completion to {}", path.display());
    }
    Ok(())
}
