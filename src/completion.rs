//! # Shell Completion Module
//!
//! Generation of completion scripts through `clap_complete`, plus the item id
//! listing the hidden `complete-items` command prints for dynamic completion.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! segue completion bash > ~/.local/share/bash-completion/completions/segue
//!
//! # Generate zsh completions
//! segue completion zsh > ~/.config/zsh/completions/_segue
//! ```

use crate::catalog::Catalog;
use crate::cli::Shell;
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Completion candidates for item ids: playable items only, as
/// `id<TAB>title` so shells that support descriptions can show them.
#[must_use]
pub fn item_completions(catalog: &Catalog) -> Vec<String> {
    catalog
        .items()
        .iter()
        .filter(|&&id| catalog.is_playable(id))
        .map(|&id| format!("{}\t{}", id.0, catalog.track_info(id).title))
        .collect()
}

/// Print item id completions, one per line.
pub fn print_item_completions(catalog: &Catalog) {
    for line in item_completions(catalog) {
        println!("{line}");
    }
}
