//! # Command-Line Interface Module
//!
//! This module defines the command-line interface for Segue using Clap derive macros.
//!
//! ## Commands
//!
//! - `suggest`: Rank what should play next given a listening history
//! - `simulate`: Run a session against a simulated device and persist it
//! - `history`: Inspect or clear the persisted playback snapshot
//! - `completion`: Generate shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! segue suggest --catalog library.db --history 12,40 --count 5
//! segue simulate --catalog library.json --tracks 3 --time-scale 50
//! segue history show
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "segue")]
#[command(about = "Segue: playback continuity engine - next-track selection & transport state")]
#[command(version)]
pub struct Args {
    /// Snapshot database to use instead of the one in the data directory
    #[arg(long, global = true, env = "SEGUE_STATE_DB", value_hint = clap::ValueHint::FilePath)]
    pub state_db: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank the items that would play next
    ///
    /// Scores every playable catalog item against the given history the same
    /// way automatic advance does, and prints the best ones.
    Suggest {
        /// Catalog file (.db/.sqlite for SQLite, anything else is JSON)
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        catalog: PathBuf,

        /// Recently played item ids, oldest first
        ///
        /// Defaults to the history of the persisted snapshot.
        #[arg(long, value_delimiter = ',')]
        history: Option<Vec<i64>>,

        /// Item to compare against when the history is empty
        #[arg(long)]
        anchor: Option<i64>,

        /// Number of suggestions to print
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Random seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Play through a catalog with a simulated device
    ///
    /// Restores the persisted snapshot, lets the session auto-advance through
    /// the given number of tracks and saves the snapshot again.
    Simulate {
        /// Catalog file (.db/.sqlite for SQLite, anything else is JSON)
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        catalog: PathBuf,

        /// Number of tracks to play before stopping
        #[arg(short, long, default_value = "3")]
        tracks: usize,

        /// Simulated seconds per real second
        #[arg(long, default_value = "60")]
        time_scale: f64,

        /// Random seed for reproducible selection
        #[arg(long)]
        seed: Option<u64>,

        /// Ignore the persisted snapshot and start from scratch
        #[arg(long)]
        fresh: bool,
    },

    /// Inspect or clear the persisted playback snapshot
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Generate shell completions
    ///
    /// Usage: segue completion bash > ~/.local/share/bash-completion/completions/segue
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List catalog item ids for completion (hidden command)
    #[command(hide = true)]
    CompleteItems {
        #[arg(short, long)]
        catalog: PathBuf,
    },
}

/// Snapshot management actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    /// Print the persisted history and current item
    Show,
    /// Delete the persisted snapshot
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn parse_suggest() {
        let args = Args::parse_from([
            "segue", "suggest", "--catalog", "lib.db", "--history", "3,-1,7", "-n", "2",
        ]);
        match args.command {
            Command::Suggest {
                catalog,
                history,
                count,
                anchor,
                ..
            } => {
                assert_eq!(catalog, PathBuf::from("lib.db"));
                assert_eq!(history, Some(vec![3, -1, 7]));
                assert_eq!(count, 2);
                assert_eq!(anchor, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_history_clear_with_state_db() {
        let args = Args::parse_from(["segue", "history", "clear", "--state-db", "/tmp/s.db"]);
        assert_eq!(args.state_db, Some(PathBuf::from("/tmp/s.db")));
        assert!(matches!(
            args.command,
            Command::History {
                action: HistoryAction::Clear
            }
        ));
    }
}
