// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines the global flags and one subcommand per rollout action.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rollout")]
#[command(about = "Tag-based production rollouts on top of git")]
#[command(version)]
pub struct Cli {
    /// Override another operator's lock and the umask check
    #[arg(long, global = true)]
    pub force: bool,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output (only final result, for CI)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output JSON lines for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Never fetch, pull or push
    #[arg(long, global = true)]
    pub no_remote: bool,

    /// Allow uncommitted changes in the working tree
    #[arg(long, global = true)]
    pub no_check_clean: bool,

    /// Deploy record path (relative to the deployment root)
    #[arg(long, global = true, value_name = "PATH")]
    pub deploy_file: Option<PathBuf>,

    /// strftime pattern embedded in tag names
    #[arg(long, global = true, value_name = "PATTERN")]
    pub date_fmt: Option<String>,

    /// Allow `tag` and `release` for this environment
    #[arg(long, global = true)]
    pub can_make_tags: bool,

    /// Message for the tag annotation and deploy record
    #[arg(short, long, global = true)]
    pub message: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Environment to act on.
#[derive(Args, Debug, Clone, Default)]
pub struct Target {
    /// Environment (tag prefix); defaults to `environment` in rollout.yml
    #[arg(value_name = "PREFIX")]
    pub prefix: Option<String>,
}

/// Options shared by the history listings.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Hide tags dated before this day
    #[arg(long, value_name = "YYYYMMDD")]
    pub ignore_older_than: Option<String>,

    /// List branch heads after the tags
    #[arg(long)]
    pub include_branches: bool,

    /// Print full commit hashes
    #[arg(long)]
    pub long_digest: bool,

    /// Show at most this many entries
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Take the lock and pull the latest code
    Start {
        #[command(flatten)]
        target: Target,
    },

    /// Take the lock without pulling
    Hotfix {
        #[command(flatten)]
        target: Target,
    },

    /// Tag, run the sync hook, and finish on success
    Sync {
        #[command(flatten)]
        target: Target,
    },

    /// Tag and stop; sync by hand, then run `finish`
    ManualSync {
        #[command(flatten)]
        target: Target,
    },

    /// Run post-sync hooks, notify, and release the lock
    Finish {
        #[command(flatten)]
        target: Target,
    },

    /// Reset to where the rollout started and release the lock
    Abort {
        #[command(flatten)]
        target: Target,
    },

    /// Tag and finish a started rollout without a sync hook
    Release {
        #[command(flatten)]
        target: Target,
    },

    /// Tag HEAD outside a rollout
    Tag {
        #[command(flatten)]
        target: Target,

        /// Create the tag locally without pushing it
        #[arg(long)]
        make_tag: bool,
    },

    /// Roll back to an earlier rollout tag
    Revert {
        #[command(flatten)]
        target: Target,

        /// Tag to revert to (skips the menu)
        #[arg(long, value_name = "TAG")]
        to: Option<String>,

        /// Number of tags offered in the menu
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show the lock and the deploy record
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Print the deploy record if it describes HEAD
    Show {
        #[command(flatten)]
        target: Target,
    },

    /// List rollout tags pointing at HEAD
    ShowTag {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        list: ListArgs,
    },

    /// List rollout tags, newest first
    Log {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Diff HEAD against the latest rollout tag, or TAG
    Diff {
        /// Tag to diff against
        #[arg(value_name = "TAG")]
        tag: Option<String>,

        /// Environment (tag prefix); defaults to `environment` in rollout.yml
        #[arg(long, value_name = "PREFIX")]
        prefix: Option<String>,
    },
}

impl Commands {
    /// Environment named on the command line, if any.
    pub fn prefix(&self) -> Option<&str> {
        match self {
            Commands::Start { target }
            | Commands::Hotfix { target }
            | Commands::Sync { target }
            | Commands::ManualSync { target }
            | Commands::Finish { target }
            | Commands::Abort { target }
            | Commands::Release { target }
            | Commands::Tag { target, .. }
            | Commands::Revert { target, .. }
            | Commands::Status { target }
            | Commands::Show { target }
            | Commands::ShowTag { target, .. }
            | Commands::Log { target, .. } => target.prefix.as_deref(),
            Commands::Diff { prefix, .. } => prefix.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_action() {
        let cli = Cli::try_parse_from(["rollout", "start", "sheep", "--no-remote", "--force"]).unwrap();
        assert!(cli.no_remote);
        assert!(cli.force);
        assert_eq!(cli.command.prefix(), Some("sheep"));
    }

    #[test]
    fn kebab_case_actions() {
        let cli = Cli::try_parse_from(["rollout", "manual-sync"]).unwrap();
        assert!(matches!(cli.command, Commands::ManualSync { .. }));
        let cli = Cli::try_parse_from(["rollout", "show-tag", "--long-digest"]).unwrap();
        assert!(matches!(cli.command, Commands::ShowTag { ref list, .. } if list.long_digest));
    }

    #[test]
    fn revert_options() {
        let cli = Cli::try_parse_from(["rollout", "revert", "sheep", "--to", "sheep-20080825-2105"])
            .unwrap();
        match cli.command {
            Commands::Revert { to, limit, .. } => {
                assert_eq!(to.as_deref(), Some("sheep-20080825-2105"));
                assert_eq!(limit, 10);
            }
            _ => panic!("expected revert"),
        }
    }
}
