// ABOUTME: Command dispatch for the rollout CLI.
// ABOUTME: Builds the engine from config and flags, runs one action, then prints warnings.

mod actions;
mod query;
mod revert;

use std::env;
use std::path::Path;

use rollout::config::{Config, parse_cutoff};
use rollout::deploy::{ActionOptions, DeployFileStore, EngineSettings, RolloutEngine};
use rollout::error::{Error, Result};
use rollout::notify::CommandNotifier;
use rollout::output::Output;
use rollout::tags::ListOptions;
use rollout::types::EnvName;
use rollout::vcs::GitCli;

use crate::cli::{Cli, Commands, ListArgs};

/// Everything one action needs.
pub struct Invocation {
    pub engine: RolloutEngine<GitCli>,
    pub config: Config,
    pub output: Output,
}

impl Invocation {
    /// Listing options from config defaults and command-line flags.
    pub fn list_options(&self, args: &ListArgs) -> Result<ListOptions> {
        let mut opts = self.engine.list_options();
        if let Some(cutoff) = self.config.ignore_older_than {
            opts.cutoff = cutoff;
        }
        if let Some(ref text) = args.ignore_older_than {
            opts.cutoff = parse_cutoff(text).map_err(Error::InvalidConfig)?;
        }
        opts.include_branches = args.include_branches;
        opts.long_digest = args.long_digest;
        Ok(opts)
    }
}

/// Run the selected action.
pub async fn run(cli: Cli, mut output: Output) -> Result<()> {
    output.start_timer();
    let root = env::current_dir()?;
    let mut inv = build(&cli, &root, output)?;

    let result = dispatch(&cli.command, &mut inv).await;

    for warning in inv.engine.take_warnings() {
        inv.output.warning(&warning.message);
    }
    result
}

async fn dispatch(command: &Commands, inv: &mut Invocation) -> Result<()> {
    match command {
        Commands::Start { .. } => actions::start(inv, false).await,
        Commands::Hotfix { .. } => actions::start(inv, true).await,
        Commands::Sync { .. } => actions::sync(inv).await,
        Commands::ManualSync { .. } => actions::manual_sync(inv).await,
        Commands::Finish { .. } => actions::finish(inv).await,
        Commands::Abort { .. } => actions::abort(inv).await,
        Commands::Release { .. } => actions::release(inv).await,
        Commands::Tag { make_tag, .. } => actions::tag(inv, !make_tag).await,
        Commands::Revert { to, limit, .. } => revert::revert(inv, to.as_deref(), *limit).await,
        Commands::Status { .. } => query::status(inv).await,
        Commands::Show { .. } => query::show(inv).await,
        Commands::ShowTag { list, .. } => query::show_tag(inv, list).await,
        Commands::Log { list, .. } => query::log(inv, list).await,
        Commands::Diff { tag, .. } => query::diff(inv, tag.as_deref()).await,
    }
}

fn build(cli: &Cli, root: &Path, output: Output) -> Result<Invocation> {
    let config = Config::discover(root)?;
    let environment = resolve_environment(&config, cli.command.prefix())?;
    let config = config.for_environment(&environment);

    let mut settings = EngineSettings::for_root(root, environment);
    settings.date_format = cli
        .date_fmt
        .clone()
        .unwrap_or_else(|| config.date_format.clone());
    settings.hooks_dir = root.join(&config.hooks_dir);
    let deploy_file = cli.deploy_file.as_deref().or(config.deploy_file.as_deref());
    settings.deploy_file = DeployFileStore::resolve(root, deploy_file)
        .path()
        .to_path_buf();
    settings.block_file = config.block_file.as_ref().map(|p| root.join(p));
    settings.umask = config.umask;
    settings.can_make_tags = cli.can_make_tags || config.can_make_tags;
    settings.stale_lock_after = config.stale_lock_after;

    let options = ActionOptions {
        force: cli.force,
        check_clean: !cli.no_check_clean,
        remote: !cli.no_remote,
        message: cli.message.clone(),
    };

    let vcs = GitCli::new(root, config.remote.clone());
    let mut engine = RolloutEngine::new(vcs, settings, options)?;
    if let Some(ref notify) = config.notify {
        engine = engine.with_notifier(Box::new(CommandNotifier::new(notify.command.clone())?));
    }

    Ok(Invocation {
        engine,
        config,
        output,
    })
}

fn resolve_environment(config: &Config, prefix: Option<&str>) -> Result<EnvName> {
    match prefix {
        Some(prefix) => Ok(EnvName::new(prefix)?),
        None => config.environment.clone().ok_or(Error::NoEnvironment),
    }
}
