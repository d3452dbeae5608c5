//! # synchro
//!
//! Command-line peer for synchro replication.
//!
//! A peer keeps its synchro history and its live repo collection in
//! `peer.json` inside the data directory. Peers exchange history by reading
//! each other's `peer.json`.
//!
//! ## Commands
//!
//! - `init`: Initialize a peer
//! - `repo set|delete|list`: Edit the live repo collection
//! - `snapshot`: Record the live collection as a commit
//! - `fetch`: Copy another peer's branch into a remote-tracking ref
//! - `merge`: Merge a remote-tracking branch and apply it to the live collection
//! - `merge-base`: Show the merge bases of two revisions
//! - `log`: Show branch history
//! - `status`: Show peer status
//!
//! ## Example
//!
//! ```bash
//! synchro --data-dir a init --owner alice=u1
//! synchro --data-dir a repo set alice/photos <commit>
//! synchro --data-dir a snapshot
//!
//! synchro --data-dir b init --owner alice=u1
//! synchro --data-dir b fetch --from a/peer.json --remote a
//! synchro --data-dir b merge --remote a
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod peer;

use commands::{fetch, init, log, merge, merge_base, repo, snapshot, status};
use config::Config;

/// Command-line peer for synchro replication.
#[derive(Parser, Debug)]
#[command(name = "synchro")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding peer.json and synchro.toml
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/synchro.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a peer
    Init {
        /// Known owner as USERNAME=USER_ID (repeatable)
        #[arg(long = "owner")]
        owners: Vec<String>,
    },

    /// Edit or list the live repo collection
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Record the live collection as a commit
    Snapshot {
        /// Branch to commit on
        #[arg(long)]
        branch: Option<String>,
    },

    /// Copy another peer's branch into a remote-tracking ref
    Fetch {
        /// Path of the other peer's peer.json
        #[arg(long)]
        from: PathBuf,

        /// Remote name to record the branch under
        #[arg(long)]
        remote: String,

        /// Branch to fetch
        #[arg(long)]
        branch: Option<String>,
    },

    /// Merge a remote-tracking branch into the local branch
    Merge {
        /// Remote name
        #[arg(long)]
        remote: String,

        /// Branch to merge
        #[arg(long)]
        branch: Option<String>,
    },

    /// Show the merge bases of two revisions
    MergeBase {
        /// Commit id, ref or branch name
        a: String,
        /// Commit id, ref or branch name
        b: String,
    },

    /// Show branch history
    Log {
        /// Branch to show
        #[arg(long)]
        branch: Option<String>,

        /// Maximum number of commits
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show peer status
    Status,
}

#[derive(Subcommand, Debug)]
enum RepoAction {
    /// Set a repo branch (resolves its conflict)
    Set {
        /// Repo as OWNER/NAME
        repo: String,
        /// Commit id (hex)
        commit: String,
        /// Leaf branch key (default: from config)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Remove a repo
    Delete {
        /// Repo as OWNER/NAME
        repo: String,
    },

    /// List repos
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    let config_path = cli
        .config
        .unwrap_or_else(|| data_dir.join("synchro.toml"));
    let config = Config::load_or_default(&config_path)?;
    init_tracing(&config);
    debug!(data_dir = %data_dir.display(), config = %config_path.display(), "Loaded configuration");

    run(cli.command, &data_dir, &config)
}

fn run(command: Commands, data_dir: &Path, config: &Config) -> Result<()> {
    let default_branch = config.synchro.branch.as_str();
    match command {
        Commands::Init { owners } => init::run(data_dir, &owners),
        Commands::Repo { action } => match action {
            RepoAction::Set {
                repo,
                commit,
                branch,
            } => repo::set(data_dir, config, &repo, &commit, branch.as_deref()),
            RepoAction::Delete { repo } => repo::delete(data_dir, &repo),
            RepoAction::List => repo::list(data_dir),
        },
        Commands::Snapshot { branch } => snapshot::run(
            data_dir,
            config,
            branch.as_deref().unwrap_or(default_branch),
        ),
        Commands::Fetch {
            from,
            remote,
            branch,
        } => fetch::run(
            data_dir,
            config,
            &from,
            &remote,
            branch.as_deref().unwrap_or(default_branch),
        ),
        Commands::Merge { remote, branch } => merge::run(
            data_dir,
            config,
            &remote,
            branch.as_deref().unwrap_or(default_branch),
        ),
        Commands::MergeBase { a, b } => merge_base::run(data_dir, &a, &b),
        Commands::Log { branch, limit } => log::run(
            data_dir,
            config,
            branch.as_deref().unwrap_or(default_branch),
            limit,
        ),
        Commands::Status => status::run(data_dir, config),
    }
}

/// Log to stderr; `RUST_LOG` wins over the configured filter.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Get the default data directory for synchro.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "ydun", "synchro")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
