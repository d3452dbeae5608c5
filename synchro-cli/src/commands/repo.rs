//! Edit and list the live repo collection.

use anyhow::{Context, Result};
use std::path::Path;
use synchro_core::{OwnerDirectory, RepoStore};
use synchro_types::{LiveRepo, ObjectId, RepoKey};

use crate::config::Config;
use crate::peer::Peer;

fn parse_key(key: &str) -> Result<RepoKey> {
    key.parse()
        .with_context(|| format!("Invalid repo '{}', expected OWNER/NAME", key))
}

/// Set a branch of a live repo, creating the repo if needed.
///
/// Setting a branch resolves any conflict recorded for it.
pub fn set(data_dir: &Path, config: &Config, key: &str, commit: &str, branch: Option<&str>) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let key = parse_key(key)?;
    let id: ObjectId = commit
        .parse()
        .with_context(|| format!("Invalid commit id '{}'", commit))?;
    let branch = branch.unwrap_or(&config.apply.branch);

    let mut repo = match peer.repos.find(&key)? {
        Some(repo) => repo,
        None => LiveRepo {
            owner_id: peer
                .owners
                .user_id(&key.owner)
                .unwrap_or_else(|| config.apply.unknown_owner.clone()),
            key: key.clone(),
            refs: Default::default(),
            conflicts: Default::default(),
        },
    };
    repo.refs.insert(branch.to_string(), id);
    repo.conflicts.remove(branch);
    peer.repos.put(repo);
    peer.save()?;

    println!("{} {} -> {}", key, branch, id);
    Ok(())
}

/// Remove a repo from the live collection.
pub fn delete(data_dir: &Path, key: &str) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let key = parse_key(key)?;
    if peer.repos.delete(&key).is_none() {
        anyhow::bail!("No such repo: {}", key);
    }
    peer.save()?;

    println!("Deleted {}", key);
    Ok(())
}

/// Render one live repo, one line per branch.
pub fn describe(repo: &LiveRepo) -> Vec<String> {
    let leaf = repo.to_leaf();
    leaf.branches()
        .into_iter()
        .map(|branch| {
            let alternatives = leaf.alternatives(&branch);
            let current = repo
                .ref_of(&branch)
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            if alternatives.len() > 1 {
                let others: Vec<String> = repo
                    .conflicts_of(&branch)
                    .iter()
                    .map(|id| id.to_string())
                    .collect();
                format!("{} {} {} CONFLICT {}", repo.key, branch, current, others.join(","))
            } else {
                format!("{} {} {}", repo.key, branch, current)
            }
        })
        .collect()
}

/// List the live collection.
pub fn list(data_dir: &Path) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let repos = peer.repos.list()?;
    if repos.is_empty() {
        println!("No repos.");
        return Ok(());
    }
    for repo in &repos {
        for line in describe(repo) {
            println!("{}", line);
        }
    }
    Ok(())
}
