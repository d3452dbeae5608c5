//! Fetch another peer's branch into a remote-tracking ref.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::peer::Peer;

/// Run the fetch command.
pub fn run(data_dir: &Path, config: &Config, from: &Path, remote: &str, branch: &str) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let other = Peer::load_file(from)
        .with_context(|| format!("Failed to open remote peer {}", from.display()))?;

    let outcome = peer
        .driver(config.synchro_options())
        .fetch(&other.content, remote, branch)?;
    peer.save()?;

    println!(
        "remotes/{}/branches/{} {} ({} commits, {} trees{})",
        remote,
        branch,
        outcome.commit_id,
        outcome.commits,
        outcome.trees,
        if outcome.updated { "" } else { ", unchanged" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{init, repo, snapshot};
    use crate::peer::PEER_FILE;
    use synchro_core::ContentStore;
    use synchro_types::ObjectId;
    use tempfile::tempdir;

    #[test]
    fn fetch_copies_remote_branch() {
        let config = Config::default();
        let upstream = tempdir().unwrap();
        init::run(upstream.path(), &[]).unwrap();
        let commit = ObjectId::digest("commit", b"c1").to_hex();
        repo::set(upstream.path(), &config, "alice/photos", &commit, None).unwrap();
        snapshot::run(upstream.path(), &config, "master").unwrap();

        let local = tempdir().unwrap();
        init::run(local.path(), &[]).unwrap();
        run(
            local.path(),
            &config,
            &upstream.path().join(PEER_FILE),
            "origin",
            "master",
        )
        .unwrap();

        let peer = Peer::load(local.path()).unwrap();
        let upstream_head = Peer::load(upstream.path())
            .unwrap()
            .content
            .get_ref("branches/master")
            .unwrap();
        assert_eq!(
            peer.content.get_ref("remotes/origin/branches/master").unwrap(),
            upstream_head
        );
    }

    #[test]
    fn fetch_from_missing_file_fails() {
        let local = tempdir().unwrap();
        init::run(local.path(), &[]).unwrap();
        let result = run(
            local.path(),
            &Config::default(),
            &local.path().join("nope.json"),
            "origin",
            "master",
        );
        assert!(result.is_err());
    }
}
