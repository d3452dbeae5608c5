//! Record the live collection as a synchro commit.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::peer::Peer;

/// Run the snapshot command.
pub fn run(data_dir: &Path, config: &Config, branch: &str) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let outcome = peer.driver(config.synchro_options()).snapshot(branch)?;
    peer.save()?;

    if outcome.created {
        println!("Snapshot {} on branches/{}", outcome.commit_id, branch);
    } else {
        println!("Nothing to snapshot, branches/{} is {}", branch, outcome.commit_id);
    }
    Ok(())
}
