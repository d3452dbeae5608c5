//! Show branch history.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::peer::Peer;

/// Run the log command.
pub fn run(data_dir: &Path, config: &Config, branch: &str, limit: usize) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let entries = peer.driver(config.synchro_options()).log(branch, limit)?;
    for (id, commit) in entries {
        let merge = if commit.parents.len() > 1 { " (merge)" } else { "" };
        println!("{} {} {}{}", id, commit.commit_date, commit.subject, merge);
    }
    Ok(())
}
