//! Merge a remote-tracking branch into the local branch.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::peer::Peer;

/// Run the merge command.
pub fn run(data_dir: &Path, config: &Config, remote: &str, branch: &str) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let result = peer
        .driver(config.synchro_options())
        .merge_synchro(branch, remote);
    // Objects written before a failure are kept.
    peer.save()?;
    let merged = result?;

    println!("{}: branches/{} {}", merged.status, branch, merged.commit_id);
    if !merged.virtual_bases.is_empty() {
        println!("  virtual bases: {}", merged.virtual_bases.len());
    }
    if let Some(report) = &merged.applied {
        println!(
            "  applied: {} added, {} deleted, {} modified, {} conflicts, {} skipped",
            report.added, report.deleted, report.modified, report.conflicts, report.skipped
        );
    }
    Ok(())
}
