//! Show peer status.

use anyhow::Result;
use std::path::Path;
use synchro_core::OpStateStore;

use crate::config::Config;
use crate::peer::Peer;

/// Run the status command.
pub fn run(data_dir: &Path, config: &Config) -> Result<()> {
    println!("=== synchro status ===");
    println!();

    if !Peer::exists(data_dir) {
        println!("Peer: NOT INITIALIZED");
        println!();
        println!("Run 'synchro init' to initialize.");
        return Ok(());
    }
    let peer = Peer::load(data_dir)?;

    println!("Synchro: {}", config.synchro.name);
    println!("  Op state: {:?}", peer.content.op_state()?);
    println!("  Commits:  {}", peer.content.commit_count());

    let refs = peer.content.refs();
    println!("  Refs:     {}", refs.len());
    for (name, id) in &refs {
        println!("    {} {}", name, id);
    }

    println!();
    println!("Live repos:");
    println!("  Repos:    {}", peer.repos.len());
    println!("  Archived: {}", peer.repos.deleted_repos().len());

    Ok(())
}
