//! Initialize a peer.

use anyhow::{Context, Result};
use std::path::Path;
use synchro_core::MemoryOwnerDirectory;

use crate::peer::Peer;

/// Parse `username=user-id` pairs.
pub fn parse_owners(owners: &[String]) -> Result<MemoryOwnerDirectory> {
    let mut directory = MemoryOwnerDirectory::new();
    for entry in owners {
        let (username, user_id) = entry
            .split_once('=')
            .filter(|(u, id)| !u.is_empty() && !id.is_empty())
            .with_context(|| format!("Invalid owner '{}', expected USERNAME=USER_ID", entry))?;
        directory.insert(username, user_id);
    }
    Ok(directory)
}

/// Run the init command.
pub fn run(data_dir: &Path, owners: &[String]) -> Result<()> {
    let directory = parse_owners(owners)?;
    Peer::create(data_dir, directory)?;

    println!("Peer initialized successfully!");
    println!();
    println!("  Data dir: {}", data_dir.display());
    println!("  Owners:   {}", owners.len());
    println!();
    println!("Next steps:");
    println!("  1. Record repos: synchro repo set <owner/name> <commit>");
    println!("  2. Snapshot them: synchro snapshot");

    Ok(())
}
