//! Show the merge bases of two commits.

use anyhow::Result;
use std::path::Path;
use synchro_core::{merge_bases_in, ContentStore, MemoryContentStore};
use synchro_types::{branch_ref, ObjectId};

use crate::peer::Peer;

/// Resolve a commit id, full ref name or branch name.
pub fn resolve(content: &MemoryContentStore, rev: &str) -> Result<ObjectId> {
    if let Ok(id) = rev.parse::<ObjectId>() {
        return Ok(id);
    }
    for name in [rev.to_string(), branch_ref(rev)] {
        if let Some(id) = content.get_ref(&name)? {
            return Ok(id);
        }
    }
    anyhow::bail!("Unknown revision '{}'", rev)
}

/// Run the merge-base command.
pub fn run(data_dir: &Path, a: &str, b: &str) -> Result<()> {
    let peer = Peer::load(data_dir)?;
    let ours = resolve(&peer.content, a)?;
    let theirs = resolve(&peer.content, b)?;

    let bases = merge_bases_in(&peer.content, ours, theirs);
    if bases.is_empty() {
        println!("No merge base.");
    }
    for base in bases {
        println!("{}", base);
    }
    Ok(())
}
