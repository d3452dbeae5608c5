//! Peer state stored locally as `peer.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use synchro_core::{
    ContentState, MemoryContentStore, MemoryOwnerDirectory, MemoryRepoStore, RepoState,
    SynchroDriver, SynchroOptions,
};

/// File name of the peer state inside the data directory.
pub const PEER_FILE: &str = "peer.json";

/// Serialized form of a peer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerState {
    /// Commits, trees, refs and op state.
    #[serde(default)]
    pub content: ContentState,
    /// Live repos and their archive.
    #[serde(default)]
    pub repos: RepoState,
    /// Username to user id mapping.
    #[serde(default)]
    pub owners: MemoryOwnerDirectory,
}

/// A loaded peer: in-memory collaborators backed by a JSON file.
#[derive(Debug)]
pub struct Peer {
    path: PathBuf,
    /// Content store.
    pub content: MemoryContentStore,
    /// Live repo store.
    pub repos: MemoryRepoStore,
    /// Owner directory.
    pub owners: MemoryOwnerDirectory,
}

impl Peer {
    /// Path of the peer file inside `data_dir`.
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(PEER_FILE)
    }

    /// Whether a peer exists in `data_dir`.
    pub fn exists(data_dir: &Path) -> bool {
        Self::path_in(data_dir).exists()
    }

    /// Create a fresh peer file. Fails if one exists.
    pub fn create(data_dir: &Path, owners: MemoryOwnerDirectory) -> Result<Self> {
        if Self::exists(data_dir) {
            anyhow::bail!(
                "Peer already initialized. Delete {} to reinitialize.",
                Self::path_in(data_dir).display()
            );
        }
        let peer = Self::from_state(
            Self::path_in(data_dir),
            PeerState {
                owners,
                ..PeerState::default()
            },
        );
        peer.save()?;
        Ok(peer)
    }

    /// Load the peer of `data_dir`.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = Self::path_in(data_dir);
        if !path.exists() {
            anyhow::bail!("Peer not initialized. Run 'synchro init' first.");
        }
        Self::load_file(&path)
    }

    /// Load a peer from an explicit file, e.g. another peer's state.
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read peer state {}", path.display()))?;
        let state: PeerState = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid peer state {}", path.display()))?;
        Ok(Self::from_state(path.to_path_buf(), state))
    }

    fn from_state(path: PathBuf, state: PeerState) -> Self {
        Self {
            path,
            content: MemoryContentStore::from_state(state.content),
            repos: MemoryRepoStore::from_state(state.repos),
            owners: state.owners,
        }
    }

    /// Write the peer back to its file.
    pub fn save(&self) -> Result<()> {
        let state = PeerState {
            content: self.content.to_state(),
            repos: self.repos.to_state(),
            owners: self.owners.clone(),
        };
        let contents = serde_json::to_string_pretty(&state)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to save peer state {}", self.path.display()))?;
        Ok(())
    }

    /// A driver over this peer's collaborators.
    pub fn driver(
        &self,
        options: SynchroOptions,
    ) -> SynchroDriver<'_, MemoryContentStore, MemoryRepoStore, MemoryOwnerDirectory> {
        SynchroDriver::new(&self.content, &self.repos, &self.owners, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synchro_core::RepoStore;
    use synchro_types::{LiveRepo, ObjectId, RepoKey, RepoLeaf, MASTER};
    use tempfile::tempdir;

    #[test]
    fn create_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let peer = Peer::create(
            dir.path(),
            MemoryOwnerDirectory::new().with_user("alice", "u1"),
        )
        .unwrap();
        peer.repos.put(LiveRepo::from_leaf(
            &RepoLeaf::new(RepoKey::new("alice", "photos"))
                .with_ref(MASTER, ObjectId::digest("commit", b"c1")),
            "u1",
        ));
        peer.save().unwrap();

        let loaded = Peer::load(dir.path()).unwrap();
        assert_eq!(loaded.repos.len(), 1);
        assert!(loaded
            .repos
            .find(&RepoKey::new("alice", "photos"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn create_fails_if_exists() {
        let dir = tempdir().unwrap();
        Peer::create(dir.path(), MemoryOwnerDirectory::new()).unwrap();
        assert!(Peer::create(dir.path(), MemoryOwnerDirectory::new()).is_err());
    }

    #[test]
    fn load_without_init_fails() {
        let dir = tempdir().unwrap();
        let err = Peer::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }
}
