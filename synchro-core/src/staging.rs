//! Staging tree for building a merged "repos" subtree.

use std::collections::BTreeMap;
use synchro_types::{RepoKey, RepoLeaf, Tree, TreeEntry, REPOS_ENTRY};

/// Incrementally built set of repo leaves.
///
/// Leaves are kept in key order, so [`StagingTree::as_tree`] is deterministic
/// and equal leaf sets always produce the same tree id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingTree {
    leaves: BTreeMap<RepoKey, RepoLeaf>,
}

impl StagingTree {
    /// Create an empty staging tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a staging tree seeded with `leaves`.
    pub fn from_leaves(leaves: impl IntoIterator<Item = RepoLeaf>) -> Self {
        Self {
            leaves: leaves
                .into_iter()
                .map(|leaf| (leaf.key.clone(), leaf))
                .collect(),
        }
    }

    /// Insert or replace a leaf.
    pub fn set(&mut self, leaf: RepoLeaf) {
        self.leaves.insert(leaf.key.clone(), leaf);
    }

    /// Remove a leaf.
    pub fn del(&mut self, key: &RepoKey) -> Option<RepoLeaf> {
        self.leaves.remove(key)
    }

    /// Look up a leaf.
    pub fn get(&self, key: &RepoKey) -> Option<&RepoLeaf> {
        self.leaves.get(key)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether there are no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The "repos" subtree holding every leaf in key order.
    pub fn as_tree(&self) -> Tree {
        Tree {
            name: REPOS_ENTRY.to_string(),
            entries: self
                .leaves
                .values()
                .cloned()
                .map(TreeEntry::Leaf)
                .collect(),
            meta: BTreeMap::new(),
        }
    }
}
