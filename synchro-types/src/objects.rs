//! Immutable, content-addressed history objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ObjectId, RepoLeaf, TypesError};

/// Name of the root tree entry holding the repo leaves.
pub const REPOS_ENTRY: &str = "repos";

/// A synchro commit.
///
/// Its id is derived from its content via [`Commit::id`]; commits are never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Parent commits, ours first for merges.
    pub parents: Vec<ObjectId>,
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    /// One-line subject.
    pub subject: String,
    /// Longer message (may be empty).
    #[serde(default)]
    pub message: String,
    /// Unix timestamp (seconds) when the commit was created.
    pub commit_date: i64,
    /// Free-form metadata.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Commit {
    /// Content address of this commit.
    pub fn id(&self) -> Result<ObjectId, TypesError> {
        ObjectId::of("commit", self)
    }
}

/// An entry of a tree: a subtree reference or a repo leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntry {
    /// Reference to a subtree.
    Tree {
        /// Entry name.
        name: String,
        /// Id of the subtree.
        id: ObjectId,
    },
    /// A repo leaf stored inline.
    Leaf(RepoLeaf),
}

/// A synchro tree: ordered entries plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Tree {
    /// Name of the tree.
    pub name: String,
    /// Ordered entries.
    pub entries: Vec<TreeEntry>,
    /// Free-form metadata.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Tree {
    /// Content address of this tree.
    pub fn id(&self) -> Result<ObjectId, TypesError> {
        ObjectId::of("tree", self)
    }

    /// A root tree whose only entry is the given repos subtree.
    pub fn root(name: &str, repos: ObjectId) -> Self {
        Self {
            name: name.to_string(),
            entries: vec![TreeEntry::Tree {
                name: REPOS_ENTRY.to_string(),
                id: repos,
            }],
            meta: BTreeMap::new(),
        }
    }

    /// Id of the "repos" subtree, if present.
    pub fn repos_subtree(&self) -> Option<ObjectId> {
        self.entries.iter().find_map(|entry| match entry {
            TreeEntry::Tree { name, id } if name == REPOS_ENTRY => Some(*id),
            _ => None,
        })
    }

    /// Copy of this tree with the "repos" entry pointing at `repos`.
    ///
    /// The entry keeps its position; it is appended when missing.
    pub fn with_repos_subtree(&self, repos: ObjectId) -> Self {
        let mut tree = self.clone();
        let existing = tree.entries.iter_mut().find_map(|entry| match entry {
            TreeEntry::Tree { name, id } if name == REPOS_ENTRY => Some(id),
            _ => None,
        });
        match existing {
            Some(id) => *id = repos,
            None => tree.entries.push(TreeEntry::Tree {
                name: REPOS_ENTRY.to_string(),
                id: repos,
            }),
        }
        tree
    }

    /// Leaves stored directly in this tree.
    pub fn leaves(&self) -> impl Iterator<Item = &RepoLeaf> {
        self.entries.iter().filter_map(|entry| match entry {
            TreeEntry::Leaf(leaf) => Some(leaf),
            TreeEntry::Tree { .. } => None,
        })
    }

    /// Subtree references stored directly in this tree.
    pub fn subtrees(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.entries.iter().filter_map(|entry| match entry {
            TreeEntry::Tree { name, id } => Some((name.as_str(), *id)),
            TreeEntry::Leaf(_) => None,
        })
    }
}
