//! Per-repo ref state, as recorded in snapshots and in the live collection.
//!
//! Two shapes share the same maps but differ in how a conflict is held:
//!
//! - [`RepoLeaf`] (snapshot): for each branch, exactly one of `refs[branch]`
//!   or `conflicts[branch]` is set. A conflict list has at least two entries,
//!   is sorted and has no duplicates.
//! - [`LiveRepo`] (live collection): `refs[branch]` is the value the rest of
//!   the system reads, and `conflicts[branch]` lists the *other* alternatives.
//!   A live conflict list never contains the live ref of the same branch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{ObjectId, RepoKey, TypesError};

/// Leaf branch key of the default branch.
pub const MASTER: &str = "branches/master";

/// Sort and deduplicate a set of commit ids.
pub fn sorted_dedup(ids: impl IntoIterator<Item = ObjectId>) -> Vec<ObjectId> {
    let set: BTreeSet<ObjectId> = ids.into_iter().collect();
    set.into_iter().collect()
}

/// A repo entry inside a snapshot tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoLeaf {
    /// Identity of the repo.
    pub key: RepoKey,
    /// Resolved branches.
    #[serde(default)]
    pub refs: BTreeMap<String, ObjectId>,
    /// Unresolved branches with their alternatives.
    #[serde(default)]
    pub conflicts: BTreeMap<String, Vec<ObjectId>>,
}

impl RepoLeaf {
    /// Create a leaf without any branches.
    pub fn new(key: RepoKey) -> Self {
        Self {
            key,
            refs: BTreeMap::new(),
            conflicts: BTreeMap::new(),
        }
    }

    /// Builder: set a resolved branch.
    pub fn with_ref(mut self, branch: &str, id: ObjectId) -> Self {
        self.set_alternatives(branch, [id]);
        self
    }

    /// Builder: set a branch to a list of alternatives.
    pub fn with_alternatives(
        mut self,
        branch: &str,
        ids: impl IntoIterator<Item = ObjectId>,
    ) -> Self {
        self.set_alternatives(branch, ids);
        self
    }

    /// Every branch named in either map.
    pub fn branches(&self) -> BTreeSet<String> {
        self.refs
            .keys()
            .chain(self.conflicts.keys())
            .cloned()
            .collect()
    }

    /// The alternatives of a branch: its conflict list, or its single ref,
    /// or nothing.
    pub fn alternatives(&self, branch: &str) -> Vec<ObjectId> {
        if let Some(list) = self.conflicts.get(branch) {
            return list.clone();
        }
        self.refs.get(branch).map(|id| vec![*id]).unwrap_or_default()
    }

    /// Whether a branch currently holds a conflict list.
    pub fn is_conflicted(&self, branch: &str) -> bool {
        self.conflicts.contains_key(branch)
    }

    /// Whether any branch holds a conflict list.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Store `ids` for `branch`, collapsing a single alternative into `refs`.
    ///
    /// An empty set removes the branch.
    pub fn set_alternatives(&mut self, branch: &str, ids: impl IntoIterator<Item = ObjectId>) {
        let candidates = sorted_dedup(ids);
        self.refs.remove(branch);
        self.conflicts.remove(branch);
        match candidates.len() {
            0 => {}
            1 => {
                self.refs.insert(branch.to_string(), candidates[0]);
            }
            _ => {
                self.conflicts.insert(branch.to_string(), candidates);
            }
        }
    }

    /// Check the refs-xor-conflicts invariant.
    pub fn validate(&self) -> Result<(), TypesError> {
        let invalid = |reason: String| TypesError::InvalidLeaf {
            repo: self.key.to_string(),
            reason,
        };
        for (branch, list) in &self.conflicts {
            if self.refs.contains_key(branch) {
                return Err(invalid(format!(
                    "branch {} has both a ref and conflicts",
                    branch
                )));
            }
            if list.len() < 2 {
                return Err(invalid(format!(
                    "branch {} has {} conflict alternative(s), expected at least 2",
                    branch,
                    list.len()
                )));
            }
            if list.windows(2).any(|w| w[0] >= w[1]) {
                return Err(invalid(format!(
                    "conflicts of branch {} are not sorted and deduplicated",
                    branch
                )));
            }
        }
        Ok(())
    }
}

/// A mutable, non-historical repo record of the live collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveRepo {
    /// Identity of the repo.
    pub key: RepoKey,
    /// Resolved owner user id.
    pub owner_id: String,
    /// Current value of each branch.
    #[serde(default)]
    pub refs: BTreeMap<String, ObjectId>,
    /// Alternatives of each branch, excluding `refs[branch]`.
    #[serde(default)]
    pub conflicts: BTreeMap<String, Vec<ObjectId>>,
}

impl LiveRepo {
    /// Create a live record from a snapshot leaf.
    pub fn from_leaf(leaf: &RepoLeaf, owner_id: impl Into<String>) -> Self {
        Self {
            key: leaf.key.clone(),
            owner_id: owner_id.into(),
            refs: leaf.refs.clone(),
            conflicts: leaf.conflicts.clone(),
        }
    }

    /// Current value of a branch.
    pub fn ref_of(&self, branch: &str) -> Option<ObjectId> {
        self.refs.get(branch).copied()
    }

    /// Live alternatives of a branch, not counting `refs[branch]`.
    pub fn conflicts_of(&self, branch: &str) -> &[ObjectId] {
        self.conflicts
            .get(branch)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fold this record back into the snapshot shape.
    ///
    /// A branch with live alternatives becomes a conflict list containing
    /// the alternatives plus the current ref.
    pub fn to_leaf(&self) -> RepoLeaf {
        let mut leaf = RepoLeaf::new(self.key.clone());
        let branches: BTreeSet<&String> =
            self.refs.keys().chain(self.conflicts.keys()).collect();
        for branch in branches {
            let alts = self
                .conflicts_of(branch)
                .iter()
                .copied()
                .chain(self.ref_of(branch));
            leaf.set_alternatives(branch, alts);
        }
        leaf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NULL_SHA1;

    fn id(s: &str) -> ObjectId {
        ObjectId::digest("commit", s.as_bytes())
    }

    fn key() -> RepoKey {
        RepoKey::new("alice", "photos")
    }

    #[test]
    fn single_alternative_collapses_into_refs() {
        let leaf = RepoLeaf::new(key()).with_alternatives(MASTER, [id("c1"), id("c1")]);
        assert_eq!(leaf.refs.get(MASTER), Some(&id("c1")));
        assert!(leaf.conflicts.is_empty());
        leaf.validate().unwrap();
    }

    #[test]
    fn multiple_alternatives_become_sorted_conflicts() {
        let leaf = RepoLeaf::new(key()).with_alternatives(MASTER, [id("c2"), id("c1"), id("c2")]);
        assert!(leaf.refs.is_empty());
        assert_eq!(
            leaf.conflicts.get(MASTER).unwrap(),
            &sorted_dedup([id("c1"), id("c2")])
        );
        leaf.validate().unwrap();
    }

    #[test]
    fn empty_alternatives_remove_branch() {
        let mut leaf = RepoLeaf::new(key()).with_ref(MASTER, id("c1"));
        leaf.set_alternatives(MASTER, []);
        assert!(leaf.branches().is_empty());
    }

    #[test]
    fn alternatives_prefer_conflicts() {
        let leaf = RepoLeaf::new(key()).with_alternatives(MASTER, [NULL_SHA1, id("c1")]);
        assert_eq!(leaf.alternatives(MASTER), vec![NULL_SHA1, id("c1")]);
        assert!(leaf.alternatives("branches/other").is_empty());
    }

    #[test]
    fn validate_rejects_ref_and_conflicts() {
        let mut leaf = RepoLeaf::new(key()).with_alternatives(MASTER, [id("a"), id("b")]);
        leaf.refs.insert(MASTER.to_string(), id("a"));
        assert!(matches!(
            leaf.validate(),
            Err(TypesError::InvalidLeaf { .. })
        ));
    }

    #[test]
    fn validate_rejects_single_conflict() {
        let mut leaf = RepoLeaf::new(key());
        leaf.conflicts.insert(MASTER.to_string(), vec![id("a")]);
        assert!(leaf.validate().is_err());
    }

    #[test]
    fn validate_rejects_unsorted_conflicts() {
        let mut leaf = RepoLeaf::new(key());
        let mut list = sorted_dedup([id("a"), id("b")]);
        list.reverse();
        leaf.conflicts.insert(MASTER.to_string(), list);
        assert!(leaf.validate().is_err());
    }

    #[test]
    fn live_repo_folds_alternatives_into_leaf() {
        let mut live = LiveRepo::from_leaf(&RepoLeaf::new(key()).with_ref(MASTER, id("c1")), "u1");
        live.conflicts.insert(MASTER.to_string(), vec![id("c2")]);

        let leaf = live.to_leaf();
        assert_eq!(
            leaf.conflicts.get(MASTER).unwrap(),
            &sorted_dedup([id("c1"), id("c2")])
        );
        leaf.validate().unwrap();
    }

    #[test]
    fn live_repo_clean_roundtrip() {
        let leaf = RepoLeaf::new(key()).with_ref(MASTER, id("c1"));
        let live = LiveRepo::from_leaf(&leaf, "u1");
        assert_eq!(live.ref_of(MASTER), Some(id("c1")));
        assert!(live.conflicts_of(MASTER).is_empty());
        assert_eq!(live.to_leaf(), leaf);
    }
}
