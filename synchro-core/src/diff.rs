//! Snapshot diff streams.
//!
//! A diff stream walks the repo leaves of two (or three) snapshots in key
//! order and reports each changed identity exactly once. Changes are modelled
//! as a [`Delta`] so that consumers match every case explicitly.

use std::collections::{BTreeMap, BTreeSet};
use synchro_types::{ObjectId, RepoKey, RepoLeaf};

use crate::error::Result;
use crate::store::ContentStore;

/// How one side relates to its reference snapshot for a single repo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Same leaf on both ends (or absent on both).
    Unchanged,
    /// Absent before, present now.
    Added(RepoLeaf),
    /// Present before, absent now. Carries the old leaf.
    Deleted(RepoLeaf),
    /// Present on both ends with different content.
    Modified {
        /// Leaf before.
        old: RepoLeaf,
        /// Leaf now.
        new: RepoLeaf,
    },
}

impl Delta {
    /// Classify the change from `old` to `new`.
    pub fn between(old: Option<&RepoLeaf>, new: Option<&RepoLeaf>) -> Self {
        match (old, new) {
            (None, None) => Delta::Unchanged,
            (None, Some(new)) => Delta::Added(new.clone()),
            (Some(old), None) => Delta::Deleted(old.clone()),
            (Some(old), Some(new)) if old == new => Delta::Unchanged,
            (Some(old), Some(new)) => Delta::Modified {
                old: old.clone(),
                new: new.clone(),
            },
        }
    }

    /// Whether this is anything but [`Delta::Unchanged`].
    pub fn is_changed(&self) -> bool {
        !matches!(self, Delta::Unchanged)
    }
}

/// One changed identity of a three-way diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreeWayChange {
    /// The repo.
    pub key: RepoKey,
    /// Leaf in the base snapshot, if any.
    pub base: Option<RepoLeaf>,
    /// Change from base to side a.
    pub a: Delta,
    /// Change from base to side b.
    pub b: Delta,
}

/// Receiver of two-way diff events.
pub trait TwoWayDiffHandler {
    /// `b` exists only at the new end.
    fn on_added(&mut self, b: RepoLeaf) -> Result<()>;

    /// `a` exists only at the old end.
    fn on_deleted(&mut self, a: RepoLeaf) -> Result<()>;

    /// The leaf changed from `a` to `b`.
    fn on_modified(&mut self, a: RepoLeaf, b: RepoLeaf) -> Result<()>;
}

/// Receiver of three-way diff events.
pub trait ThreeWayDiffHandler {
    /// At least one side changed relative to the base.
    fn on_changed(&mut self, change: ThreeWayChange) -> Result<()>;
}

/// Emits one event per repo identity that differs between two commits.
pub trait TwoWayDiffStream {
    /// Diff commit `a` (or the empty snapshot) against commit `b`.
    fn diff2<H: TwoWayDiffHandler>(
        &self,
        a: Option<ObjectId>,
        b: ObjectId,
        handler: &mut H,
    ) -> Result<()>;
}

/// Emits one event per repo identity changed on either side of a base.
pub trait ThreeWayDiffStream {
    /// Diff commits `a` and `b` against `base` (or the empty snapshot).
    fn diff3<H: ThreeWayDiffHandler>(
        &self,
        base: Option<ObjectId>,
        a: ObjectId,
        b: ObjectId,
        handler: &mut H,
    ) -> Result<()>;
}

/// Load every repo leaf of a commit's snapshot.
///
/// `None` is the empty snapshot, as is a root tree without a "repos" entry.
/// Nested subtrees below "repos" are walked as well.
pub fn load_leaves<S: ContentStore + ?Sized>(
    store: &S,
    commit: Option<ObjectId>,
) -> Result<BTreeMap<RepoKey, RepoLeaf>> {
    let mut leaves = BTreeMap::new();
    let Some(commit) = commit else {
        return Ok(leaves);
    };
    let root = store.get_tree(&store.get_commit(&commit)?.tree)?;
    let mut pending: Vec<ObjectId> = root.repos_subtree().into_iter().collect();
    while let Some(tree_id) = pending.pop() {
        let tree = store.get_tree(&tree_id)?;
        pending.extend(tree.subtrees().map(|(_, id)| id));
        for leaf in tree.leaves() {
            leaves.insert(leaf.key.clone(), leaf.clone());
        }
    }
    Ok(leaves)
}

/// Diff streams computed from the trees of a [`ContentStore`].
#[derive(Debug)]
pub struct TreeDiff<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: ContentStore + ?Sized> TreeDiff<'a, S> {
    /// Create a differ reading from `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: ContentStore + ?Sized> TwoWayDiffStream for TreeDiff<'_, S> {
    fn diff2<H: TwoWayDiffHandler>(
        &self,
        a: Option<ObjectId>,
        b: ObjectId,
        handler: &mut H,
    ) -> Result<()> {
        let old = load_leaves(self.store, a)?;
        let new = load_leaves(self.store, Some(b))?;
        let keys: BTreeSet<&RepoKey> = old.keys().chain(new.keys()).collect();
        for key in keys {
            match Delta::between(old.get(key), new.get(key)) {
                Delta::Unchanged => {}
                Delta::Added(b) => handler.on_added(b)?,
                Delta::Deleted(a) => handler.on_deleted(a)?,
                Delta::Modified { old, new } => handler.on_modified(old, new)?,
            }
        }
        Ok(())
    }
}

impl<S: ContentStore + ?Sized> ThreeWayDiffStream for TreeDiff<'_, S> {
    fn diff3<H: ThreeWayDiffHandler>(
        &self,
        base: Option<ObjectId>,
        a: ObjectId,
        b: ObjectId,
        handler: &mut H,
    ) -> Result<()> {
        let base_leaves = load_leaves(self.store, base)?;
        let a_leaves = load_leaves(self.store, Some(a))?;
        let b_leaves = load_leaves(self.store, Some(b))?;
        let keys: BTreeSet<&RepoKey> = base_leaves
            .keys()
            .chain(a_leaves.keys())
            .chain(b_leaves.keys())
            .collect();
        for key in keys {
            let base_leaf = base_leaves.get(key);
            let a_delta = Delta::between(base_leaf, a_leaves.get(key));
            let b_delta = Delta::between(base_leaf, b_leaves.get(key));
            if !a_delta.is_changed() && !b_delta.is_changed() {
                continue;
            }
            handler.on_changed(ThreeWayChange {
                key: key.clone(),
                base: base_leaf.cloned(),
                a: a_delta,
                b: b_delta,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryContentStore;
    use synchro_types::{Commit, Tree, MASTER};

    fn id(s: &str) -> ObjectId {
        ObjectId::digest("commit", s.as_bytes())
    }

    fn leaf(name: &str, master: &str) -> RepoLeaf {
        RepoLeaf::new(RepoKey::new("alice", name)).with_ref(MASTER, id(master))
    }

    fn commit_of(store: &MemoryContentStore, leaves: &[RepoLeaf]) -> ObjectId {
        let repos = Tree {
            name: "repos".into(),
            entries: leaves
                .iter()
                .cloned()
                .map(synchro_types::TreeEntry::Leaf)
                .collect(),
            meta: Default::default(),
        };
        let repos_id = store.create_tree(repos).unwrap();
        let root = store.create_tree(Tree::root("synchro", repos_id)).unwrap();
        store
            .create_commit(Commit {
                parents: vec![],
                tree: root,
                subject: "snapshot".into(),
                message: String::new(),
                commit_date: 1,
                meta: Default::default(),
            })
            .unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        changes: Vec<ThreeWayChange>,
    }

    impl TwoWayDiffHandler for Recorder {
        fn on_added(&mut self, b: RepoLeaf) -> Result<()> {
            self.events.push(format!("added {}", b.key));
            Ok(())
        }
        fn on_deleted(&mut self, a: RepoLeaf) -> Result<()> {
            self.events.push(format!("deleted {}", a.key));
            Ok(())
        }
        fn on_modified(&mut self, a: RepoLeaf, _b: RepoLeaf) -> Result<()> {
            self.events.push(format!("modified {}", a.key));
            Ok(())
        }
    }

    impl ThreeWayDiffHandler for Recorder {
        fn on_changed(&mut self, change: ThreeWayChange) -> Result<()> {
            self.changes.push(change);
            Ok(())
        }
    }

    #[test]
    fn delta_between() {
        let l = leaf("a", "c1");
        assert_eq!(Delta::between(None, None), Delta::Unchanged);
        assert_eq!(Delta::between(Some(&l), Some(&l)), Delta::Unchanged);
        assert!(matches!(Delta::between(None, Some(&l)), Delta::Added(_)));
        assert!(matches!(Delta::between(Some(&l), None), Delta::Deleted(_)));
        assert!(matches!(
            Delta::between(Some(&l), Some(&leaf("a", "c2"))),
            Delta::Modified { .. }
        ));
    }

    #[test]
    fn two_way_emits_one_event_per_changed_repo() {
        let store = MemoryContentStore::new();
        let a = commit_of(&store, &[leaf("keep", "k"), leaf("gone", "g"), leaf("edit", "e1")]);
        let b = commit_of(&store, &[leaf("keep", "k"), leaf("edit", "e2"), leaf("new", "n")]);

        let mut recorder = Recorder::default();
        TreeDiff::new(&store).diff2(Some(a), b, &mut recorder).unwrap();
        assert_eq!(
            recorder.events,
            vec!["modified alice/edit", "deleted alice/gone", "added alice/new"]
        );
    }

    #[test]
    fn two_way_from_empty_adds_everything() {
        let store = MemoryContentStore::new();
        let b = commit_of(&store, &[leaf("x", "1"), leaf("y", "2")]);
        let mut recorder = Recorder::default();
        TreeDiff::new(&store).diff2(None, b, &mut recorder).unwrap();
        assert_eq!(recorder.events, vec!["added alice/x", "added alice/y"]);
    }

    #[test]
    fn three_way_skips_unchanged_and_reports_sides() {
        let store = MemoryContentStore::new();
        let base = commit_of(&store, &[leaf("same", "s"), leaf("ours", "o1"), leaf("both", "b0")]);
        let a = commit_of(&store, &[leaf("same", "s"), leaf("ours", "o2"), leaf("both", "b1")]);
        let b = commit_of(&store, &[leaf("same", "s"), leaf("ours", "o1")]);

        let mut recorder = Recorder::default();
        TreeDiff::new(&store)
            .diff3(Some(base), a, b, &mut recorder)
            .unwrap();

        assert_eq!(recorder.changes.len(), 2);
        let both = &recorder.changes[0];
        assert_eq!(both.key, RepoKey::new("alice", "both"));
        assert!(matches!(both.a, Delta::Modified { .. }));
        assert!(matches!(both.b, Delta::Deleted(_)));

        let ours = &recorder.changes[1];
        assert_eq!(ours.key, RepoKey::new("alice", "ours"));
        assert!(matches!(ours.a, Delta::Modified { .. }));
        assert_eq!(ours.b, Delta::Unchanged);
    }

    #[test]
    fn load_leaves_walks_nested_subtrees() {
        let store = MemoryContentStore::new();
        let inner = store
            .create_tree(Tree {
                name: "a".into(),
                entries: vec![synchro_types::TreeEntry::Leaf(leaf("nested", "n"))],
                meta: Default::default(),
            })
            .unwrap();
        let repos = store
            .create_tree(Tree {
                name: "repos".into(),
                entries: vec![
                    synchro_types::TreeEntry::Tree {
                        name: "a".into(),
                        id: inner,
                    },
                    synchro_types::TreeEntry::Leaf(leaf("top", "t")),
                ],
                meta: Default::default(),
            })
            .unwrap();
        let root = store.create_tree(Tree::root("synchro", repos)).unwrap();
        let commit = store
            .create_commit(Commit {
                parents: vec![],
                tree: root,
                subject: "nested".into(),
                message: String::new(),
                commit_date: 1,
                meta: Default::default(),
            })
            .unwrap();

        let leaves = load_leaves(&store, Some(commit)).unwrap();
        assert_eq!(leaves.len(), 2);
        assert!(leaves.contains_key(&RepoKey::new("alice", "nested")));
    }
}
