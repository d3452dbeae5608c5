//! Recursive three-way merge of synchro snapshots.
//!
//! [`SnapshotMerger::merge_recursive`] first classifies how two commits
//! relate (up-to-date, fast-forward, identical trees, unrelated, single or
//! multiple merge bases) and only then diffs snapshots. Multiple merge bases
//! are folded into virtual bases with an explicit stack of frames, so deep
//! criss-cross histories never grow the call stack.

use std::time::{SystemTime, UNIX_EPOCH};

use synchro_types::{
    sorted_dedup, Commit, ObjectId, RepoKey, RepoLeaf, Tree, TypesError, NULL_SHA1,
};
use tracing::{debug, info};

use crate::diff::{
    load_leaves, Delta, ThreeWayChange, ThreeWayDiffHandler, ThreeWayDiffStream, TreeDiff,
};
use crate::error::{Result, SynchroError};
use crate::merge_base::merge_bases_in;
use crate::staging::StagingTree;
use crate::store::ContentStore;

/// How a merge was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// Theirs is already contained in ours.
    UpToDate,
    /// Ours is an ancestor of theirs; theirs is taken as is.
    FastForward,
    /// Both trees are identical; a merge commit reuses the tree.
    TrivialMerge,
    /// No common history; merged against the empty snapshot.
    MergeUnrelated,
    /// Three-way merge against one (possibly virtual) base.
    Merge,
}

impl MergeStatus {
    /// Whether the resolution wrote a new commit.
    pub fn creates_commit(&self) -> bool {
        matches!(
            self,
            MergeStatus::TrivialMerge | MergeStatus::MergeUnrelated | MergeStatus::Merge
        )
    }
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MergeStatus::UpToDate => "up-to-date",
            MergeStatus::FastForward => "fast-forward",
            MergeStatus::TrivialMerge => "trivial-merge",
            MergeStatus::MergeUnrelated => "merge-unrelated",
            MergeStatus::Merge => "merge",
        };
        f.write_str(s)
    }
}

/// Result of [`SnapshotMerger::merge_recursive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// How the merge was resolved.
    pub status: MergeStatus,
    /// The commit the merged branch should point at.
    pub commit_id: ObjectId,
    /// Virtual base commits created while folding multiple merge bases.
    pub virtual_bases: Vec<ObjectId>,
}

/// Merge settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Subject of merge commits.
    pub subject: String,
    /// Subject of virtual base commits.
    pub virtual_base_subject: String,
    /// Root tree name used when there is no base tree to copy.
    pub tree_name: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            subject: "Merge".to_string(),
            virtual_base_subject: "Virtual merge base".to_string(),
            tree_name: "synchro".to_string(),
        }
    }
}

/// What to do with a staging entry after a three-way change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Store this leaf.
    Set(RepoLeaf),
    /// Remove the entry.
    Remove,
}

/// Resolve a single changed repo of a three-way diff.
///
/// Present leaves are validated first; a violation aborts with
/// [`SynchroError::SnapshotInvalid`].
pub fn resolve_change(change: ThreeWayChange) -> Result<Resolution> {
    for delta in [&change.a, &change.b] {
        if let Delta::Added(leaf) | Delta::Modified { new: leaf, .. } = delta {
            leaf.validate().map_err(SynchroError::SnapshotInvalid)?;
        }
    }

    let key = change.key;
    let resolution = match (change.a, change.b) {
        (Delta::Unchanged, Delta::Unchanged) => {
            return Err(SynchroError::Logic(format!(
                "diff stream reported unchanged repo {} as changed",
                key
            )));
        }
        (Delta::Deleted(_), Delta::Deleted(_)) => Resolution::Remove,
        (Delta::Deleted(_), Delta::Added(kept) | Delta::Modified { new: kept, .. })
        | (Delta::Added(kept) | Delta::Modified { new: kept, .. }, Delta::Deleted(_)) => {
            Resolution::Set(deleted_vs_changed(key, &kept)?)
        }
        (
            Delta::Added(a) | Delta::Modified { new: a, .. },
            Delta::Added(b) | Delta::Modified { new: b, .. },
        ) => Resolution::Set(union_of(key, &a, &b)),
        (Delta::Deleted(_), Delta::Unchanged) | (Delta::Unchanged, Delta::Deleted(_)) => {
            Resolution::Remove
        }
        (Delta::Added(leaf) | Delta::Modified { new: leaf, .. }, Delta::Unchanged)
        | (Delta::Unchanged, Delta::Added(leaf) | Delta::Modified { new: leaf, .. }) => {
            Resolution::Set(leaf)
        }
    };
    Ok(resolution)
}

/// One side deleted the repo, the other changed it: every branch of the
/// surviving leaf gains `NULL_SHA1` as an alternative.
///
/// A surviving leaf without branches has nothing to hold the delete and is
/// rejected.
fn deleted_vs_changed(key: RepoKey, kept: &RepoLeaf) -> Result<RepoLeaf> {
    let branches = kept.branches();
    if branches.is_empty() {
        return Err(SynchroError::SnapshotInvalid(TypesError::InvalidLeaf {
            repo: key.to_string(),
            reason: "no branch to record a concurrent delete on".to_string(),
        }));
    }
    let mut leaf = RepoLeaf::new(key);
    for branch in branches {
        let alts = kept.alternatives(&branch).into_iter().chain([NULL_SHA1]);
        leaf.set_alternatives(&branch, alts);
    }
    Ok(leaf)
}

/// Both sides changed the repo: union the alternatives of every branch.
fn union_of(key: RepoKey, a: &RepoLeaf, b: &RepoLeaf) -> RepoLeaf {
    let mut leaf = RepoLeaf::new(key);
    for branch in a.branches().union(&b.branches()) {
        let candidates = sorted_dedup(
            a.alternatives(branch)
                .into_iter()
                .chain(b.alternatives(branch)),
        );
        leaf.set_alternatives(branch, candidates);
    }
    leaf
}

/// Applies resolutions to a staging tree.
struct StagingHandler<'s> {
    staging: &'s mut StagingTree,
}

impl ThreeWayDiffHandler for StagingHandler<'_> {
    fn on_changed(&mut self, change: ThreeWayChange) -> Result<()> {
        let key = change.key.clone();
        match resolve_change(change)? {
            Resolution::Set(leaf) => {
                debug!(repo = %key, conflicted = leaf.has_conflicts(), "Merged repo");
                self.staging.set(leaf);
            }
            Resolution::Remove => {
                debug!(repo = %key, "Removed repo");
                self.staging.del(&key);
            }
        }
        Ok(())
    }
}

/// A pending fold of several merge bases into one virtual base.
#[derive(Debug)]
struct Frame {
    ours: ObjectId,
    theirs: ObjectId,
    virtual_merge: bool,
    acc: ObjectId,
    pending: std::vec::IntoIter<ObjectId>,
}

enum Step {
    Done(MergeStatus, ObjectId),
    Fold(Frame),
}

/// Merges synchro commits.
#[derive(Debug)]
pub struct SnapshotMerger<'a, S: ?Sized, D = TreeDiff<'a, S>> {
    store: &'a S,
    diff: D,
    options: MergeOptions,
}

impl<'a, S: ContentStore + ?Sized> SnapshotMerger<'a, S> {
    /// Create a merger that diffs the trees of `store`.
    pub fn new(store: &'a S, options: MergeOptions) -> Self {
        Self {
            store,
            diff: TreeDiff::new(store),
            options,
        }
    }
}

impl<'a, S, D> SnapshotMerger<'a, S, D>
where
    S: ContentStore + ?Sized,
    D: ThreeWayDiffStream,
{
    /// Create a merger with a custom three-way diff stream.
    pub fn with_diff(store: &'a S, diff: D, options: MergeOptions) -> Self {
        Self {
            store,
            diff,
            options,
        }
    }

    /// Merge `theirs` into `ours`.
    ///
    /// No ref is touched; the caller decides whether to advance one.
    pub fn merge_recursive(&self, ours: ObjectId, theirs: ObjectId) -> Result<MergeOutcome> {
        let mut stack: Vec<Frame> = Vec::new();
        let mut virtual_bases = Vec::new();
        let mut step = self.classify(ours, theirs, false)?;

        loop {
            match step {
                Step::Fold(frame) => {
                    stack.push(frame);
                }
                Step::Done(status, commit_id) => match stack.last_mut() {
                    None => {
                        info!(%status, commit = %commit_id, "Merge resolved");
                        return Ok(MergeOutcome {
                            status,
                            commit_id,
                            virtual_bases,
                        });
                    }
                    Some(frame) => {
                        if status.creates_commit() {
                            virtual_bases.push(commit_id);
                        }
                        frame.acc = commit_id;
                    }
                },
            }
            step = self.advance(&mut stack)?;
        }
    }

    /// Continue the innermost fold: merge in the next base, or finish.
    fn advance(&self, stack: &mut Vec<Frame>) -> Result<Step> {
        let Some(frame) = stack.last_mut() else {
            return Err(SynchroError::Logic("merge fold stack is empty".to_string()));
        };
        if let Some(next) = frame.pending.next() {
            debug!(acc = %frame.acc, next = %next, "Folding merge base");
            return self.classify(frame.acc, next, true);
        }
        let Some(frame) = stack.pop() else {
            return Err(SynchroError::Logic("merge fold stack is empty".to_string()));
        };
        let commit_id = self.merge_snapshots(
            Some(frame.acc),
            frame.ours,
            frame.theirs,
            self.subject(frame.virtual_merge),
        )?;
        Ok(Step::Done(MergeStatus::Merge, commit_id))
    }

    fn classify(&self, ours: ObjectId, theirs: ObjectId, virtual_merge: bool) -> Result<Step> {
        let bases = merge_bases_in(self.store, ours, theirs);
        debug!(%ours, %theirs, bases = bases.len(), "Merge bases");

        if bases.contains(&theirs) {
            return Ok(Step::Done(MergeStatus::UpToDate, ours));
        }
        if bases.contains(&ours) {
            return Ok(Step::Done(MergeStatus::FastForward, theirs));
        }

        let subject = self.subject(virtual_merge);
        let our_commit = self.store.get_commit(&ours)?;
        let their_commit = self.store.get_commit(&theirs)?;
        if our_commit.tree == their_commit.tree {
            let tree = our_commit.tree;
            let commit_id =
                self.write_commit(&[our_commit, their_commit], [ours, theirs], tree, subject)?;
            return Ok(Step::Done(MergeStatus::TrivialMerge, commit_id));
        }

        let mut bases = bases.into_iter();
        match (bases.next(), bases.len()) {
            (None, _) => {
                let commit_id = self.merge_snapshots(None, ours, theirs, subject)?;
                Ok(Step::Done(MergeStatus::MergeUnrelated, commit_id))
            }
            (Some(base), 0) => {
                let commit_id = self.merge_snapshots(Some(base), ours, theirs, subject)?;
                Ok(Step::Done(MergeStatus::Merge, commit_id))
            }
            (Some(first), _) => Ok(Step::Fold(Frame {
                ours,
                theirs,
                virtual_merge,
                acc: first,
                pending: bases.collect::<Vec<_>>().into_iter(),
            })),
        }
    }

    /// Three-way merge of `ours` and `theirs` against `base` (or the empty
    /// snapshot), written as a new commit with parents `[ours, theirs]`.
    pub fn merge_snapshots(
        &self,
        base: Option<ObjectId>,
        ours: ObjectId,
        theirs: ObjectId,
        subject: &str,
    ) -> Result<ObjectId> {
        let mut staging = StagingTree::from_leaves(load_leaves(self.store, base)?.into_values());
        self.diff.diff3(
            base,
            ours,
            theirs,
            &mut StagingHandler {
                staging: &mut staging,
            },
        )?;

        let repos_id = self.store.create_tree(staging.as_tree())?;
        let root = match base {
            Some(base) => {
                let base_commit = self.store.get_commit(&base)?;
                self.store
                    .get_tree(&base_commit.tree)?
                    .with_repos_subtree(repos_id)
            }
            None => Tree::root(&self.options.tree_name, repos_id),
        };
        let tree_id = self.store.create_tree(root)?;

        let parents = [self.store.get_commit(&ours)?, self.store.get_commit(&theirs)?];
        self.write_commit(&parents, [ours, theirs], tree_id, subject)
    }

    fn write_commit(
        &self,
        parents: &[Commit],
        parent_ids: [ObjectId; 2],
        tree: ObjectId,
        subject: &str,
    ) -> Result<ObjectId> {
        let commit = Commit {
            parents: parent_ids.to_vec(),
            tree,
            subject: subject.to_string(),
            message: String::new(),
            commit_date: commit_date_after(parents),
            meta: Default::default(),
        };
        Ok(self.store.create_commit(commit)?)
    }

    fn subject(&self, virtual_merge: bool) -> &str {
        if virtual_merge {
            &self.options.virtual_base_subject
        } else {
            &self.options.subject
        }
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Date for a new commit: now, but never older than any parent.
pub fn commit_date_after(parents: &[Commit]) -> i64 {
    parents
        .iter()
        .map(|p| p.commit_date)
        .fold(unix_now(), i64::max)
}
