//! Synchro-level operations: merge a remote branch, snapshot the live
//! collection, fetch from another peer and walk history.

use std::collections::{BTreeMap, BTreeSet};

use synchro_types::{branch_ref, remote_branch_ref, Commit, LiveRepo, ObjectId, Tree};
use tracing::{debug, info, warn};

use crate::apply::{ApplyOptions, ApplyReport, DiffApplier};
use crate::error::{Result, SynchroError};
use crate::merge::{commit_date_after, MergeOptions, MergeStatus, SnapshotMerger};
use crate::staging::StagingTree;
use crate::store::{ContentStore, OpState, OpStateStore, OwnerDirectory, RepoStore};

/// Synchro settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchroOptions {
    /// Name of the synchro, used in logs and errors.
    pub name: String,
    /// Subject of snapshot commits.
    pub snapshot_subject: String,
    /// Merge settings.
    pub merge: MergeOptions,
    /// Apply settings.
    pub apply: ApplyOptions,
}

impl Default for SynchroOptions {
    fn default() -> Self {
        Self {
            name: "all".to_string(),
            snapshot_subject: "Snapshot".to_string(),
            merge: MergeOptions::default(),
            apply: ApplyOptions::default(),
        }
    }
}

/// Result of [`SynchroDriver::merge_synchro`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchroMerge {
    /// How the merge was resolved.
    pub status: MergeStatus,
    /// Branch head before the merge.
    pub previous: ObjectId,
    /// Branch head after the merge.
    pub commit_id: ObjectId,
    /// Virtual base commits created on the way.
    pub virtual_bases: Vec<ObjectId>,
    /// What the live collection replay did, if it ran.
    pub applied: Option<ApplyReport>,
}

/// Result of [`SynchroDriver::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOutcome {
    /// Branch head after the snapshot.
    pub commit_id: ObjectId,
    /// Whether a new commit was written.
    pub created: bool,
}

/// Result of [`SynchroDriver::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The fetched branch head.
    pub commit_id: ObjectId,
    /// Commits copied into the local store.
    pub commits: usize,
    /// Trees copied into the local store.
    pub trees: usize,
    /// Whether the remote-tracking ref moved.
    pub updated: bool,
}

/// Drives merges between a synchro's local branches and remote-tracking
/// refs, and replays the results onto the live repo collection.
#[derive(Debug)]
pub struct SynchroDriver<'a, C: ?Sized, R: ?Sized, O: ?Sized> {
    content: &'a C,
    repos: &'a R,
    owners: &'a O,
    options: SynchroOptions,
}

impl<'a, C, R, O> SynchroDriver<'a, C, R, O>
where
    C: ContentStore + OpStateStore + ?Sized,
    R: RepoStore + ?Sized,
    O: OwnerDirectory + ?Sized,
{
    /// Create a driver over the given collaborators.
    pub fn new(content: &'a C, repos: &'a R, owners: &'a O, options: SynchroOptions) -> Self {
        Self {
            content,
            repos,
            owners,
            options,
        }
    }

    /// Settings in use.
    pub fn options(&self) -> &SynchroOptions {
        &self.options
    }

    fn require_ref(&self, name: &str) -> Result<ObjectId> {
        self.content
            .get_ref(name)?
            .ok_or_else(|| SynchroError::RefNotFound {
                name: name.to_string(),
            })
    }

    /// Merge `remotes/<remote>/branches/<branch>` into `branches/<branch>`.
    ///
    /// The live collection is updated for every status that changes the
    /// snapshot. The branch ref is advanced last, with compare-and-swap.
    pub fn merge_synchro(&self, branch: &str, remote: &str) -> Result<SynchroMerge> {
        let ours_ref = branch_ref(branch);
        let theirs_ref = remote_branch_ref(remote, branch);
        let ours = self.require_ref(&ours_ref)?;
        let theirs = self.require_ref(&theirs_ref)?;

        if ours == theirs {
            info!(synchro = %self.options.name, %ours_ref, "Already up to date");
            return Ok(SynchroMerge {
                status: MergeStatus::UpToDate,
                previous: ours,
                commit_id: ours,
                virtual_bases: Vec::new(),
                applied: None,
            });
        }

        let outcome = SnapshotMerger::new(self.content, self.options.merge.clone())
            .merge_recursive(ours, theirs)?;
        info!(
            synchro = %self.options.name,
            status = %outcome.status,
            commit = %outcome.commit_id,
            "Merged {} into {}", theirs_ref, ours_ref
        );

        let applied = match outcome.status {
            MergeStatus::UpToDate | MergeStatus::TrivialMerge => None,
            MergeStatus::FastForward | MergeStatus::MergeUnrelated | MergeStatus::Merge => {
                Some(self.apply_guarded(ours, outcome.commit_id)?)
            }
        };

        if outcome.status != MergeStatus::UpToDate {
            self.advance_ref(&ours_ref, Some(ours), outcome.commit_id)?;
        }

        Ok(SynchroMerge {
            status: outcome.status,
            previous: ours,
            commit_id: outcome.commit_id,
            virtual_bases: outcome.virtual_bases,
            applied,
        })
    }

    /// Replay `old..new` onto the live collection under the `APPLYING` guard.
    fn apply_guarded(&self, old: ObjectId, new: ObjectId) -> Result<ApplyReport> {
        if !self
            .content
            .transition_op(OpState::Idle, OpState::Applying)?
        {
            return Err(SynchroError::ApplyInProgress {
                synchro: self.options.name.clone(),
            });
        }
        info!(synchro = %self.options.name, "Op state IDLE -> APPLYING");

        let result = DiffApplier::new(
            self.content,
            self.repos,
            self.owners,
            self.options.apply.clone(),
        )
        .apply_snapshot_diff(Some(old), new);

        if self
            .content
            .transition_op(OpState::Applying, OpState::Idle)?
        {
            info!(synchro = %self.options.name, "Op state APPLYING -> IDLE");
        } else {
            warn!(synchro = %self.options.name, "Op state changed during apply");
        }
        result
    }

    fn advance_ref(&self, name: &str, old: Option<ObjectId>, new: ObjectId) -> Result<()> {
        if !self.content.update_ref(name, old, new)? {
            return Err(SynchroError::RefUpdateRejected {
                name: name.to_string(),
                expected: old.map(|id| id.to_hex()).unwrap_or_else(|| "none".to_string()),
            });
        }
        info!(synchro = %self.options.name, %name, %new, "Updated ref");
        Ok(())
    }

    /// Record the live collection as a new commit on `branches/<branch>`.
    ///
    /// Nothing is written when the live collection matches the current head.
    pub fn snapshot(&self, branch: &str) -> Result<SnapshotOutcome> {
        let name = branch_ref(branch);
        let head = self.content.get_ref(&name)?;

        let staging = StagingTree::from_leaves(self.repos.list()?.iter().map(LiveRepo::to_leaf));
        let repos_id = self.content.create_tree(staging.as_tree())?;

        let (root, parents) = match head {
            Some(head_id) => {
                let head_commit = self.content.get_commit(&head_id)?;
                let head_tree = self.content.get_tree(&head_commit.tree)?;
                if head_tree.repos_subtree() == Some(repos_id) {
                    debug!(%name, "Live collection unchanged");
                    return Ok(SnapshotOutcome {
                        commit_id: head_id,
                        created: false,
                    });
                }
                (head_tree.with_repos_subtree(repos_id), vec![head_commit])
            }
            None => (Tree::root(&self.options.merge.tree_name, repos_id), Vec::new()),
        };

        let tree = self.content.create_tree(root)?;
        let commit_id = self.content.create_commit(Commit {
            parents: head.into_iter().collect(),
            tree,
            subject: self.options.snapshot_subject.clone(),
            message: format!("{} repos", staging.len()),
            commit_date: commit_date_after(&parents),
            meta: Default::default(),
        })?;
        self.advance_ref(&name, head, commit_id)?;
        Ok(SnapshotOutcome {
            commit_id,
            created: true,
        })
    }

    /// Copy `branches/<branch>` of another peer into
    /// `remotes/<remote>/branches/<branch>`, with every missing commit and
    /// tree.
    ///
    /// The missing closure is read from `from` before anything is stored,
    /// and objects are stored parents first. A stored commit therefore
    /// always has its ancestry and trees stored too, even after a fetch that
    /// failed part way.
    pub fn fetch<F>(&self, from: &F, remote: &str, branch: &str) -> Result<FetchOutcome>
    where
        F: ContentStore + ?Sized,
    {
        let tip = from
            .get_ref(&branch_ref(branch))?
            .ok_or_else(|| SynchroError::RefNotFound {
                name: branch_ref(branch),
            })?;

        let mut missing = BTreeMap::new();
        let mut pending = vec![tip];
        while let Some(id) = pending.pop() {
            if missing.contains_key(&id) || self.content.find_commit(&id)?.is_some() {
                continue;
            }
            let commit = from.get_commit(&id)?;
            pending.extend(commit.parents.iter().copied());
            missing.insert(id, commit);
        }

        let mut commits = 0;
        let mut trees = 0;
        for id in parents_first(tip, &missing, |commit: &Commit| commit.parents.clone()) {
            let Some(commit) = missing.remove(&id) else {
                continue;
            };
            trees += self.copy_tree(from, commit.tree)?;
            let stored = self.content.create_commit(commit)?;
            if stored != id {
                return Err(SynchroError::Logic(format!(
                    "commit {} was stored as {}",
                    id, stored
                )));
            }
            commits += 1;
        }

        let name = remote_branch_ref(remote, branch);
        let current = self.content.get_ref(&name)?;
        let updated = current != Some(tip);
        if updated {
            self.advance_ref(&name, current, tip)?;
        }
        info!(synchro = %self.options.name, %remote, commits, trees, "Fetched {}", name);
        Ok(FetchOutcome {
            commit_id: tip,
            commits,
            trees,
            updated,
        })
    }

    /// Copy a tree and its missing subtrees, subtrees first.
    fn copy_tree<F>(&self, from: &F, root: ObjectId) -> Result<usize>
    where
        F: ContentStore + ?Sized,
    {
        let mut missing = BTreeMap::new();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if missing.contains_key(&id) || self.content.has_tree(&id)? {
                continue;
            }
            let tree = from.get_tree(&id)?;
            pending.extend(tree.subtrees().map(|(_, sub)| sub));
            missing.insert(id, tree);
        }

        let mut copied = 0;
        let order = parents_first(root, &missing, |tree: &Tree| {
            tree.subtrees().map(|(_, sub)| sub).collect()
        });
        for id in order {
            let Some(tree) = missing.remove(&id) else {
                continue;
            };
            let stored = self.content.create_tree(tree)?;
            if stored != id {
                return Err(SynchroError::Logic(format!(
                    "tree {} was stored as {}",
                    id, stored
                )));
            }
            copied += 1;
        }
        Ok(copied)
    }

    /// First-parent history of `branches/<branch>`, newest first.
    pub fn log(&self, branch: &str, limit: usize) -> Result<Vec<(ObjectId, Commit)>> {
        let mut next = Some(self.require_ref(&branch_ref(branch))?);
        let mut entries = Vec::new();
        while let Some(id) = next {
            if entries.len() >= limit {
                break;
            }
            let commit = self.content.get_commit(&id)?;
            next = commit.parents.first().copied();
            entries.push((id, commit));
        }
        Ok(entries)
    }
}

/// Post-order walk of the objects in `missing` reachable from `root`:
/// every object comes after the objects it points to.
fn parents_first<T>(
    root: ObjectId,
    missing: &BTreeMap<ObjectId, T>,
    edges: impl Fn(&T) -> Vec<ObjectId>,
) -> Vec<ObjectId> {
    let mut order = Vec::with_capacity(missing.len());
    let mut visited = BTreeSet::new();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        let Some(object) = missing.get(&id) else {
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        stack.extend(edges(object).into_iter().map(|next| (next, false)));
    }
    order
}
