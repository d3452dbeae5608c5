//! Replaying snapshot diffs onto the live repo collection.
//!
//! Every write is guarded by the value the applier expects to find, so a
//! replay of an already-applied diff and concurrent edits by unrelated
//! operations are detected instead of overwritten.

use synchro_types::{LiveRepo, ObjectId, RepoKey, RepoLeaf, MASTER, NULL_SHA1};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::diff::{TreeDiff, TwoWayDiffHandler, TwoWayDiffStream};
use crate::error::{Result, StoreError, SynchroError};
use crate::store::{ContentStore, Guard, OwnerDirectory, RepoStore, RepoUpdate};

/// How many archive ids are tried before a delete gives up.
pub const ARCHIVE_ATTEMPTS: usize = 8;

/// Apply settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Leaf branch whose value is compared and advanced.
    pub branch: String,
    /// Owner id stored when the owner's username is unknown.
    pub unknown_owner: String,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            branch: MASTER.to_string(),
            unknown_owner: "unknown".to_string(),
        }
    }
}

/// A repo whose apply was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    /// The repo, `owner/name`.
    pub repo: String,
    /// What went wrong.
    pub reason: String,
}

/// Counts of what an apply did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Records inserted.
    pub added: usize,
    /// Records archived and removed.
    pub deleted: usize,
    /// Records whose branch was advanced.
    pub modified: usize,
    /// Records that gained or replaced conflict alternatives.
    pub conflicts: usize,
    /// Events that needed no write.
    pub skipped: usize,
    /// Repos whose apply was aborted.
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    /// Whether every repo applied.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn recorded failures into an [`SynchroError::ApplyFailed`].
    pub fn into_result(self) -> Result<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(SynchroError::ApplyFailed {
                repo: first.repo.clone(),
                reason: if self.failures.len() == 1 {
                    first.reason.clone()
                } else {
                    format!("{} (and {} more)", first.reason, self.failures.len() - 1)
                },
            }),
        }
    }
}

/// Replays two-way snapshot diffs onto a [`RepoStore`].
#[derive(Debug)]
pub struct DiffApplier<'a, R: ?Sized, O: ?Sized, D> {
    repos: &'a R,
    owners: &'a O,
    diff: D,
    options: ApplyOptions,
}

impl<'a, R, O, S> DiffApplier<'a, R, O, TreeDiff<'a, S>>
where
    R: RepoStore + ?Sized,
    O: OwnerDirectory + ?Sized,
    S: ContentStore + ?Sized,
{
    /// Create an applier that diffs the trees of `content`.
    pub fn new(content: &'a S, repos: &'a R, owners: &'a O, options: ApplyOptions) -> Self {
        Self::with_diff(TreeDiff::new(content), repos, owners, options)
    }
}

impl<'a, R, O, D> DiffApplier<'a, R, O, D>
where
    R: RepoStore + ?Sized,
    O: OwnerDirectory + ?Sized,
    D: TwoWayDiffStream,
{
    /// Create an applier with a custom two-way diff stream.
    pub fn with_diff(diff: D, repos: &'a R, owners: &'a O, options: ApplyOptions) -> Self {
        Self {
            repos,
            owners,
            diff,
            options,
        }
    }

    /// Replay the diff from `a` (or the empty snapshot) to `b`.
    ///
    /// A repo whose guarded write must succeed but did not is recorded and
    /// skipped; the remaining repos are still applied. Any recorded failure
    /// is returned as [`SynchroError::ApplyFailed`] once the stream is done.
    pub fn apply_snapshot_diff(&self, a: Option<ObjectId>, b: ObjectId) -> Result<ApplyReport> {
        let mut handler = ApplyHandler {
            repos: self.repos,
            owners: self.owners,
            options: &self.options,
            report: ApplyReport::default(),
        };
        self.diff.diff2(a, b, &mut handler)?;

        let report = handler.report;
        info!(
            added = report.added,
            deleted = report.deleted,
            modified = report.modified,
            conflicts = report.conflicts,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Applied snapshot diff"
        );
        report.into_result()
    }
}

struct ApplyHandler<'h, R: ?Sized, O: ?Sized> {
    repos: &'h R,
    owners: &'h O,
    options: &'h ApplyOptions,
    report: ApplyReport,
}

impl<R, O> ApplyHandler<'_, R, O>
where
    R: RepoStore + ?Sized,
    O: OwnerDirectory + ?Sized,
{
    fn branch(&self) -> &str {
        &self.options.branch
    }

    /// Record `ApplyFailed` for the repo and carry on; anything else aborts.
    fn settle(&mut self, key: &RepoKey, result: Result<()>) -> Result<()> {
        match result {
            Err(SynchroError::ApplyFailed { repo, reason }) => {
                warn!(%repo, %reason, "Apply failed for repo");
                self.report.failures.push(ApplyFailure { repo, reason });
                Ok(())
            }
            Err(e) => Err(e),
            Ok(()) => {
                debug!(repo = %key, "Applied repo");
                Ok(())
            }
        }
    }

    fn owner_id(&self, key: &RepoKey) -> String {
        self.owners.user_id(&key.owner).unwrap_or_else(|| {
            warn!(repo = %key, owner = %key.owner, "Unknown owner, using fallback");
            self.options.unknown_owner.clone()
        })
    }

    fn guard_master(&self, id: Option<ObjectId>) -> Guard {
        Guard::RefIs {
            branch: self.branch().to_string(),
            id,
        }
    }

    /// Matches a live record still at `a`'s state of the tracked branch:
    /// its ref equals `a.refs[branch]` (both may be unset) or is one of
    /// `a.conflicts[branch]`.
    fn guard_lineage(&self, a: &RepoLeaf) -> Guard {
        let branch = self.branch();
        Guard::Any(vec![
            self.guard_master(a.refs.get(branch).copied()),
            Guard::RefIn {
                branch: branch.to_string(),
                ids: a.conflicts.get(branch).cloned().unwrap_or_default(),
            },
        ])
    }

    fn added(&mut self, b: &RepoLeaf) -> Result<()> {
        let repo = LiveRepo::from_leaf(b, self.owner_id(&b.key));
        match self.repos.insert(repo) {
            Ok(()) => {
                self.report.added += 1;
                Ok(())
            }
            Err(StoreError::Duplicate(_)) => {
                debug!(repo = %b.key, "Repo already exists, recording alternatives");
                self.added_existing(b)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn added_existing(&mut self, b: &RepoLeaf) -> Result<()> {
        let Some(local) = self.repos.find(&b.key)? else {
            return Err(apply_failed(&b.key, "record vanished after insert collision"));
        };
        let current = local.ref_of(self.branch());

        let ids = if b.is_conflicted(self.branch()) {
            b.alternatives(self.branch())
                .into_iter()
                .filter(|id| Some(*id) != current)
                .collect()
        } else {
            match b.refs.get(self.branch()) {
                None => {
                    self.report.skipped += 1;
                    return Ok(());
                }
                Some(bref) if Some(*bref) == current => {
                    self.report.skipped += 1;
                    return Ok(());
                }
                Some(bref) => vec![*bref],
            }
        };

        let update = RepoUpdate::SetConflicts {
            branch: self.branch().to_string(),
            ids,
        };
        if self.repos.update(&b.key, &self.guard_master(current), &update)? == 0 {
            return Err(apply_failed(&b.key, "local branch changed while recording conflict"));
        }
        self.report.conflicts += 1;
        Ok(())
    }

    fn deleted(&mut self, a: &RepoLeaf) -> Result<()> {
        let Some(local) = self.repos.find(&a.key)? else {
            debug!(repo = %a.key, "Repo already absent");
            self.report.skipped += 1;
            return Ok(());
        };

        let guard = self.guard_lineage(a);
        if guard.matches(&local) {
            self.archive(&local)?;
            if self.repos.remove(&a.key, &guard)? == 1 {
                self.report.deleted += 1;
                return Ok(());
            }
        }
        self.mark_deleted_upstream(&a.key)
    }

    /// Best effort: keep the diverged record and flag the upstream delete.
    fn mark_deleted_upstream(&mut self, key: &RepoKey) -> Result<()> {
        let Some(local) = self.repos.find(key)? else {
            self.report.skipped += 1;
            return Ok(());
        };
        let update = RepoUpdate::SetConflicts {
            branch: self.branch().to_string(),
            ids: vec![NULL_SHA1],
        };
        let guard = self.guard_master(local.ref_of(self.branch()));
        if self.repos.update(key, &guard, &update)? == 0 {
            warn!(repo = %key, "Diverged repo changed concurrently, delete not recorded");
            self.report.skipped += 1;
        } else {
            debug!(repo = %key, "Diverged repo kept, upstream delete recorded");
            self.report.conflicts += 1;
        }
        Ok(())
    }

    fn archive(&self, repo: &LiveRepo) -> Result<()> {
        let mut archive_id = repo.key.to_string();
        for _ in 0..ARCHIVE_ATTEMPTS {
            match self.repos.archive(&archive_id, repo) {
                Ok(()) => return Ok(()),
                Err(StoreError::Duplicate(taken)) => {
                    archive_id = format!("{}~{}", repo.key, Uuid::new_v4().simple());
                    warn!(repo = %repo.key, %taken, retry = %archive_id, "Archive id taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(apply_failed(&repo.key, "no free archive id"))
    }

    fn modified(&mut self, a: &RepoLeaf, b: &RepoLeaf) -> Result<()> {
        let branch = self.branch().to_string();

        if b.is_conflicted(&branch) {
            let Some(local) = self.repos.find(&b.key)? else {
                warn!(repo = %b.key, "Repo deleted locally, conflicts not recorded");
                self.report.skipped += 1;
                return Ok(());
            };
            let current = local.ref_of(&branch);
            let update = RepoUpdate::SetConflicts {
                branch: branch.clone(),
                ids: b
                    .alternatives(&branch)
                    .into_iter()
                    .filter(|id| Some(*id) != current)
                    .collect(),
            };
            if self.repos.update(&b.key, &self.guard_master(current), &update)? == 0 {
                warn!(repo = %b.key, "Repo changed concurrently, conflicts not recorded");
                self.report.skipped += 1;
            } else {
                self.report.conflicts += 1;
            }
            return Ok(());
        }

        let Some(bref) = b.refs.get(&branch).copied() else {
            debug!(repo = %b.key, branch = %branch, "Branch removed upstream, nothing to apply");
            self.report.skipped += 1;
            return Ok(());
        };

        let advance = self.guard_lineage(a);
        let set = RepoUpdate::SetRef {
            branch: branch.clone(),
            id: bref,
        };
        if self.repos.update(&b.key, &advance, &set)? == 1 {
            self.report.modified += 1;
            return Ok(());
        }

        let diverged = Guard::RefIsNot {
            branch: branch.clone(),
            id: bref,
        };
        let add = RepoUpdate::AddConflict { branch, id: bref };
        if self.repos.update(&b.key, &diverged, &add)? == 1 {
            debug!(repo = %b.key, "Local branch diverged, recorded as conflict");
            self.report.conflicts += 1;
        } else {
            self.report.skipped += 1;
        }
        Ok(())
    }
}

impl<R, O> TwoWayDiffHandler for ApplyHandler<'_, R, O>
where
    R: RepoStore + ?Sized,
    O: OwnerDirectory + ?Sized,
{
    fn on_added(&mut self, b: RepoLeaf) -> Result<()> {
        b.validate().map_err(SynchroError::SnapshotInvalid)?;
        let result = self.added(&b);
        self.settle(&b.key, result)
    }

    fn on_deleted(&mut self, a: RepoLeaf) -> Result<()> {
        let result = self.deleted(&a);
        self.settle(&a.key, result)
    }

    fn on_modified(&mut self, a: RepoLeaf, b: RepoLeaf) -> Result<()> {
        b.validate().map_err(SynchroError::SnapshotInvalid)?;
        let result = self.modified(&a, &b);
        self.settle(&b.key, result)
    }
}

fn apply_failed(key: &RepoKey, reason: &str) -> SynchroError {
    SynchroError::ApplyFailed {
        repo: key.to_string(),
        reason: reason.to_string(),
    }
}
