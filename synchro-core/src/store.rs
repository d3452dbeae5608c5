//! Collaborator contracts consumed by the engine.
//!
//! The engine never talks to storage directly. It reads history through a
//! [`ContentStore`], guards concurrent runs through an [`OpStateStore`],
//! mutates the live collection through a [`RepoStore`] and resolves owners
//! through an [`OwnerDirectory`].
//!
//! Every live-collection mutation is selector-guarded: it names a [`Guard`]
//! that the record must satisfy at the moment of the write, and reports how
//! many records it affected.

use serde::{Deserialize, Serialize};
use synchro_types::{sorted_dedup, Commit, LiveRepo, ObjectId, RepoKey, Tree};

use crate::error::{StoreError, StoreResult};

/// Immutable commit/tree storage plus the synchro ref namespace.
pub trait ContentStore {
    /// Fetch a commit. Returns `NotFound` if it is not stored.
    fn get_commit(&self, id: &ObjectId) -> StoreResult<Commit>;

    /// Fetch a tree. Returns `NotFound` if it is not stored.
    fn get_tree(&self, id: &ObjectId) -> StoreResult<Tree>;

    /// Store a tree and return its content address.
    fn create_tree(&self, tree: Tree) -> StoreResult<ObjectId>;

    /// Store a commit and return its content address.
    fn create_commit(&self, commit: Commit) -> StoreResult<ObjectId>;

    /// Current value of a ref.
    fn get_ref(&self, name: &str) -> StoreResult<Option<ObjectId>>;

    /// Compare-and-swap a ref from `old` to `new`.
    ///
    /// Returns `Ok(false)` if the ref no longer equals `old`.
    fn update_ref(&self, name: &str, old: Option<ObjectId>, new: ObjectId) -> StoreResult<bool>;

    /// Fetch a commit, mapping `NotFound` to `None`.
    fn find_commit(&self, id: &ObjectId) -> StoreResult<Option<Commit>> {
        match self.get_commit(id) {
            Ok(commit) => Ok(Some(commit)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a tree is stored.
    fn has_tree(&self, id: &ObjectId) -> StoreResult<bool> {
        match self.get_tree(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Operational state of a synchro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpState {
    /// No apply in progress.
    #[default]
    Idle,
    /// A diff is being replayed onto the live collection.
    Applying,
}

/// Storage of the synchro's operational-state field.
pub trait OpStateStore {
    /// Current state.
    fn op_state(&self) -> StoreResult<OpState>;

    /// Set the state to `next` if it currently equals `expected`.
    ///
    /// Returns `Ok(false)` if the precondition did not hold.
    fn transition_op(&self, expected: OpState, next: OpState) -> StoreResult<bool>;
}

/// Precondition a live record must satisfy for a guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The record exists.
    Exists,
    /// `refs[branch]` equals `id` (`None` means unset).
    RefIs {
        /// Branch key.
        branch: String,
        /// Expected value.
        id: Option<ObjectId>,
    },
    /// `refs[branch]` is one of `ids`.
    RefIn {
        /// Branch key.
        branch: String,
        /// Accepted values.
        ids: Vec<ObjectId>,
    },
    /// `refs[branch]` differs from `id`.
    RefIsNot {
        /// Branch key.
        branch: String,
        /// Rejected value.
        id: ObjectId,
    },
    /// At least one of the guards matches.
    Any(Vec<Guard>),
}

impl Guard {
    /// Evaluate the guard against a record.
    pub fn matches(&self, repo: &LiveRepo) -> bool {
        match self {
            Guard::Exists => true,
            Guard::RefIs { branch, id } => repo.ref_of(branch) == *id,
            Guard::RefIn { branch, ids } => repo
                .ref_of(branch)
                .map(|current| ids.contains(&current))
                .unwrap_or(false),
            Guard::RefIsNot { branch, id } => repo.ref_of(branch) != Some(*id),
            Guard::Any(guards) => guards.iter().any(|guard| guard.matches(repo)),
        }
    }
}

/// A mutation of a live record's refs/conflicts.
///
/// Every variant keeps the live invariant: `conflicts[branch]` is sorted,
/// deduplicated, non-empty and never contains `refs[branch]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoUpdate {
    /// Set `refs[branch]` and clear `conflicts[branch]`.
    SetRef {
        /// Branch key.
        branch: String,
        /// New value.
        id: ObjectId,
    },
    /// Replace `conflicts[branch]`.
    SetConflicts {
        /// Branch key.
        branch: String,
        /// New alternatives.
        ids: Vec<ObjectId>,
    },
    /// Add one alternative to `conflicts[branch]`.
    AddConflict {
        /// Branch key.
        branch: String,
        /// Alternative to add.
        id: ObjectId,
    },
}

impl RepoUpdate {
    /// Apply the mutation to a record.
    pub fn apply(&self, repo: &mut LiveRepo) {
        match self {
            RepoUpdate::SetRef { branch, id } => {
                repo.refs.insert(branch.clone(), *id);
                repo.conflicts.remove(branch);
            }
            RepoUpdate::SetConflicts { branch, ids } => {
                store_conflicts(repo, branch, ids.iter().copied());
            }
            RepoUpdate::AddConflict { branch, id } => {
                let existing = repo.conflicts_of(branch).to_vec();
                store_conflicts(repo, branch, existing.into_iter().chain([*id]));
            }
        }
    }
}

fn store_conflicts(repo: &mut LiveRepo, branch: &str, ids: impl IntoIterator<Item = ObjectId>) {
    let current = repo.ref_of(branch);
    let list = sorted_dedup(ids.into_iter().filter(|id| Some(*id) != current));
    if list.is_empty() {
        repo.conflicts.remove(branch);
    } else {
        repo.conflicts.insert(branch.to_string(), list);
    }
}

/// The live, mutable repo collection and its `deletedRepos` archive.
pub trait RepoStore {
    /// Fetch a record.
    fn find(&self, key: &RepoKey) -> StoreResult<Option<LiveRepo>>;

    /// All records, ordered by key.
    fn list(&self) -> StoreResult<Vec<LiveRepo>>;

    /// Insert a record. Returns `Duplicate` if the key already exists.
    fn insert(&self, repo: LiveRepo) -> StoreResult<()>;

    /// Apply `update` to the record if it satisfies `guard`.
    ///
    /// Returns the number of affected records (0 or 1).
    fn update(&self, key: &RepoKey, guard: &Guard, update: &RepoUpdate) -> StoreResult<u64>;

    /// Remove the record if it satisfies `guard`.
    ///
    /// Returns the number of affected records (0 or 1).
    fn remove(&self, key: &RepoKey, guard: &Guard) -> StoreResult<u64>;

    /// Copy a record into the archive under `archive_id`.
    ///
    /// Returns `Duplicate` if `archive_id` is already taken.
    fn archive(&self, archive_id: &str, repo: &LiveRepo) -> StoreResult<()>;
}

/// Username to user id lookup.
pub trait OwnerDirectory {
    /// Resolve a username. Unknown users yield `None`.
    fn user_id(&self, username: &str) -> Option<String>;
}
