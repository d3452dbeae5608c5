//! In-memory collaborators.
//!
//! Used by the tests and by the CLI, which persists their state as JSON.
//! Each store wraps its state in `Arc<Mutex<_>>`; clones share the state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use synchro_types::{Commit, LiveRepo, ObjectId, RepoKey, Tree};

use crate::error::{StoreError, StoreResult};
use crate::store::{ContentStore, Guard, OpState, OpStateStore, OwnerDirectory, RepoStore, RepoUpdate};

/// Serializable state of a [`MemoryContentStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentState {
    /// Commits by id.
    #[serde(default)]
    pub commits: BTreeMap<ObjectId, Commit>,
    /// Trees by id.
    #[serde(default)]
    pub trees: BTreeMap<ObjectId, Tree>,
    /// Synchro refs.
    #[serde(default)]
    pub refs: BTreeMap<String, ObjectId>,
    /// Operational state.
    #[serde(default)]
    pub op: OpState,
}

/// In-memory content store for one synchro.
#[derive(Debug, Default, Clone)]
pub struct MemoryContentStore {
    state: Arc<Mutex<ContentState>>,
}

impl MemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from persisted state.
    pub fn from_state(state: ContentState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state.
    pub fn to_state(&self) -> ContentState {
        self.lock().clone()
    }

    /// Number of stored commits.
    pub fn commit_count(&self) -> usize {
        self.lock().commits.len()
    }

    /// Set a ref unconditionally.
    pub fn set_ref(&self, name: &str, id: ObjectId) {
        self.lock().refs.insert(name.to_string(), id);
    }

    /// All refs.
    pub fn refs(&self) -> BTreeMap<String, ObjectId> {
        self.lock().refs.clone()
    }

    /// Force the operational state, bypassing the precondition.
    pub fn reset_op_state(&self, op: OpState) {
        self.lock().op = op;
    }

    fn lock(&self) -> MutexGuard<'_, ContentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ContentStore for MemoryContentStore {
    fn get_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        self.lock()
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("commit {}", id)))
    }

    fn get_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        self.lock()
            .trees
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tree {}", id)))
    }

    fn create_tree(&self, tree: Tree) -> StoreResult<ObjectId> {
        let id = tree.id()?;
        self.lock().trees.entry(id).or_insert(tree);
        Ok(id)
    }

    fn create_commit(&self, commit: Commit) -> StoreResult<ObjectId> {
        let id = commit.id()?;
        self.lock().commits.entry(id).or_insert(commit);
        Ok(id)
    }

    fn get_ref(&self, name: &str) -> StoreResult<Option<ObjectId>> {
        Ok(self.lock().refs.get(name).copied())
    }

    fn update_ref(&self, name: &str, old: Option<ObjectId>, new: ObjectId) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.refs.get(name).copied() != old {
            return Ok(false);
        }
        state.refs.insert(name.to_string(), new);
        Ok(true)
    }
}

impl OpStateStore for MemoryContentStore {
    fn op_state(&self) -> StoreResult<OpState> {
        Ok(self.lock().op)
    }

    fn transition_op(&self, expected: OpState, next: OpState) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.op != expected {
            return Ok(false);
        }
        state.op = next;
        Ok(true)
    }
}

/// Serializable state of a [`MemoryRepoStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    /// Live records keyed by `owner/name`.
    #[serde(default)]
    pub repos: BTreeMap<String, LiveRepo>,
    /// Archived copies keyed by archive id.
    #[serde(default, rename = "deletedRepos")]
    pub deleted_repos: BTreeMap<String, LiveRepo>,
}

/// In-memory live repo collection with a `deletedRepos` archive.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepoStore {
    state: Arc<Mutex<RepoState>>,
}

impl MemoryRepoStore {
    /// Create a new empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection from persisted state.
    pub fn from_state(state: RepoState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state.
    pub fn to_state(&self) -> RepoState {
        self.lock().clone()
    }

    /// Insert or replace a record unconditionally (local edits).
    pub fn put(&self, repo: LiveRepo) {
        self.lock().repos.insert(repo.key.to_string(), repo);
    }

    /// Remove a record unconditionally (local edits).
    pub fn delete(&self, key: &RepoKey) -> Option<LiveRepo> {
        self.lock().repos.remove(&key.to_string())
    }

    /// Archived copies.
    pub fn deleted_repos(&self) -> BTreeMap<String, LiveRepo> {
        self.lock().deleted_repos.clone()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.lock().repos.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().repos.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RepoStore for MemoryRepoStore {
    fn find(&self, key: &RepoKey) -> StoreResult<Option<LiveRepo>> {
        Ok(self.lock().repos.get(&key.to_string()).cloned())
    }

    fn list(&self) -> StoreResult<Vec<LiveRepo>> {
        let mut repos: Vec<LiveRepo> = self.lock().repos.values().cloned().collect();
        repos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(repos)
    }

    fn insert(&self, repo: LiveRepo) -> StoreResult<()> {
        let mut state = self.lock();
        let id = repo.key.to_string();
        if state.repos.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        state.repos.insert(id, repo);
        Ok(())
    }

    fn update(&self, key: &RepoKey, guard: &Guard, update: &RepoUpdate) -> StoreResult<u64> {
        let mut state = self.lock();
        match state.repos.get_mut(&key.to_string()) {
            Some(repo) if guard.matches(repo) => {
                update.apply(repo);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    fn remove(&self, key: &RepoKey, guard: &Guard) -> StoreResult<u64> {
        let mut state = self.lock();
        let id = key.to_string();
        let matched = state
            .repos
            .get(&id)
            .map(|repo| guard.matches(repo))
            .unwrap_or(false);
        if !matched {
            return Ok(0);
        }
        state.repos.remove(&id);
        Ok(1)
    }

    fn archive(&self, archive_id: &str, repo: &LiveRepo) -> StoreResult<()> {
        let mut state = self.lock();
        if state.deleted_repos.contains_key(archive_id) {
            return Err(StoreError::Duplicate(archive_id.to_string()));
        }
        state
            .deleted_repos
            .insert(archive_id.to_string(), repo.clone());
        Ok(())
    }
}

/// In-memory username directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryOwnerDirectory {
    users: BTreeMap<String, String>,
}

impl MemoryOwnerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a user.
    pub fn with_user(mut self, username: &str, user_id: &str) -> Self {
        self.insert(username, user_id);
        self
    }

    /// Register a user.
    pub fn insert(&mut self, username: &str, user_id: &str) {
        self.users.insert(username.to_string(), user_id.to_string());
    }
}

impl OwnerDirectory for MemoryOwnerDirectory {
    fn user_id(&self, username: &str) -> Option<String> {
        self.users.get(username).cloned()
    }
}
