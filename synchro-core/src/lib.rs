//! # synchro-core
//!
//! Snapshot merge and replay engine for synchro (no I/O, instant tests).
//!
//! A synchro is a content-addressed commit history whose snapshots hold one
//! leaf per replicated repo. This crate finds merge bases, merges snapshots
//! three-way, and replays the resulting two-way diffs onto the live repo
//! collection.
//!
//! ## Design Philosophy
//!
//! The engine is synchronous and performs no I/O of its own. Storage is
//! reached through the collaborator traits in [`store`]:
//! - [`ContentStore`] for commits, trees and refs
//! - [`OpStateStore`] for the `APPLYING` guard
//! - [`RepoStore`] for the live collection, with guarded writes
//! - [`OwnerDirectory`] for username lookups
//!
//! The [`memory`] module implements all of them in memory, which keeps the
//! tests free of mocks and lets the CLI persist a peer as plain JSON.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod diff;
pub mod driver;
pub mod error;
pub mod memory;
pub mod merge;
pub mod merge_base;
pub mod staging;
pub mod store;

pub use apply::{ApplyFailure, ApplyOptions, ApplyReport, DiffApplier};
pub use diff::{
    load_leaves, Delta, ThreeWayChange, ThreeWayDiffHandler, ThreeWayDiffStream, TreeDiff,
    TwoWayDiffHandler, TwoWayDiffStream,
};
pub use driver::{FetchOutcome, SnapshotOutcome, SynchroDriver, SynchroMerge, SynchroOptions};
pub use error::{Result, StoreError, StoreResult, SynchroError};
pub use memory::{
    ContentState, MemoryContentStore, MemoryOwnerDirectory, MemoryRepoStore, RepoState,
};
pub use merge::{MergeOptions, MergeOutcome, MergeStatus, Resolution, SnapshotMerger};
pub use merge_base::{merge_bases, merge_bases_in};
pub use staging::StagingTree;
pub use store::{
    ContentStore, Guard, OpState, OpStateStore, OwnerDirectory, RepoStore, RepoUpdate,
};
