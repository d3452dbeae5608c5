//! # synchro-types
//!
//! Foundation types for synchro replication.
//!
//! This crate provides the types shared by every synchro crate:
//! - [`ObjectId`], [`NULL_SHA1`], [`RepoKey`] - Identity types
//! - [`Commit`], [`Tree`], [`TreeEntry`] - Immutable history objects
//! - [`RepoLeaf`] - A repo's refs/conflicts as recorded in a snapshot
//! - [`LiveRepo`] - A repo's refs/conflicts in the live collection
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod leaf;
mod objects;

pub use error::TypesError;
pub use ids::{branch_ref, remote_branch_ref, ObjectId, RepoKey, NULL_SHA1};
pub use leaf::{sorted_dedup, LiveRepo, RepoLeaf, MASTER};
pub use objects::{Commit, Tree, TreeEntry, REPOS_ENTRY};
