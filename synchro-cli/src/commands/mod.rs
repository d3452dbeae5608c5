//! CLI command implementations.

pub mod fetch;
pub mod init;
pub mod log;
pub mod merge;
pub mod merge_base;
pub mod repo;
pub mod snapshot;
pub mod status;
