//! Ancestry operations and reachability walks over the object store.
//!
//! This crate provides `walkAncestry` (topological commit traversal),
//! `mergeBase`/`isAncestor` (common-ancestor queries via the paint
//! algorithm), and the reachability walk used by pack generation:
//! `collectReachable(wants, haves)` enumerates every object reachable from
//! `wants` that is not reachable from any `have`.

mod walk;
mod merge_base;
mod objects;

pub use walk::{RevWalk, SortOrder, WalkOptions};
pub use merge_base::{merge_base, merge_base_one, is_ancestor};
pub use objects::collect_reachable;

use git_hash::ObjectId;

/// Errors produced by ancestry and reachability operations.
#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("commit not found: {0}")]
    CommitNotFound(ObjectId),

    #[error("object is not a commit: {0}")]
    NotACommit(ObjectId),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
