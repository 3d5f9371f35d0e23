//! Garbage collection and repacking for the unified object store.
//!
//! Three independent operations, composable into a full gc pass:
//! [`prune`] deletes loose objects reachable from nothing, [`compact`]
//! streams the remaining loose objects into a single pack, and
//! [`deltify`] replaces selected full objects with delta-encoded
//! variants of themselves when doing so clearly pays for the space.

pub mod compact;
pub mod deltify;
pub mod prune;
mod reachability;

pub use compact::compact;
pub use deltify::{deltify, AcceptedDelta, DeltaCandidate};
pub use prune::{collect_roots, prune};
pub use reachability::mark_reachable;

use thiserror::Error;

/// Errors produced by garbage collection operations.
#[derive(Debug, Error)]
pub enum GcError {
    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Loose(#[from] git_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
