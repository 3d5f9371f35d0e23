//! Git wire protocol implementation.
//!
//! This crate implements the git wire protocol for fetch and push
//! operations: pkt-line framing, capability negotiation, and the v1/v2
//! protocol exchanges built on top of them. Every exchange here is generic
//! over `Read`/`Write` — callers supply whatever transport (a TCP stream, a
//! pair of pipes, an in-memory buffer in tests) they already have open.

pub mod capability;
pub mod fetch;
pub mod pktline;
pub mod push;
pub mod sideband;
pub mod v1;
pub mod v2;

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
