//! Error types for mprt

use thiserror::Error;

use crate::{ANY_SOURCE, ANY_TAG};

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed communication or reduction.
///
/// Kinds are recorded in [`Status::error`](crate::Status::error) for
/// point-to-point transfers and carried inside [`Error::Comm`] when a
/// failure is surfaced to the caller.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The element types of the two buffers differ
    #[error("buffer type mismatch")]
    BufferType,

    /// The receive buffer is too small, or reduction buffers differ in length
    #[error("buffer size mismatch")]
    BufferSize,

    /// A wait can never be satisfied because no other participant exists
    #[error("deadlock detected")]
    Deadlock,

    /// No combine handler exists for the (operation, element type) pair
    #[error("unsupported reduction operation for this element type")]
    UnsupportedOp,

    /// Ranks entered different collective operations at the same time
    #[error("collective operation mismatch")]
    ActionMismatch,

    /// A blocking wait was interrupted through the rank's cancellation token
    #[error("operation cancelled")]
    Cancelled,
}

/// Error types for runtime operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A runtime failure reported by the named operation
    #[error("{op}: {kind}")]
    Comm {
        /// Operation that failed
        op: &'static str,
        /// What went wrong
        kind: ErrorKind,
    },

    /// A request index outside `[0, size)`
    #[error("{op}: illegal request index: {index} (list size {size})")]
    IllegalIndex {
        /// Operation that received the index
        op: &'static str,
        /// The offending index
        index: usize,
        /// Size of the request list
        size: usize,
    },

    /// Invalid rank specified
    #[error("{op}: invalid rank: {rank} (group size {size})")]
    InvalidRank {
        /// Operation that received the rank
        op: &'static str,
        /// The offending rank
        rank: i32,
        /// Number of ranks in the group
        size: i32,
    },

    /// Invalid tag specified
    #[error("{op}: invalid tag: {tag}")]
    InvalidTag {
        /// Operation that received the tag
        op: &'static str,
        /// The offending tag
        tag: i32,
    },

    /// Request used in a state that does not allow the operation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid driver configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A rank thread returned an error and the group was torn down
    #[error("rank {rank} aborted: {source}")]
    Aborted {
        /// The first rank that failed
        rank: i32,
        /// The error it returned
        #[source]
        source: Box<Error>,
    },

    /// A rank thread panicked
    #[error("rank {0} panicked")]
    RankPanicked(i32),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::Comm`].
    pub fn comm(op: &'static str, kind: ErrorKind) -> Self {
        Error::Comm { op, kind }
    }

    /// The runtime classification, if this is a [`Error::Comm`].
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Comm { kind, .. } => Some(*kind),
            Error::Aborted { source, .. } => source.kind(),
            _ => None,
        }
    }
}

/// Validate a destination rank.
pub(crate) fn check_dest(op: &'static str, dest: i32, size: i32) -> Result<()> {
    if dest < 0 || dest >= size {
        return Err(Error::InvalidRank {
            op,
            rank: dest,
            size,
        });
    }
    Ok(())
}

/// Validate a source rank; [`ANY_SOURCE`] is accepted.
pub(crate) fn check_source(op: &'static str, src: i32, size: i32) -> Result<()> {
    if src >= size || (src < 0 && src != ANY_SOURCE) {
        return Err(Error::InvalidRank {
            op,
            rank: src,
            size,
        });
    }
    Ok(())
}

/// Validate a send tag. Sends must carry a concrete, non-negative tag.
pub(crate) fn check_send_tag(op: &'static str, tag: i32) -> Result<()> {
    if tag < 0 {
        return Err(Error::InvalidTag { op, tag });
    }
    Ok(())
}

/// Validate a receive tag; [`ANY_TAG`] is accepted.
pub(crate) fn check_recv_tag(op: &'static str, tag: i32) -> Result<()> {
    if tag < 0 && tag != ANY_TAG {
        return Err(Error::InvalidTag { op, tag });
    }
    Ok(())
}

/// Validate a request-list index.
pub(crate) fn check_index(op: &'static str, index: usize, size: usize) -> Result<()> {
    if index >= size {
        return Err(Error::IllegalIndex { op, index, size });
    }
    Ok(())
}
