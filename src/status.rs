//! Completion status of point-to-point operations.
//!
//! This module provides the [`Status`] struct produced once per completed,
//! failed or cancelled request.

use crate::error::{Error, ErrorKind, Result};
use crate::{ANY_SOURCE, ANY_TAG};

/// Outcome of a send or receive.
///
/// Returned by [`Request::test`](crate::Request::test),
/// [`Request::wait`](crate::Request::wait) and the batch operations of
/// [`RequestList`](crate::RequestList).
///
/// # Example
///
/// ```
/// use mprt::Status;
///
/// let status = Status::empty();
/// assert_eq!(status.size, 0);
/// assert!(status.error.is_none());
/// assert!(!status.cancelled);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Rank of the peer: the sender for a receive, the destination for a send.
    pub source: i32,
    /// Tag of the matched message.
    pub tag: i32,
    /// Number of elements transferred.
    pub size: usize,
    /// Failure classification, if the transfer did not take place.
    pub error: Option<ErrorKind>,
    /// Set when the request was cancelled before it could be matched.
    pub cancelled: bool,
}

impl Status {
    /// Status of a request that has not run: wildcard peer and tag, no data.
    pub const fn empty() -> Self {
        Status {
            source: ANY_SOURCE,
            tag: ANY_TAG,
            size: 0,
            error: None,
            cancelled: false,
        }
    }

    pub(crate) const fn cancelled() -> Self {
        Status {
            cancelled: true,
            ..Status::empty()
        }
    }

    /// Check whether the operation completed without error and was not cancelled.
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }

    /// Convert a recorded failure into an [`Error::Comm`] for `op`.
    pub fn check(&self, op: &'static str) -> Result<()> {
        match self.error {
            Some(kind) => Err(Error::comm(op, kind)),
            None => Ok(()),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::empty()
    }
}
