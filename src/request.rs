//! Request handles for nonblocking point-to-point operations.
//!
//! The [`Request`] and [`RequestList`] traits are the interface shared by the
//! concurrent ([`mt`](crate::mt)) and sequential ([`uni`](crate::uni))
//! backends. The backends differ only in what happens when a wait cannot be
//! satisfied immediately: the concurrent backend blocks until another rank
//! thread matches the message, the sequential backend reports
//! [`ErrorKind::Deadlock`](crate::ErrorKind::Deadlock).

use crate::buffer::{RecvBuffer, SendBuffer};
use crate::error::Result;
use crate::status::Status;

/// Direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The request sends its buffer
    Send,
    /// The request receives into its buffer
    Recv,
}

/// Lifecycle state of a request.
///
/// ```text
/// Idle --start--> Active --match--> Completed
///                   |
///                   +----cancel---> Cancelled
/// ```
///
/// A `Completed` or `Cancelled` request may be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Constructed, never started
    Idle,
    /// Started, waiting for a matching peer
    Active,
    /// Matched; the status is final
    Completed,
    /// Removed from its queue before a match
    Cancelled,
}

impl RequestState {
    /// Check whether the request has reached a terminal state.
    pub fn is_done(self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Cancelled)
    }
}

/// A handle to one nonblocking send or receive.
///
/// # Example
///
/// ```
/// use mprt::{uni, Endpoint, RecvBuffer, Request, RequestState, SendBuffer};
///
/// let ep = uni::Endpoint::new();
/// let data = [1i32, 2, 3];
/// let mut out = [0i32; 3];
///
/// mprt::scope(|s| {
///     let mut recv = ep.init_recv(s, RecvBuffer::new(&mut out), 0, 7).unwrap();
///     let mut send = ep.init_send(s, SendBuffer::new(&data), 0, 7).unwrap();
///     recv.start().unwrap();
///     send.start().unwrap();
///
///     let status = recv.wait().unwrap();
///     assert_eq!(status.size, 3);
///     assert_eq!(send.state(), RequestState::Completed);
/// });
/// assert_eq!(out, [1, 2, 3]);
/// ```
pub trait Request {
    /// Direction of this request.
    fn mode(&self) -> Mode;

    /// Current lifecycle state.
    fn state(&self) -> RequestState;

    /// Last final status; [`Status::empty`] until the request completes.
    fn status(&self) -> Status;

    /// Post the request for matching. It may complete immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`](crate::Error::InvalidRequest) if the
    /// request is already active.
    fn start(&mut self) -> Result<()>;

    /// Poll for completion without blocking.
    ///
    /// Returns the final status once the request is completed or cancelled
    /// (repeatable, without side effects), [`Status::empty`] for a request
    /// that was never started, and `None` while it is still active.
    fn test(&mut self) -> Result<Option<Status>>;

    /// Block until the request completes or is cancelled.
    fn wait(&mut self) -> Result<Status>;

    /// Cancel an active request. No-op if it already completed, was
    /// cancelled, or was never started. If a match wins the race the request
    /// ends up completed instead.
    fn cancel(&mut self);

    /// Check whether the request is posted and not yet collected.
    fn is_active(&self) -> bool {
        self.state() == RequestState::Active
    }
}

/// An indexed, growable collection of requests with batch operations.
///
/// Every operation that takes an index validates it against
/// [`size`](Self::size) and fails with
/// [`Error::IllegalIndex`](crate::Error::IllegalIndex) before touching any
/// request.
pub trait RequestList<'a> {
    /// Number of requests in the list.
    fn size(&self) -> usize;

    /// Check whether the list holds no requests.
    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append a send request and return its index.
    fn add_send(&mut self, buf: SendBuffer<'a>, dest: i32, tag: i32) -> Result<usize>;

    /// Append a receive request and return its index.
    fn add_recv(&mut self, buf: RecvBuffer<'a>, src: i32, tag: i32) -> Result<usize>;

    /// Start request `index` unless it is already active.
    fn start_one(&mut self, index: usize) -> Result<()>;

    /// Start every request that is not active.
    fn start_all(&mut self);

    /// Poll request `index`. Inactive requests report their last status.
    fn test_one(&mut self, index: usize) -> Result<Option<Status>>;

    /// Poll the active requests among `indices`. On return `indices` holds
    /// the requests that completed, and the result holds their statuses in
    /// the same order.
    fn test_some(&mut self, indices: &mut Vec<usize>) -> Result<Vec<Status>>;

    /// Poll all requests. Returns one status per request once none is active.
    fn test_all(&mut self) -> Result<Option<Vec<Status>>>;

    /// Block until request `index` completes.
    fn wait_one(&mut self, index: usize) -> Result<Status>;

    /// Block until at least one active request among `indices` completes.
    /// `indices` is updated like in [`test_some`](Self::test_some).
    fn wait_some(&mut self, indices: &mut Vec<usize>) -> Result<Vec<Status>>;

    /// Block until every active request completes. Returns one status per
    /// request.
    fn wait_all(&mut self) -> Result<Vec<Status>>;

    /// Cancel request `index`.
    fn cancel_one(&mut self, index: usize) -> Result<()>;

    /// Cancel every active request. Returns one status per request.
    fn cancel_all(&mut self) -> Vec<Status>;

    /// Cancel outstanding requests, collect their statuses and empty the list.
    fn clear(&mut self) -> Vec<Status>;
}
