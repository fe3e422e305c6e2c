//! Per-rank endpoints of the thread-per-rank backend.

use std::sync::Arc;

use tracing::debug;

use super::arena::Arena;
use super::collective::{self, Action};
use super::{Request, RequestList};
use crate::buffer::{RecvBuffer, SendBuffer};
use crate::cancel::CancelToken;
use crate::error::{check_dest, Error, Result};
use crate::scope::Scope;
use crate::ReduceOp;

/// One rank of a group of threads sharing an arena.
///
/// Create a group with [`Endpoint::group`] and move one endpoint into each
/// thread.
///
/// # Example
///
/// ```
/// use mprt::{mt, Endpoint, RecvBuffer, SendBuffer, ANY_SOURCE};
/// use std::thread;
///
/// let mut eps = mt::Endpoint::group(2).unwrap();
/// let one = eps.pop().unwrap();
/// let zero = eps.pop().unwrap();
///
/// let sender = thread::spawn(move || {
///     one.send(SendBuffer::new(&[1i32, 2, 3]), 0, 5).unwrap();
/// });
/// let mut buf = [0i32; 3];
/// let status = zero.recv(RecvBuffer::new(&mut buf), ANY_SOURCE, 5).unwrap();
/// sender.join().unwrap();
///
/// assert_eq!(buf, [1, 2, 3]);
/// assert_eq!((status.source, status.tag, status.size), (1, 5, 3));
/// ```
pub struct Endpoint {
    rank: i32,
    arena: Arc<Arena>,
    token: CancelToken,
}

impl Endpoint {
    /// Create the endpoints of a group of `size` ranks, ordered by rank.
    pub fn group(size: usize) -> Result<Vec<Endpoint>> {
        if size == 0 || size > i32::MAX as usize {
            return Err(Error::Config(format!("invalid group size: {size}")));
        }
        let arena = Arc::new(Arena::new(size as i32));
        debug!(size, "created thread group");
        Ok((0..size as i32)
            .map(|rank| Endpoint {
                rank,
                arena: arena.clone(),
                token: CancelToken::new(),
            })
            .collect())
    }

    /// Token that interrupts the blocking calls of this rank.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }
}

impl crate::Endpoint for Endpoint {
    type Request<'a> = Request<'a>;
    type RequestList<'a> = RequestList<'a>;

    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.arena.size()
    }

    fn init_send<'s>(
        &self,
        scope: &'s Scope<'s, '_>,
        buf: SendBuffer<'s>,
        dest: i32,
        tag: i32,
    ) -> Result<Request<'s>> {
        self.arena.new_send(self.rank, &self.token, scope.ledger(), buf, dest, tag)
    }

    fn init_recv<'s>(
        &self,
        scope: &'s Scope<'s, '_>,
        buf: RecvBuffer<'s>,
        src: i32,
        tag: i32,
    ) -> Result<Request<'s>> {
        self.arena.new_recv(self.rank, &self.token, scope.ledger(), buf, src, tag)
    }

    fn new_request_list<'s>(&self, scope: &'s Scope<'s, '_>) -> RequestList<'s> {
        RequestList::new(self.rank, self.arena.clone(), self.token.clone(), scope.ledger())
    }

    fn reduce(&self, send: SendBuffer<'_>, recv: RecvBuffer<'_>, root: i32, op: ReduceOp) -> Result<()> {
        check_dest("reduce", root, self.arena.size())?;
        collective::reduce(
            &self.arena,
            self.rank,
            &self.token,
            send,
            recv,
            Action::Reduce { root },
            op,
        )
    }

    fn allreduce(&self, send: SendBuffer<'_>, recv: RecvBuffer<'_>, op: ReduceOp) -> Result<()> {
        collective::reduce(
            &self.arena,
            self.rank,
            &self.token,
            send,
            recv,
            Action::Allreduce,
            op,
        )
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("rank", &self.rank)
            .field("size", &self.arena.size())
            .finish()
    }
}
