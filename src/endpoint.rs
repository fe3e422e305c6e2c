//! Per-rank handle for building requests and running reductions.

use crate::buffer::{RecvBuffer, SendBuffer};
use crate::error::Result;
use crate::request::{Request, RequestList};
use crate::scope::{scope, Scope};
use crate::status::Status;
use crate::ReduceOp;

/// The view of one rank onto a backend.
///
/// The backend is chosen when the endpoints are created: [`mt::Endpoint`]
/// for one thread per rank, [`uni::Endpoint`] for a single participant.
/// Code written against this trait runs unchanged on both.
///
/// [`mt::Endpoint`]: crate::mt::Endpoint
/// [`uni::Endpoint`]: crate::uni::Endpoint
pub trait Endpoint {
    /// Request type of this backend.
    type Request<'s>: Request;

    /// Request list type of this backend.
    type RequestList<'s>: RequestList<'s>;

    /// Rank of this endpoint, in `[0, size)`.
    fn rank(&self) -> i32;

    /// Number of ranks in the group.
    fn size(&self) -> i32;

    /// Create an idle send of `buf` to `dest`, registered with `scope`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRank`](crate::Error::InvalidRank) or
    /// [`Error::InvalidTag`](crate::Error::InvalidTag) for arguments outside
    /// the group or a negative tag.
    fn init_send<'s>(
        &self,
        scope: &'s Scope<'s, '_>,
        buf: SendBuffer<'s>,
        dest: i32,
        tag: i32,
    ) -> Result<Self::Request<'s>>;

    /// Create an idle receive into `buf` from `src`, which may be
    /// [`ANY_SOURCE`](crate::ANY_SOURCE); `tag` may be
    /// [`ANY_TAG`](crate::ANY_TAG).
    fn init_recv<'s>(
        &self,
        scope: &'s Scope<'s, '_>,
        buf: RecvBuffer<'s>,
        src: i32,
        tag: i32,
    ) -> Result<Self::Request<'s>>;

    /// Create an empty request list bound to this endpoint. Requests added
    /// to it are registered with `scope`.
    fn new_request_list<'s>(&self, scope: &'s Scope<'s, '_>) -> Self::RequestList<'s>;

    /// Combine `send` of every rank with `op` into `recv` of `root`.
    ///
    /// Every rank must call this with buffers of the same type and length.
    /// The `recv` buffer of the other ranks is used as scratch space.
    fn reduce(&self, send: SendBuffer<'_>, recv: RecvBuffer<'_>, root: i32, op: ReduceOp) -> Result<()>;

    /// Combine `send` of every rank with `op` into `recv` of every rank.
    fn allreduce(&self, send: SendBuffer<'_>, recv: RecvBuffer<'_>, op: ReduceOp) -> Result<()>;

    /// Send `buf` to `dest` and wait for the transfer.
    ///
    /// A failed transfer is returned as [`Error::Comm`](crate::Error::Comm).
    fn send(&self, buf: SendBuffer<'_>, dest: i32, tag: i32) -> Result<Status> {
        scope(|s| -> Result<Status> {
            let mut req = self.init_send(s, buf, dest, tag)?;
            req.start()?;
            let status = req.wait()?;
            status.check("send")?;
            Ok(status)
        })
    }

    /// Receive into `buf` from `src` and wait for the transfer.
    fn recv(&self, buf: RecvBuffer<'_>, src: i32, tag: i32) -> Result<Status> {
        scope(|s| -> Result<Status> {
            let mut req = self.init_recv(s, buf, src, tag)?;
            req.start()?;
            let status = req.wait()?;
            status.check("recv")?;
            Ok(status)
        })
    }
}
