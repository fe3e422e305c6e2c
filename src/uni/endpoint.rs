//! The endpoint of a group of one.

use std::rc::Rc;

use tracing::trace;

use super::pool::MessagePool;
use super::{Request, RequestList};
use crate::buffer::{RecvBuffer, SendBuffer};
use crate::error::{check_dest, check_recv_tag, check_send_tag, check_source, Error, ErrorKind, Result};
use crate::message::Message;
use crate::optable::Optable;
use crate::reduce::ReduceBuffer;
use crate::request::Mode;
use crate::scope::{Ledger, Scope};
use crate::ReduceOp;

/// The only rank of a group of one.
///
/// Sends and receives address rank 0. Because nothing else runs
/// concurrently, a blocking wait succeeds only if the counterpart was
/// already started; otherwise it reports a deadlock.
///
/// # Example
///
/// ```
/// use mprt::{uni, Endpoint, RecvBuffer, SendBuffer, ReduceOp};
///
/// let ep = uni::Endpoint::new();
/// let value = [3.5f64];
/// let mut out = [0.0f64];
/// ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut out), ReduceOp::Sum).unwrap();
/// assert_eq!(out, [3.5]);
/// ```
#[derive(Default)]
pub struct Endpoint {
    pool: Rc<MessagePool>,
}

impl Endpoint {
    /// Create a single-participant endpoint.
    pub fn new() -> Self {
        Endpoint {
            pool: Rc::new(MessagePool::new()),
        }
    }

    fn collective(&self, name: &'static str, send: SendBuffer<'_>, recv: RecvBuffer<'_>, op: ReduceOp) -> Result<()> {
        if !Optable::instance().is_supported(op, send.datatype()) {
            return Err(Error::comm(name, ErrorKind::UnsupportedOp));
        }
        trace!(name, ?op, len = send.len(), "single-participant reduction");
        ReduceBuffer::new(recv, 0)
            .copy_from(&send)
            .map_err(|kind| Error::comm(name, kind))
    }
}

pub(super) fn new_send<'a>(
    op: &'static str,
    pool: &Rc<MessagePool>,
    ledger: &Ledger,
    buf: SendBuffer<'a>,
    dest: i32,
    tag: i32,
) -> Result<Request<'a>> {
    check_dest(op, dest, 1)?;
    check_send_tag(op, tag)?;
    let req = Request::new(Mode::Send, Message::new(buf.raw(), 0, tag), pool.clone());
    req.enlist(ledger);
    Ok(req)
}

pub(super) fn new_recv<'a>(
    op: &'static str,
    pool: &Rc<MessagePool>,
    ledger: &Ledger,
    buf: RecvBuffer<'a>,
    src: i32,
    tag: i32,
) -> Result<Request<'a>> {
    check_source(op, src, 1)?;
    check_recv_tag(op, tag)?;
    let req = Request::new(Mode::Recv, Message::new(buf.raw(), src, tag), pool.clone());
    req.enlist(ledger);
    Ok(req)
}

impl crate::Endpoint for Endpoint {
    type Request<'a> = Request<'a>;
    type RequestList<'a> = RequestList<'a>;

    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn init_send<'s>(
        &self,
        scope: &'s Scope<'s, '_>,
        buf: SendBuffer<'s>,
        dest: i32,
        tag: i32,
    ) -> Result<Request<'s>> {
        new_send("init_send", &self.pool, scope.ledger(), buf, dest, tag)
    }

    fn init_recv<'s>(
        &self,
        scope: &'s Scope<'s, '_>,
        buf: RecvBuffer<'s>,
        src: i32,
        tag: i32,
    ) -> Result<Request<'s>> {
        new_recv("init_recv", &self.pool, scope.ledger(), buf, src, tag)
    }

    fn new_request_list<'s>(&self, scope: &'s Scope<'s, '_>) -> RequestList<'s> {
        RequestList::new(self.pool.clone(), scope.ledger())
    }

    fn reduce(&self, send: SendBuffer<'_>, recv: RecvBuffer<'_>, root: i32, op: ReduceOp) -> Result<()> {
        check_dest("reduce", root, 1)?;
        self.collective("reduce", send, recv, op)
    }

    fn allreduce(&self, send: SendBuffer<'_>, recv: RecvBuffer<'_>, op: ReduceOp) -> Result<()> {
        self.collective("allreduce", send, recv, op)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("rank", &0).finish()
    }
}
