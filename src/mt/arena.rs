//! State shared by all rank threads of one group.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::collective::ReduceTree;
use super::pool::MessagePool;
use super::request::Request;
use crate::buffer::{RecvBuffer, SendBuffer};
use crate::cancel::CancelToken;
use crate::error::{check_dest, check_recv_tag, check_send_tag, check_source, Result};
use crate::message::Message;
use crate::request::Mode;
use crate::scope::Ledger;

/// One message pool per rank plus the double-buffered reduction tree.
pub(crate) struct Arena {
    size: i32,
    pools: Vec<Arc<MessagePool>>,
    trees: [ReduceTree; 2],
    current: AtomicUsize,
}

impl Arena {
    pub(crate) fn new(size: i32) -> Self {
        let n = size as usize;
        Arena {
            size,
            pools: (0..size).map(|rank| Arc::new(MessagePool::new(rank))).collect(),
            trees: [ReduceTree::new(n), ReduceTree::new(n)],
            current: AtomicUsize::new(0),
        }
    }

    pub(crate) fn size(&self) -> i32 {
        self.size
    }

    /// Tree for the next collective.
    pub(crate) fn tree(&self) -> &ReduceTree {
        &self.trees[self.current.load(Ordering::Acquire)]
    }

    /// Switch trees. Called by the last rank to climb the current one.
    pub(crate) fn flip(&self) {
        self.current.fetch_xor(1, Ordering::AcqRel);
    }

    /// Build a send from `rank` to `dest`; it is queued in the pool of `dest`
    /// and cancelled at the latest when the scope behind `ledger` ends.
    pub(crate) fn new_send<'a>(
        &self,
        rank: i32,
        token: &CancelToken,
        ledger: &Ledger,
        buf: SendBuffer<'a>,
        dest: i32,
        tag: i32,
    ) -> Result<Request<'a>> {
        check_dest("init_send", dest, self.size)?;
        check_send_tag("init_send", tag)?;
        let req = Request::new(
            Mode::Send,
            Message::new(buf.raw(), rank, tag),
            self.pools[dest as usize].clone(),
            token.clone(),
        );
        req.enlist(ledger);
        Ok(req)
    }

    /// Build a receive by `rank`; it is queued in the pool of `rank`.
    pub(crate) fn new_recv<'a>(
        &self,
        rank: i32,
        token: &CancelToken,
        ledger: &Ledger,
        buf: RecvBuffer<'a>,
        src: i32,
        tag: i32,
    ) -> Result<Request<'a>> {
        check_source("init_recv", src, self.size)?;
        check_recv_tag("init_recv", tag)?;
        let req = Request::new(
            Mode::Recv,
            Message::new(buf.raw(), src, tag),
            self.pools[rank as usize].clone(),
            token.clone(),
        );
        req.enlist(ledger);
        Ok(req)
    }
}
