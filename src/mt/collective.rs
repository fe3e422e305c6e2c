//! Reductions over the rank threads of one arena.
//!
//! Every rank climbs the shared [`ReduceTree`] from its entry node towards the
//! root. The first rank to reach a node parks its buffer there and sleeps; the
//! second one combines the two buffers, claims the node and keeps climbing.
//! The rank that passes the root owns the complete result. It then unwinds
//! its path, releasing the ranks parked on the way, and each released rank
//! unwinds its own path in turn.
//!
//! No node lock is held while a rank sleeps. A parked rank whose node has
//! been claimed stays parked until the climber unwinds, even when its token
//! fires.
//!
//! An arena keeps two trees and the final climber switches between them, so
//! ranks that start the next reduction never meet ranks still leaving this one.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use super::arena::Arena;
use crate::buffer::{Buffer, RecvBuffer, SendBuffer};
use crate::cancel::{CancelToken, Interrupt};
use crate::error::{Error, ErrorKind, Result};
use crate::optable::Optable;
use crate::reduce::{ReduceBuffer, TreeShape};
use crate::ReduceOp;

/// Collective a rank entered a tree node for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Reduce { root: i32 },
    Allreduce,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Action::Reduce { .. } => "reduce",
            Action::Allreduce => "allreduce",
        }
    }
}

struct NodeState {
    action: Option<Action>,
    parked: Option<(Buffer, i32)>,
    /// A climber combined with the parked buffer and has not come back yet.
    claimed: bool,
    error: Option<ErrorKind>,
}

pub(crate) struct ReduceNode {
    parent: Option<usize>,
    state: Mutex<NodeState>,
    cond: Condvar,
}

impl Interrupt for ReduceNode {
    fn interrupt(&self) {
        let _st = self.state.lock();
        self.cond.notify_all();
    }
}

/// Tree nodes laid out by [`TreeShape`].
pub(crate) struct ReduceTree {
    nodes: Vec<Arc<ReduceNode>>,
    entry: Vec<Option<usize>>,
}

impl ReduceTree {
    pub(crate) fn new(size: usize) -> Self {
        let shape = TreeShape::new(size);
        let nodes = (0..shape.node_count())
            .map(|node| {
                Arc::new(ReduceNode {
                    parent: shape.parent(node),
                    state: Mutex::new(NodeState {
                        action: None,
                        parked: None,
                        claimed: false,
                        error: None,
                    }),
                    cond: Condvar::new(),
                })
            })
            .collect();
        let entry = (0..size).map(|rank| shape.entry(rank)).collect();
        ReduceTree { nodes, entry }
    }
}

/// Combine `send` of every rank into `recv` of `root`, or of every rank for
/// [`Action::Allreduce`].
///
/// Failures are collected along the tree, so every rank of one collective
/// reports the same error.
pub(crate) fn reduce(
    arena: &Arena,
    rank: i32,
    token: &CancelToken,
    send: SendBuffer<'_>,
    recv: RecvBuffer<'_>,
    action: Action,
    op: ReduceOp,
) -> Result<()> {
    let mut own = ReduceBuffer::new(recv, rank);
    let table = Optable::instance();
    let handler = table.get(op, own.datatype());

    let mut err = if table.is_supported(op, own.datatype()) {
        own.copy_from(&send).err()
    } else {
        Some(ErrorKind::UnsupportedOp)
    };

    let tree = arena.tree();
    let mut claimed: Vec<&Arc<ReduceNode>> = Vec::new();
    let mut carried = (own.raw(), rank);
    let mut cursor = tree.entry[rank as usize];
    let mut released = false;

    while let Some(index) = cursor {
        let node = &tree.nodes[index];
        let mut st = node.state.lock();

        let Some(parked_action) = st.action else {
            st.action = Some(action);
            st.parked = Some(carried);
            st.error = err;

            let _registration = token.register(node.clone());
            while st.action.is_some() && (st.claimed || !token.is_cancelled()) {
                node.cond.wait(&mut st);
            }
            if st.action.is_some() {
                st.action = None;
                st.parked = None;
                err = err.or(Some(ErrorKind::Cancelled));
            } else {
                err = st.error;
            }
            released = true;
            break;
        };

        err = err.or(st.error);
        if parked_action != action {
            err = err.or(Some(ErrorKind::ActionMismatch));
        }
        if let (None, Some((buf, owner))) = (err, st.parked) {
            // SAFETY: the owner of the parked buffer sleeps on this node until
            // the claim taken below is released, so the borrow behind it is
            // alive.
            let parked = unsafe { ReduceBuffer::from_raw(buf, owner) };
            err = match action {
                Action::Allreduce => handler(&own, &parked).err(),
                Action::Reduce { root } if carried.1 == root => {
                    // SAFETY: `carried` is either our own buffer or one parked
                    // on a node we claimed.
                    let mine = unsafe { ReduceBuffer::from_raw(carried.0, carried.1) };
                    handler(&mine, &parked).err()
                }
                Action::Reduce { .. } => {
                    // SAFETY: as above.
                    let mine = unsafe { ReduceBuffer::from_raw(carried.0, carried.1) };
                    let res = handler(&parked, &mine).err();
                    carried = (buf, owner);
                    res
                }
            };
        }

        st.claimed = true;
        drop(st);
        cursor = node.parent;
        claimed.push(node);
    }

    if !released {
        arena.flip();
        if token.is_cancelled() {
            err = err.or(Some(ErrorKind::Cancelled));
        }
    }

    while let Some(node) = claimed.pop() {
        let mut st = node.state.lock();
        if let (Action::Allreduce, None, Some((buf, owner))) = (action, err, st.parked) {
            // SAFETY: the owner is still parked on this node.
            let parked = unsafe { ReduceBuffer::from_raw(buf, owner) };
            err = parked.copy_from_reduce(&own).err();
        }
        st.error = err;
        st.action = None;
        st.parked = None;
        st.claimed = false;
        node.cond.notify_all();
    }

    match err {
        Some(kind) => {
            debug!(rank, op = ?op, collective = action.name(), %kind, "collective failed");
            Err(Error::comm(action.name(), kind))
        }
        None => Ok(()),
    }
}
