//! Rendezvous matching of concurrently posted sends and receives.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::message::{transfer, Message};
use crate::queue::{MessageQueue, QueueHandle};
use crate::status::Status;
use crate::{ANY_SOURCE, ANY_TAG};

/// Number of tag buckets per pool.
pub const BUCKET_COUNT: usize = 16;

const WILDCARD_LIST: usize = 2 * BUCKET_COUNT;

fn bucket(tag: i32) -> usize {
    tag as usize % BUCKET_COUNT
}

fn send_list(tag: i32) -> usize {
    2 * bucket(tag)
}

fn recv_list(tag: i32) -> usize {
    2 * bucket(tag) + 1
}

/// Pending messages addressed to one rank.
///
/// Sends are queued in the pool of their destination, receives in the pool of
/// the receiving rank. Fully specified receives live in the receive list of
/// their tag bucket; receives with [`ANY_SOURCE`] or [`ANY_TAG`] live in a
/// separate wildcard list. Every queued message carries a pool-wide arrival
/// number, so the oldest compatible candidate wins when several lists are
/// searched.
pub(crate) struct MessagePool {
    rank: i32,
    queue: Mutex<MessageQueue>,
}

impl MessagePool {
    pub(crate) fn new(rank: i32) -> Self {
        MessagePool {
            rank,
            queue: Mutex::new(MessageQueue::new(2 * BUCKET_COUNT + 1)),
        }
    }

    /// Number of messages waiting for a peer.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().total()
    }

    /// Match `send` against the pending receives or queue it.
    ///
    /// Returns `true` if the message was queued and `false` if it completed
    /// immediately.
    pub(crate) fn queue_send(&self, send: &Arc<Message>) -> bool {
        let (rank, tag) = (send.rank(), send.tag());
        let mut queue = self.queue.lock();

        let exact = queue
            .find(recv_list(tag), |r| r.rank() == rank && r.tag() == tag)
            .map(|c| (c.handle, c.seq));
        let wild = queue
            .find(WILDCARD_LIST, |r| accepts(r, rank, tag))
            .map(|c| (c.handle, c.seq));

        let best = match (exact, wild) {
            (Some(e), Some(w)) => Some(if e.1 < w.1 { e } else { w }),
            (e, w) => e.or(w),
        };

        match best.and_then(|(handle, _)| queue.remove(handle)) {
            Some(recv) => {
                transfer(send, &recv, self.rank);
                recv.state().slot = None;
                drop(queue);
                trace!(rank = self.rank, source = rank, tag, "send matched pending receive");
                recv.notify();
                false
            }
            None => {
                self.enqueue(&mut queue, send_list(tag), send);
                trace!(rank = self.rank, source = rank, tag, "send queued");
                true
            }
        }
    }

    /// Match a fully specified receive against the pending sends or queue it.
    pub(crate) fn queue_recv(&self, recv: &Arc<Message>) -> bool {
        let (rank, tag) = (recv.rank(), recv.tag());
        debug_assert!(rank != ANY_SOURCE && tag != ANY_TAG);
        let mut queue = self.queue.lock();

        let hit = queue
            .find(send_list(tag), |s| s.rank() == rank && s.tag() == tag)
            .map(|c| c.handle);
        self.complete_recv(queue, hit, recv, recv_list(tag))
    }

    /// Match a receive with a wildcard source and/or tag, or queue it on the
    /// wildcard list.
    pub(crate) fn queue_any_recv(&self, recv: &Arc<Message>) -> bool {
        let (rank, tag) = (recv.rank(), recv.tag());
        let mut queue = self.queue.lock();

        let hit = if tag == ANY_TAG {
            (0..BUCKET_COUNT)
                .filter_map(|b| queue.find(2 * b, |s| accepts(recv, s.rank(), s.tag())))
                .min_by_key(|c| c.seq)
                .map(|c| c.handle)
        } else {
            queue
                .find(send_list(tag), |s| accepts(recv, s.rank(), s.tag()))
                .map(|c| c.handle)
        };
        trace!(rank = self.rank, source = rank, tag, found = hit.is_some(), "wildcard receive posted");
        self.complete_recv(queue, hit, recv, WILDCARD_LIST)
    }

    /// Remove `msg` from its queue, if it is still queued, and mark it as
    /// cancelled. Returns `false` when a match got there first.
    pub(crate) fn cancel(&self, msg: &Message) -> bool {
        let mut queue = self.queue.lock();
        let handle = {
            let mut st = msg.state();
            let handle = st.slot.take();
            if handle.is_some() {
                st.status = Status::cancelled();
            }
            handle
        };
        let Some(handle) = handle else {
            return false;
        };
        queue.remove(handle);
        drop(queue);

        debug!(rank = self.rank, peer = msg.rank(), tag = msg.tag(), "message cancelled");
        msg.notify();
        true
    }

    fn complete_recv(
        &self,
        mut queue: MutexGuard<'_, MessageQueue>,
        hit: Option<QueueHandle>,
        recv: &Arc<Message>,
        list: usize,
    ) -> bool {
        match hit.and_then(|handle| queue.remove(handle)) {
            Some(send) => {
                transfer(&send, recv, self.rank);
                send.state().slot = None;
                drop(queue);
                trace!(rank = self.rank, source = send.rank(), tag = send.tag(), "receive matched pending send");
                send.notify();
                false
            }
            None => {
                self.enqueue(&mut queue, list, recv);
                true
            }
        }
    }

    fn enqueue(&self, queue: &mut MessageQueue, list: usize, msg: &Arc<Message>) {
        let handle = queue.push_back(list, msg.clone());
        let mut st = msg.state();
        st.enqueued = true;
        st.slot = Some(handle);
    }
}

/// Check whether receive `recv` accepts a message from `rank` with `tag`.
fn accepts(recv: &Message, rank: i32, tag: i32) -> bool {
    (recv.rank() == ANY_SOURCE || recv.rank() == rank) && (recv.tag() == ANY_TAG || recv.tag() == tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RecvBuffer, SendBuffer};

    #[test]
    fn send_then_receive_matches_on_post() {
        let pool = MessagePool::new(0);
        let src = [1i32, 2, 3];
        let mut dst = [0i32; 3];

        let send = Message::new(SendBuffer::new(&src).raw(), 1, 5);
        assert!(pool.queue_send(&send));
        assert!(send.is_enqueued());

        let recv = Message::new(RecvBuffer::new(&mut dst).raw(), 1, 5);
        assert!(!pool.queue_recv(&recv));
        assert!(!send.is_enqueued());
        assert_eq!(pool.pending(), 0);

        let st = recv.status();
        assert_eq!((st.source, st.tag, st.size), (1, 5, 3));
        assert_eq!(send.status().source, 0);
        drop((send, recv));
        assert_eq!(dst, [1, 2, 3]);
    }

    #[test]
    fn sends_are_matched_in_arrival_order() {
        let pool = MessagePool::new(0);
        let (a, b) = ([1u8], [2u8]);
        let mut out = [0u8];

        let first = Message::new(SendBuffer::new(&a).raw(), 1, 3);
        let second = Message::new(SendBuffer::new(&b).raw(), 1, 3);
        pool.queue_send(&first);
        pool.queue_send(&second);

        let recv = Message::new(RecvBuffer::new(&mut out).raw(), 1, 3);
        assert!(!pool.queue_recv(&recv));
        assert!(!first.is_enqueued());
        assert!(second.is_enqueued());
        drop(recv);
        assert_eq!(out, [1]);
    }

    #[test]
    fn any_tag_receive_takes_oldest_send_across_buckets() {
        let pool = MessagePool::new(0);
        let (a, b) = ([10i64], [20i64]);
        let mut out = [0i64];

        // Tags 7 and 2 fall into different buckets; tag 7 arrives first.
        let older = Message::new(SendBuffer::new(&a).raw(), 2, 7);
        let newer = Message::new(SendBuffer::new(&b).raw(), 1, 2);
        pool.queue_send(&older);
        pool.queue_send(&newer);

        let recv = Message::new(RecvBuffer::new(&mut out).raw(), ANY_SOURCE, ANY_TAG);
        assert!(!pool.queue_any_recv(&recv));
        let st = recv.status();
        assert_eq!((st.source, st.tag), (2, 7));
        drop(recv);
        assert_eq!(out, [10]);
    }

    #[test]
    fn send_prefers_older_wildcard_receive() {
        let pool = MessagePool::new(0);
        let src = [5u32];
        let mut w = [0u32];
        let mut e = [0u32];

        let wild = Message::new(RecvBuffer::new(&mut w).raw(), ANY_SOURCE, 4);
        let exact = Message::new(RecvBuffer::new(&mut e).raw(), 1, 4);
        assert!(pool.queue_any_recv(&wild));
        assert!(pool.queue_recv(&exact));

        let send = Message::new(SendBuffer::new(&src).raw(), 1, 4);
        assert!(!pool.queue_send(&send));
        assert!(!wild.is_enqueued());
        assert!(exact.is_enqueued());
        assert!(pool.cancel(&exact));
        drop((wild, exact));
        assert_eq!((w, e), ([5], [0]));
    }

    #[test]
    fn wildcard_receive_ignores_incompatible_sends() {
        let pool = MessagePool::new(0);
        let src = [1u8];
        let mut out = [0u8];

        let send = Message::new(SendBuffer::new(&src).raw(), 3, 9);
        pool.queue_send(&send);

        let recv = Message::new(RecvBuffer::new(&mut out).raw(), 2, ANY_TAG);
        assert!(pool.queue_any_recv(&recv));
        assert_eq!(pool.pending(), 2);
    }

    #[test]
    fn cancel_is_idempotent_and_loses_to_match() {
        let pool = MessagePool::new(0);
        let src = [1u8];
        let mut out = [0u8];

        let recv = Message::new(RecvBuffer::new(&mut out).raw(), 1, 0);
        pool.queue_recv(&recv);
        assert!(pool.cancel(&recv));
        assert!(recv.status().cancelled);
        assert!(!pool.cancel(&recv));

        let send = Message::new(SendBuffer::new(&src).raw(), 1, 0);
        pool.queue_send(&send);
        recv.reset();
        assert!(!pool.queue_recv(&recv));
        assert!(!pool.cancel(&send));
        assert!(!send.status().cancelled);
    }
}
