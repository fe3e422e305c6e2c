//! FIFO matching for a single participant.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::message::{transfer, Message};
use crate::status::Status;
use crate::{ANY_SOURCE, ANY_TAG};

/// Pending sends and receives of the only rank.
///
/// Matching is first-in-first-out over one send list and one receive list.
/// The pool is confined to the thread that owns the endpoint.
#[derive(Default)]
pub(crate) struct MessagePool {
    sends: RefCell<VecDeque<Arc<Message>>>,
    recvs: RefCell<VecDeque<Arc<Message>>>,
}

impl MessagePool {
    pub(crate) fn new() -> Self {
        MessagePool::default()
    }

    /// Match `send` with the oldest compatible receive or queue it. Returns
    /// `true` if the message was queued.
    pub(crate) fn queue_send(&self, send: &Arc<Message>) -> bool {
        let recv = take_first(&self.recvs, |r| accepts(r, send));
        match recv {
            Some(recv) => {
                transfer(send, &recv, 0);
                trace!(tag = send.tag(), "send matched pending receive");
                recv.notify();
                false
            }
            None => {
                enqueue(&self.sends, send);
                true
            }
        }
    }

    /// Match `recv` with the oldest compatible send or queue it.
    pub(crate) fn queue_recv(&self, recv: &Arc<Message>) -> bool {
        let send = take_first(&self.sends, |s| accepts(recv, s));
        match send {
            Some(send) => {
                transfer(&send, recv, 0);
                trace!(tag = send.tag(), "receive matched pending send");
                send.notify();
                false
            }
            None => {
                enqueue(&self.recvs, recv);
                true
            }
        }
    }

    /// Remove `msg` if it is still queued and mark it as cancelled.
    pub(crate) fn cancel(&self, msg: &Arc<Message>) -> bool {
        let removed = take_first(&self.sends, |m| ptr_eq(m, msg))
            .or_else(|| take_first(&self.recvs, |m| ptr_eq(m, msg)));
        if removed.is_none() {
            return false;
        }
        msg.state().status = Status::cancelled();
        msg.notify();
        true
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.sends.borrow().len() + self.recvs.borrow().len()
    }
}

fn accepts(recv: &Message, send: &Message) -> bool {
    (recv.rank() == ANY_SOURCE || recv.rank() == send.rank())
        && (recv.tag() == ANY_TAG || recv.tag() == send.tag())
}

fn ptr_eq(a: &Message, b: &Message) -> bool {
    std::ptr::eq(a, b)
}

fn take_first<F>(list: &RefCell<VecDeque<Arc<Message>>>, pred: F) -> Option<Arc<Message>>
where
    F: Fn(&Message) -> bool,
{
    let mut list = list.borrow_mut();
    let pos = list.iter().position(|m| pred(&**m))?;
    list.remove(pos)
}

fn enqueue(list: &RefCell<VecDeque<Arc<Message>>>, msg: &Arc<Message>) {
    msg.state().enqueued = true;
    list.borrow_mut().push_back(msg.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RecvBuffer, SendBuffer};

    #[test]
    fn wildcard_receive_takes_oldest_send() {
        let pool = MessagePool::new();
        let (a, b) = ([1u8], [2u8]);
        let mut out = [0u8];

        let first = Message::new(SendBuffer::new(&a).raw(), 0, 4);
        let second = Message::new(SendBuffer::new(&b).raw(), 0, 9);
        assert!(pool.queue_send(&first));
        assert!(pool.queue_send(&second));

        let recv = Message::new(RecvBuffer::new(&mut out).raw(), ANY_SOURCE, ANY_TAG);
        assert!(!pool.queue_recv(&recv));
        assert_eq!(recv.status().tag, 4);
        assert_eq!(pool.pending(), 1);
        drop(recv);
        assert_eq!(out, [1]);
    }

    #[test]
    fn cancel_removes_only_the_given_message() {
        let pool = MessagePool::new();
        let mut x = [0i32];
        let mut y = [0i32];
        let rx = Message::new(RecvBuffer::new(&mut x).raw(), 0, 1);
        let ry = Message::new(RecvBuffer::new(&mut y).raw(), 0, 1);
        pool.queue_recv(&rx);
        pool.queue_recv(&ry);

        assert!(pool.cancel(&rx));
        assert!(!pool.cancel(&rx));
        assert!(rx.status().cancelled);
        assert!(ry.is_enqueued());
        assert_eq!(pool.pending(), 1);
    }
}
