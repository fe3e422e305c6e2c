//! In-flight messages and completion notification.
//!
//! A [`Message`] is one posted send or receive: its matching key, the caller's
//! buffer, the [`Status`] filled in at completion and the `enqueued` flag that
//! waiters block on. A message is shared (`Arc`) between the request that owns
//! it and the pool that queues it.
//!
//! Lock order is pool lock first, then message lock. Notifier callbacks run
//! after the message lock has been released.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::buffer::Buffer;
use crate::cancel::{CancelToken, Interrupt};
use crate::error::ErrorKind;
use crate::queue::QueueHandle;
use crate::status::Status;

/// Completion callback registered on a message.
pub(crate) trait Notify: Send + Sync {
    /// Called once, outside the message lock, when the message leaves its queue.
    fn notify(&self);
}

/// How a blocking wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    /// The awaited condition was reached.
    Notified,
    /// The rank's cancellation token fired first.
    Cancelled,
}

/// Mutable part of a message, guarded by the message lock.
pub(crate) struct MessageState {
    pub(crate) enqueued: bool,
    pub(crate) status: Status,
    pub(crate) notifier: Option<Arc<dyn Notify>>,
    /// Position in the owning pool's queue while enqueued.
    pub(crate) slot: Option<QueueHandle>,
}

pub(crate) struct Message {
    rank: i32,
    tag: i32,
    buffer: Buffer,
    state: Mutex<MessageState>,
    cond: Condvar,
}

impl Message {
    /// Build an unqueued message. `rank` is the sender for a send and the
    /// expected source for a receive.
    pub(crate) fn new(buffer: Buffer, rank: i32, tag: i32) -> Arc<Self> {
        Arc::new(Message {
            rank,
            tag,
            buffer,
            state: Mutex::new(MessageState {
                enqueued: false,
                status: Status::empty(),
                notifier: None,
                slot: None,
            }),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn rank(&self) -> i32 {
        self.rank
    }

    pub(crate) fn tag(&self) -> i32 {
        self.tag
    }

    pub(crate) fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MessageState> {
        self.state.lock()
    }

    /// Prepare the message for another round of matching.
    pub(crate) fn reset(&self) {
        let mut st = self.state.lock();
        st.enqueued = false;
        st.status = Status::empty();
        st.notifier = None;
        st.slot = None;
    }

    pub(crate) fn is_enqueued(&self) -> bool {
        self.state.lock().enqueued
    }

    pub(crate) fn status(&self) -> Status {
        self.state.lock().status
    }

    /// Mark the message as no longer queued and wake whoever waits for it.
    ///
    /// The notifier is detached under the lock and invoked after the lock is
    /// released, so a callback can never re-enter this message's lock.
    pub(crate) fn notify(&self) {
        let notifier = {
            let mut st = self.state.lock();
            st.enqueued = false;
            st.slot = None;
            self.cond.notify_all();
            st.notifier.take()
        };
        if let Some(notifier) = notifier {
            notifier.notify();
        }
    }

    /// Attach `notifier` if the message is still queued. Returns `false` when
    /// the message has already completed, in which case nothing is attached.
    pub(crate) fn set_notifier(&self, notifier: Arc<dyn Notify>) -> bool {
        let mut st = self.state.lock();
        if st.enqueued {
            st.notifier = Some(notifier);
        }
        st.enqueued
    }

    /// Detach any notifier. Returns whether the message is still queued.
    pub(crate) fn clear_notifier(&self) -> bool {
        let mut st = self.state.lock();
        st.notifier = None;
        st.enqueued
    }

    /// Block until the message is matched or cancelled. With a token, also
    /// return early once the token is cancelled.
    pub(crate) fn wait(self: &Arc<Self>, token: Option<&CancelToken>) -> WaitOutcome {
        let _registration = token.map(|t| t.register(self.clone() as Arc<dyn Interrupt>));
        let mut st = self.state.lock();
        while st.enqueued {
            if token.map_or(false, CancelToken::is_cancelled) {
                return WaitOutcome::Cancelled;
            }
            self.cond.wait(&mut st);
        }
        WaitOutcome::Notified
    }

    /// Block until the message is matched or cancelled, ignoring tokens.
    pub(crate) fn wait_no_cancel(&self) {
        let mut st = self.state.lock();
        while st.enqueued {
            self.cond.wait(&mut st);
        }
    }
}

impl Interrupt for Message {
    fn interrupt(&self) {
        let _st = self.state.lock();
        self.cond.notify_all();
    }
}

/// Move the payload of `send` into `recv` and fill in both statuses.
///
/// `dest` is the rank that owns the receive. Called by the pool that matched
/// the pair, with both messages already out of their queues. Mismatched
/// element types or a too-small receive buffer are recorded on both sides and
/// no data moves.
pub(crate) fn transfer(send: &Message, recv: &Message, dest: i32) {
    let sbuf = send.buffer();
    let rbuf = recv.buffer();

    let error = if sbuf.datatype() != rbuf.datatype() {
        Some(ErrorKind::BufferType)
    } else if rbuf.len() < sbuf.len() || !rbuf.is_writable() {
        Some(ErrorKind::BufferSize)
    } else {
        None
    };

    if error.is_none() {
        // SAFETY: both messages are queued, so their buffers are borrowed for
        // a scope that has not ended yet; the types match and the receive
        // buffer is writable and large enough.
        unsafe { rbuf.copy_from(sbuf) };
    }

    recv.state.lock().status = Status {
        source: send.rank,
        tag: send.tag,
        size: sbuf.len(),
        error,
        cancelled: false,
    };
    send.state.lock().status = Status {
        source: dest,
        tag: send.tag,
        size: sbuf.len(),
        error,
        cancelled: false,
    };
}

/// Counting notifier used to wait for several messages at once.
pub(crate) struct Rendezvous {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Rendezvous {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Rendezvous {
            count: Mutex::new(0),
            cond: Condvar::new(),
        })
    }

    /// Number of notifications received so far.
    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Block until at least `target` notifications have arrived, or the
    /// token is cancelled.
    pub(crate) fn wait(self: &Arc<Self>, target: usize, token: Option<&CancelToken>) -> WaitOutcome {
        let _registration = token.map(|t| t.register(self.clone() as Arc<dyn Interrupt>));
        let mut count = self.count.lock();
        while *count < target {
            if token.map_or(false, CancelToken::is_cancelled) {
                return WaitOutcome::Cancelled;
            }
            self.cond.wait(&mut count);
        }
        WaitOutcome::Notified
    }

    /// Block until at least `target` notifications have arrived.
    #[cfg(test)]
    pub(crate) fn wait_no_cancel(&self, target: usize) {
        let mut count = self.count.lock();
        while *count < target {
            self.cond.wait(&mut count);
        }
    }
}

impl Notify for Rendezvous {
    fn notify(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cond.notify_all();
    }
}

impl Interrupt for Rendezvous {
    fn interrupt(&self) {
        let _count = self.count.lock();
        self.cond.notify_all();
    }
}
