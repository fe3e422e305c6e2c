//! Nonblocking requests of the concurrent backend.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use super::pool::MessagePool;
use crate::cancel::CancelToken;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, WaitOutcome};
use crate::request::{Mode, RequestState};
use crate::scope::Ledger;
use crate::status::Status;
use crate::{ANY_SOURCE, ANY_TAG};

/// A send or receive handled by the shared message pools.
///
/// The request borrows its buffer for `'a`, the lifetime of the
/// [`Scope`](crate::Scope) it was created in. Dropping an active request
/// cancels it, and so does the end of its scope if the request was leaked.
///
/// A wait blocks the calling thread until another rank posts the matching
/// operation, the request is cancelled through a [`Canceller`], or the rank's
/// [`CancelToken`] fires.
pub struct Request<'a> {
    mode: Mode,
    msg: Arc<Message>,
    pool: Arc<MessagePool>,
    state: RequestState,
    status: Status,
    token: CancelToken,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(mode: Mode, msg: Arc<Message>, pool: Arc<MessagePool>, token: CancelToken) -> Self {
        Request {
            mode,
            msg,
            pool,
            state: RequestState::Idle,
            status: Status::empty(),
            token,
            _marker: PhantomData,
        }
    }

    /// Handle that cancels this request from another thread.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            msg: self.msg.clone(),
            pool: self.pool.clone(),
        }
    }

    /// Cancel the message when the scope behind `ledger` ends.
    pub(crate) fn enlist(&self, ledger: &Ledger) {
        let canceller = self.canceller();
        ledger.defer(move || {
            canceller.cancel();
            canceller.msg.wait_no_cancel();
        });
    }

    pub(crate) fn message(&self) -> &Arc<Message> {
        &self.msg
    }

    /// Hand the message to the pool. The request must not be active.
    pub(crate) fn post(&mut self) {
        self.msg.reset();
        self.state = RequestState::Active;
        self.status = Status::empty();

        let queued = match self.mode {
            Mode::Send => self.pool.queue_send(&self.msg),
            Mode::Recv if self.msg.rank() == ANY_SOURCE || self.msg.tag() == ANY_TAG => {
                self.pool.queue_any_recv(&self.msg)
            }
            Mode::Recv => self.pool.queue_recv(&self.msg),
        };
        if !queued {
            self.finish();
        }
    }

    /// Collect the final status of a message that left its queue.
    pub(crate) fn finish(&mut self) -> Status {
        self.status = self.msg.status();
        self.state = if self.status.cancelled {
            RequestState::Cancelled
        } else {
            RequestState::Completed
        };
        self.status
    }
}

impl crate::Request for Request<'_> {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn state(&self) -> RequestState {
        self.state
    }

    fn status(&self) -> Status {
        self.status
    }

    fn start(&mut self) -> Result<()> {
        if self.state == RequestState::Active {
            return Err(Error::InvalidRequest("request already active".into()));
        }
        self.post();
        Ok(())
    }

    fn test(&mut self) -> Result<Option<Status>> {
        match self.state {
            RequestState::Idle => Ok(Some(Status::empty())),
            RequestState::Active if self.msg.is_enqueued() => Ok(None),
            RequestState::Active => Ok(Some(self.finish())),
            RequestState::Completed | RequestState::Cancelled => Ok(Some(self.status)),
        }
    }

    fn wait(&mut self) -> Result<Status> {
        match self.state {
            RequestState::Idle => return Ok(Status::empty()),
            RequestState::Completed | RequestState::Cancelled => return Ok(self.status),
            RequestState::Active => {}
        }

        if self.msg.wait(Some(&self.token)) == WaitOutcome::Cancelled {
            self.pool.cancel(&self.msg);
            self.msg.wait_no_cancel();
            let status = self.finish();
            if status.cancelled {
                debug!(peer = self.msg.rank(), tag = self.msg.tag(), "wait interrupted");
                return Err(Error::comm("wait", ErrorKind::Cancelled));
            }
            return Ok(status);
        }
        Ok(self.finish())
    }

    fn cancel(&mut self) {
        if self.state != RequestState::Active {
            return;
        }
        self.pool.cancel(&self.msg);
        self.msg.wait_no_cancel();
        self.finish();
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        crate::Request::cancel(self);
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("rank", &self.msg.rank())
            .field("tag", &self.msg.tag())
            .finish()
    }
}

/// Cancels a [`Request`] from another thread.
///
/// A thread blocked in [`wait`](crate::Request::wait) on the request wakes up
/// with a cancelled status. If the message was already matched the cancel has
/// no effect.
#[derive(Clone)]
pub struct Canceller {
    msg: Arc<Message>,
    pool: Arc<MessagePool>,
}

impl Canceller {
    /// Cancel the request if it is still queued. Returns `true` if this call
    /// removed it.
    pub fn cancel(&self) -> bool {
        self.pool.cancel(&self.msg)
    }
}

impl std::fmt::Debug for Canceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller")
            .field("rank", &self.msg.rank())
            .field("tag", &self.msg.tag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{RecvBuffer, SendBuffer};
    use crate::Request as _;
    use std::thread;
    use std::time::Duration;

    fn pool() -> Arc<MessagePool> {
        Arc::new(MessagePool::new(0))
    }

    #[test]
    fn test_is_idempotent_after_completion() {
        let pool = pool();
        let src = [4i16, 5];
        let mut dst = [0i16; 2];
        let token = CancelToken::new();

        let mut recv = Request::new(
            Mode::Recv,
            Message::new(RecvBuffer::new(&mut dst).raw(), 0, 1),
            pool.clone(),
            token.clone(),
        );
        let mut send = Request::new(
            Mode::Send,
            Message::new(SendBuffer::new(&src).raw(), 0, 1),
            pool.clone(),
            token,
        );

        assert_eq!(recv.test().unwrap(), Some(Status::empty()));
        recv.start().unwrap();
        assert!(recv.start().is_err());
        assert_eq!(recv.test().unwrap(), None);

        send.start().unwrap();
        assert_eq!(send.state(), RequestState::Completed);

        let first = recv.test().unwrap().unwrap();
        let second = recv.test().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.size, 2);
        assert_eq!(recv.wait().unwrap(), first);
        drop((recv, send));
        assert_eq!(dst, [4, 5]);
    }

    #[test]
    fn cancel_before_match() {
        let pool = pool();
        let mut dst = [0u8; 1];
        let mut recv = Request::new(
            Mode::Recv,
            Message::new(RecvBuffer::new(&mut dst).raw(), 1, 0),
            pool.clone(),
            CancelToken::new(),
        );
        recv.cancel();
        assert_eq!(recv.state(), RequestState::Idle);

        recv.start().unwrap();
        recv.cancel();
        assert_eq!(recv.state(), RequestState::Cancelled);
        assert!(recv.test().unwrap().unwrap().cancelled);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn canceller_wakes_blocked_waiter() {
        let pool = pool();
        let mut dst = [0u8; 1];
        let mut recv = Request::new(
            Mode::Recv,
            Message::new(RecvBuffer::new(&mut dst).raw(), 1, 0),
            pool,
            CancelToken::new(),
        );
        recv.start().unwrap();
        let canceller = recv.canceller();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel()
        });
        let status = recv.wait().unwrap();
        assert!(status.cancelled);
        assert_eq!(recv.state(), RequestState::Cancelled);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn token_interrupts_wait() {
        let pool = pool();
        let mut dst = [0u8; 1];
        let token = CancelToken::new();
        let mut recv = Request::new(
            Mode::Recv,
            Message::new(RecvBuffer::new(&mut dst).raw(), 1, 0),
            pool.clone(),
            token.clone(),
        );
        recv.start().unwrap();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        let err = recv.wait().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Cancelled));
        assert_eq!(recv.state(), RequestState::Cancelled);
        assert_eq!(pool.pending(), 0);
        handle.join().unwrap();
    }

    #[test]
    fn dropping_active_request_dequeues_it() {
        let pool = pool();
        let src = [1u64];
        {
            let mut send = Request::new(
                Mode::Send,
                Message::new(SendBuffer::new(&src).raw(), 0, 2),
                pool.clone(),
                CancelToken::new(),
            );
            send.start().unwrap();
            assert_eq!(pool.pending(), 1);
        }
        assert_eq!(pool.pending(), 0);
    }
}
