//! Requests of the single-participant backend.

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use tracing::warn;

use super::pool::MessagePool;
use crate::error::{Error, ErrorKind, Result};
use crate::message::Message;
use crate::request::{Mode, RequestState};
use crate::scope::Ledger;
use crate::status::Status;

/// A send or receive of the single-participant backend.
///
/// A request completes when it is started after its counterpart. Waiting
/// for a request that did not complete that way can never succeed and
/// fails with [`ErrorKind::Deadlock`]; the request stays active and can still
/// be matched or cancelled afterwards.
pub struct Request<'a> {
    mode: Mode,
    msg: Arc<Message>,
    pool: Rc<MessagePool>,
    state: RequestState,
    status: Status,
    _marker: PhantomData<&'a mut [u8]>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(mode: Mode, msg: Arc<Message>, pool: Rc<MessagePool>) -> Self {
        Request {
            mode,
            msg,
            pool,
            state: RequestState::Idle,
            status: Status::empty(),
            _marker: PhantomData,
        }
    }

    /// Cancel the message when the scope behind `ledger` ends.
    pub(crate) fn enlist(&self, ledger: &Ledger) {
        let (msg, pool) = (self.msg.clone(), self.pool.clone());
        ledger.defer(move || {
            pool.cancel(&msg);
        });
    }

    pub(crate) fn tag(&self) -> i32 {
        self.msg.tag()
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.state == RequestState::Active && self.msg.is_enqueued()
    }

    pub(crate) fn post(&mut self) {
        self.msg.reset();
        self.state = RequestState::Active;
        self.status = Status::empty();

        let queued = match self.mode {
            Mode::Send => self.pool.queue_send(&self.msg),
            Mode::Recv => self.pool.queue_recv(&self.msg),
        };
        if !queued {
            self.finish();
        }
    }

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

/// Report a wait that only another participant could satisfy.
pub(crate) fn deadlock(op: &'static str, msg_tag: i32) -> Error {
    warn!(op, tag = msg_tag, "wait on unmatched request with a single participant");
    Error::comm(op, ErrorKind::Deadlock)
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
        match self.test()? {
            Some(status) => Ok(status),
            None => Err(deadlock("wait", self.msg.tag())),
        }
    }

    fn cancel(&mut self) {
        if self.state == RequestState::Active {
            self.pool.cancel(&self.msg);
            self.finish();
        }
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
            .field("tag", &self.msg.tag())
            .finish()
    }
}
