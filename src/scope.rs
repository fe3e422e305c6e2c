//! Scopes that bound the lifetime of requests.
//!
//! An active request leaves a raw view of its buffer in a message pool.
//! Dropping the request cancels it, but a request can also be leaked with
//! [`std::mem::forget`], and then nothing would stop a later match from
//! writing into memory its owner uses again. Requests are therefore created
//! inside a [`scope()`]: every request registered with a [`Scope`] is cancelled
//! when the scope ends, before the borrows of its buffers can end.

use std::cell::RefCell;
use std::marker::PhantomData;

use tracing::trace;

/// Cancels one message if it is still queued.
type Retire = Box<dyn FnOnce()>;

/// Messages to cancel when the owning scope ends.
#[derive(Default)]
pub(crate) struct Ledger {
    retire: RefCell<Vec<Retire>>,
}

impl Ledger {
    /// Run `retire` when the scope ends.
    pub(crate) fn defer(&self, retire: impl FnOnce() + 'static) {
        self.retire.borrow_mut().push(Box::new(retire));
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        let retire = std::mem::take(self.retire.get_mut());
        if !retire.is_empty() {
            trace!(requests = retire.len(), "closing request scope");
        }
        for cancel in retire {
            cancel();
        }
    }
}

/// A region of code that may create requests.
///
/// Obtained from [`scope()`]. Requests and request lists built with a
/// `&'scope Scope` cannot outlive it, and their buffers must outlive it.
/// A scope belongs to the thread that opened it.
pub struct Scope<'scope, 'env: 'scope> {
    ledger: Ledger,
    scope: PhantomData<&'scope mut &'scope ()>,
    env: PhantomData<&'env mut &'env ()>,
}

impl Scope<'_, '_> {
    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl std::fmt::Debug for Scope<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("requests", &self.ledger.retire.borrow().len())
            .finish()
    }
}

/// Run `f` with a [`Scope`] for creating requests.
///
/// When `f` returns or unwinds, every request created in the scope that is
/// still queued is cancelled, including requests that were leaked. Buffers
/// handed to those requests must therefore be declared outside the scope.
///
/// # Example
///
/// ```
/// use mprt::{uni, Endpoint, RecvBuffer, Request, SendBuffer};
///
/// let ep = uni::Endpoint::new();
/// let data = [1u8, 2];
/// let mut out = [0u8; 2];
///
/// mprt::scope(|s| {
///     let mut recv = ep.init_recv(s, RecvBuffer::new(&mut out), 0, 0).unwrap();
///     let mut send = ep.init_send(s, SendBuffer::new(&data), 0, 0).unwrap();
///     recv.start().unwrap();
///     send.start().unwrap();
///     assert_eq!(recv.wait().unwrap().size, 2);
/// });
/// assert_eq!(out, data);
/// ```
pub fn scope<'env, F, R>(f: F) -> R
where
    F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
{
    let scope = Scope {
        ledger: Ledger::default(),
        scope: PhantomData,
        env: PhantomData,
    };
    f(&scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mt, uni, Endpoint, ErrorKind, RecvBuffer, Request, SendBuffer};

    #[test]
    fn forgotten_receive_is_cancelled_at_scope_end() {
        let ep = uni::Endpoint::new();
        let mut buf = [0i32; 2];
        scope(|s| {
            let mut recv = ep.init_recv(s, RecvBuffer::new(&mut buf), 0, 1).unwrap();
            recv.start().unwrap();
            std::mem::forget(recv);
        });

        let view = &buf;
        let err = ep.send(SendBuffer::new(&[7i32, 8]), 0, 1).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Deadlock));
        assert_eq!(*view, [0, 0]);
    }

    #[test]
    fn forgotten_receive_leaves_no_queued_message_between_threads() {
        let eps = mt::Endpoint::group(2).unwrap();
        let mut buf = [0i16];
        scope(|s| {
            let mut recv = eps[0].init_recv(s, RecvBuffer::new(&mut buf), 1, 4).unwrap();
            recv.start().unwrap();
            std::mem::forget(recv);
        });

        let data = [9i16];
        scope(|s| {
            let mut send = eps[1].init_send(s, SendBuffer::new(&data), 0, 4).unwrap();
            send.start().unwrap();
            assert_eq!(send.test().unwrap(), None);
        });
        assert_eq!(buf, [0]);
    }

    #[test]
    fn completed_requests_are_untouched_at_scope_end() {
        let ep = uni::Endpoint::new();
        let data = [3u64];
        let mut out = [0u64];
        let status = scope(|s| {
            let mut send = ep.init_send(s, SendBuffer::new(&data), 0, 0).unwrap();
            send.start().unwrap();
            let mut recv = ep.init_recv(s, RecvBuffer::new(&mut out), 0, 0).unwrap();
            recv.start().unwrap();
            let status = recv.wait().unwrap();
            std::mem::forget(recv);
            status
        });
        assert!(status.is_ok() && !status.cancelled);
        assert_eq!(out, [3]);
    }
}
