//! Run one task per rank.
//!
//! [`run`] picks the backend from a [`DriverConfig`]: a single participant
//! runs the task on the calling thread over [`uni::Endpoint`], a larger group
//! spawns one scoped thread per rank over [`mt::Endpoint`].
//!
//! When a rank returns an error or panics, every rank's [`CancelToken`] is
//! cancelled so that peers blocked on the failed rank unwind instead of
//! hanging. The first failure is reported.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::DriverConfig;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::{mt, uni};

/// Work executed by every rank.
///
/// The same value is shared by all rank threads, so per-rank state belongs
/// in local variables of [`run`](Task::run).
///
/// # Example
///
/// ```
/// use mprt::{DriverConfig, Endpoint, RecvBuffer, ReduceOp, Result, SendBuffer, Task};
///
/// struct SumRanks;
///
/// impl Task for SumRanks {
///     fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
///         let value = [ep.rank()];
///         let mut total = [0i32];
///         ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut total), ReduceOp::Sum)?;
///         assert_eq!(total[0], ep.size() * (ep.size() - 1) / 2);
///         Ok(())
///     }
/// }
///
/// mprt::run(&DriverConfig::new(4).unwrap(), &SumRanks).unwrap();
/// ```
pub trait Task: Sync {
    /// Body of one rank.
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()>;
}

/// Execute `task` on every rank described by `config` and wait for all of
/// them.
///
/// # Errors
///
/// [`Error::Aborted`] wrapping the error of the first rank that failed, or
/// [`Error::RankPanicked`] if that rank panicked.
pub fn run<T: Task>(config: &DriverConfig, task: &T) -> Result<()> {
    let threads = config.threads();
    if threads == 1 {
        info!("running task on a single participant");
        let ep = uni::Endpoint::new();
        return match panic::catch_unwind(AssertUnwindSafe(|| task.run(&ep))) {
            Ok(result) => result.map_err(|err| aborted(0, err)),
            Err(_) => Err(Error::RankPanicked(0)),
        };
    }

    let eps = mt::Endpoint::group(threads)?;
    let tokens: Vec<CancelToken> = eps.iter().map(|ep| ep.cancel_token().clone()).collect();
    let failure: Mutex<Option<Error>> = Mutex::new(None);
    info!(threads, "starting rank threads");

    thread::scope(|s| {
        for ep in eps {
            let tokens = &tokens;
            let failure = &failure;
            s.spawn(move || {
                let rank = ep.rank();
                let err = match panic::catch_unwind(AssertUnwindSafe(|| task.run(&ep))) {
                    Ok(Ok(())) => return,
                    Ok(Err(err)) => aborted(rank, err),
                    Err(_) => Error::RankPanicked(rank),
                };
                let mut first = failure.lock();
                if first.is_some() {
                    debug!(rank, error = %err, "rank failed after group abort");
                    return;
                }
                warn!(rank, error = %err, "rank failed, cancelling all ranks");
                *first = Some(err);
                drop(first);
                for token in tokens {
                    token.cancel();
                }
            });
        }
    });

    match failure.into_inner() {
        Some(err) => Err(err),
        None => {
            debug!(threads, "all rank threads finished");
            Ok(())
        }
    }
}

fn aborted(rank: i32, err: Error) -> Error {
    Error::Aborted {
        rank,
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scope, ErrorKind, RecvBuffer, ReduceOp, Request, SendBuffer, Status, ANY_SOURCE};
    use std::sync::mpsc;
    use std::time::Duration;

    struct Ring;

    impl Task for Ring {
        fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
            let (rank, size) = (ep.rank(), ep.size());
            if size == 1 {
                return Ok(());
            }
            let next = (rank + 1) % size;
            let value = [rank];
            let mut got = [-1i32];
            let status = scope(|s| -> Result<Status> {
                let mut send = ep.init_send(s, SendBuffer::new(&value), next, 0)?;
                send.start()?;
                let status = ep.recv(RecvBuffer::new(&mut got), ANY_SOURCE, 0)?;
                send.wait()?;
                Ok(status)
            })?;
            assert_eq!(got[0], (rank + size - 1) % size);
            assert_eq!(status.source, got[0]);
            Ok(())
        }
    }

    #[test]
    fn ring_exchange_on_every_group_size() {
        for threads in 1..=5 {
            run(&DriverConfig::new(threads).unwrap(), &Ring).unwrap();
        }
    }

    struct FailingRoot;

    impl Task for FailingRoot {
        fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
            if ep.rank() == 0 {
                return Err(Error::Internal("root gave up".into()));
            }
            // Blocks until the driver cancels this rank.
            let value = [1u8];
            let mut out = [0u8];
            ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut out), ReduceOp::Sum)
        }
    }

    #[test]
    fn first_failure_cancels_blocked_ranks() {
        let err = run(&DriverConfig::new(3).unwrap(), &FailingRoot).unwrap_err();
        match err {
            Error::Aborted { rank, source } => {
                assert_eq!(rank, 0);
                assert_eq!(*source, Error::Internal("root gave up".into()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct LateFailure;

    impl Task for LateFailure {
        fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
            if ep.rank() == ep.size() - 1 {
                thread::sleep(Duration::from_millis(100));
                return Err(Error::Internal("last rank gave up".into()));
            }
            let value = [1u32];
            let mut out = [0u32];
            ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut out), ReduceOp::Sum)
        }
    }

    /// Ranks 0 and 1 meet at the first tree node; rank 1 climbs and sleeps at
    /// the root while rank 0 stays parked below it.
    #[test]
    fn late_failure_releases_ranks_inside_reduction() {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(run(&DriverConfig::new(4).unwrap(), &LateFailure));
        });
        let result = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("driver did not return");
        match result {
            Err(Error::Aborted { rank, source }) => {
                assert_eq!(rank, 3);
                assert_eq!(*source, Error::Internal("last rank gave up".into()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    struct Panics;

    impl Task for Panics {
        fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
            if ep.rank() == 1 {
                panic!("rank one exploded");
            }
            let mut out = [0i32];
            ep.recv(RecvBuffer::new(&mut out), 1, 0).map(|_| ())
        }
    }

    #[test]
    fn panic_is_reported_as_rank_panicked() {
        let err = run(&DriverConfig::new(2).unwrap(), &Panics).unwrap_err();
        assert_eq!(err, Error::RankPanicked(1));
        assert_eq!(err.kind(), None);
    }

    struct Cancelled;

    impl Task for Cancelled {
        fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
            let mut out = [0i32];
            ep.recv(RecvBuffer::new(&mut out), 0, 9).map(|_| ())
        }
    }

    #[test]
    fn single_participant_deadlock_aborts() {
        let err = run(&DriverConfig::default(), &Cancelled).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Deadlock));
    }
}
