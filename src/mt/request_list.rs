//! Batch operations over many requests of the concurrent backend.

use std::sync::Arc;

use tracing::debug;

use super::arena::Arena;
use super::request::Request;
use crate::buffer::{RecvBuffer, SendBuffer};
use crate::cancel::CancelToken;
use crate::error::{check_index, Error, ErrorKind, Result};
use crate::message::{Rendezvous, WaitOutcome};
use crate::request::Request as _;
use crate::scope::Ledger;
use crate::status::Status;

/// Indexed collection of [`Request`]s.
///
/// Active requests are tracked with a pair of inverse permutations: the first
/// `active` entries of `jperm` are the indices of the active requests and
/// `iperm[i]` is the position of request `i` in `jperm`. Activating or
/// deactivating a request swaps two entries, so the batch operations only
/// visit active requests.
pub struct RequestList<'a> {
    rank: i32,
    arena: Arc<Arena>,
    token: CancelToken,
    ledger: &'a Ledger,
    reqs: Vec<Request<'a>>,
    iperm: Vec<usize>,
    jperm: Vec<usize>,
    active: usize,
}

impl<'a> RequestList<'a> {
    pub(crate) fn new(rank: i32, arena: Arc<Arena>, token: CancelToken, ledger: &'a Ledger) -> Self {
        RequestList {
            rank,
            arena,
            token,
            ledger,
            reqs: Vec::new(),
            iperm: Vec::new(),
            jperm: Vec::new(),
            active: 0,
        }
    }

    /// Request at `index`.
    pub fn get(&self, index: usize) -> Option<&Request<'a>> {
        self.reqs.get(index)
    }

    /// Number of requests that have been started and not yet collected.
    pub fn active_count(&self) -> usize {
        self.active
    }

    fn push(&mut self, req: Request<'a>) -> usize {
        let index = self.reqs.len();
        self.reqs.push(req);
        self.iperm.push(index);
        self.jperm.push(index);
        index
    }

    fn is_listed_active(&self, index: usize) -> bool {
        self.iperm[index] < self.active
    }

    fn activate(&mut self, index: usize) {
        let i = self.iperm[index];
        let j = self.active;
        let k = self.jperm[j];

        self.iperm[index] = j;
        self.iperm[k] = i;
        self.jperm[j] = index;
        self.jperm[i] = k;
        self.active += 1;
    }

    fn deactivate(&mut self, index: usize) {
        let i = self.iperm[index];
        let j = self.active - 1;
        let k = self.jperm[j];

        self.iperm[index] = j;
        self.iperm[k] = i;
        self.jperm[j] = index;
        self.jperm[i] = k;
        self.active = j;
    }

    fn validate(&self, op: &'static str, indices: &[usize]) -> Result<()> {
        indices
            .iter()
            .try_for_each(|&i| check_index(op, i, self.reqs.len()))
    }

    fn active_indices(&self) -> Vec<usize> {
        self.jperm[..self.active].to_vec()
    }

    fn statuses(&self) -> Vec<Status> {
        self.reqs.iter().map(crate::Request::status).collect()
    }

    /// Collect the requests in `ready`, which must have left their queues.
    fn collect(&mut self, ready: &[usize]) -> Vec<Status> {
        ready
            .iter()
            .map(|&i| {
                let status = self.reqs[i].finish();
                self.deactivate(i);
                status
            })
            .collect()
    }

    /// Attach `rz` to every queued request among `candidates`. Returns the
    /// requests that got the notifier and those that turned out complete.
    fn attach(&self, rz: &Arc<Rendezvous>, candidates: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut waiting = Vec::new();
        let mut ready = Vec::new();
        for &i in candidates {
            if self.reqs[i].message().set_notifier(rz.clone()) {
                waiting.push(i);
            } else {
                ready.push(i);
            }
        }
        (waiting, ready)
    }

    /// Detach the notifier from `waiting` and return those that completed.
    fn detach(&self, waiting: &[usize]) -> Vec<usize> {
        waiting
            .iter()
            .copied()
            .filter(|&i| !self.reqs[i].message().clear_notifier())
            .collect()
    }
}

impl<'a> crate::RequestList<'a> for RequestList<'a> {
    fn size(&self) -> usize {
        self.reqs.len()
    }

    fn add_send(&mut self, buf: SendBuffer<'a>, dest: i32, tag: i32) -> Result<usize> {
        let req = self.arena.new_send(self.rank, &self.token, self.ledger, buf, dest, tag)?;
        Ok(self.push(req))
    }

    fn add_recv(&mut self, buf: RecvBuffer<'a>, src: i32, tag: i32) -> Result<usize> {
        let req = self.arena.new_recv(self.rank, &self.token, self.ledger, buf, src, tag)?;
        Ok(self.push(req))
    }

    fn start_one(&mut self, index: usize) -> Result<()> {
        check_index("start_one", index, self.reqs.len())?;
        if !self.is_listed_active(index) {
            self.reqs[index].post();
            self.activate(index);
        }
        Ok(())
    }

    fn start_all(&mut self) {
        for pos in self.active..self.reqs.len() {
            self.reqs[self.jperm[pos]].post();
        }
        self.active = self.reqs.len();
    }

    fn test_one(&mut self, index: usize) -> Result<Option<Status>> {
        check_index("test_one", index, self.reqs.len())?;
        if !self.is_listed_active(index) {
            return Ok(Some(self.reqs[index].status()));
        }
        let status = self.reqs[index].test()?;
        if status.is_some() {
            self.deactivate(index);
        }
        Ok(status)
    }

    fn test_some(&mut self, indices: &mut Vec<usize>) -> Result<Vec<Status>> {
        self.validate("test_some", indices)?;
        let ready: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| self.is_listed_active(i) && !self.reqs[i].message().is_enqueued())
            .collect();
        let statuses = self.collect(&ready);
        *indices = ready;
        Ok(statuses)
    }

    fn test_all(&mut self) -> Result<Option<Vec<Status>>> {
        let active = self.active_indices();
        if active.iter().any(|&i| self.reqs[i].message().is_enqueued()) {
            return Ok(None);
        }
        self.collect(&active);
        Ok(Some(self.statuses()))
    }

    fn wait_one(&mut self, index: usize) -> Result<Status> {
        check_index("wait_one", index, self.reqs.len())?;
        if !self.is_listed_active(index) {
            return Ok(self.reqs[index].status());
        }
        let result = self.reqs[index].wait();
        self.deactivate(index);
        result
    }

    fn wait_some(&mut self, indices: &mut Vec<usize>) -> Result<Vec<Status>> {
        self.validate("wait_some", indices)?;
        let candidates: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| self.is_listed_active(i))
            .collect();

        let mut ready: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| !self.reqs[i].message().is_enqueued())
            .collect();

        if ready.is_empty() && !candidates.is_empty() {
            let rz = Rendezvous::new();
            let (waiting, early) = self.attach(&rz, &candidates);
            ready = early;

            if ready.is_empty() && rz.wait(1, Some(&self.token)) == WaitOutcome::Cancelled {
                self.detach(&waiting);
                debug!(rank = self.rank, waiting = waiting.len(), "wait_some interrupted");
                return Err(Error::comm("wait_some", ErrorKind::Cancelled));
            }
            ready.extend(self.detach(&waiting));
        }

        let statuses = self.collect(&ready);
        *indices = ready;
        Ok(statuses)
    }

    fn wait_all(&mut self) -> Result<Vec<Status>> {
        let active = self.active_indices();
        let rz = Rendezvous::new();
        let (waiting, _) = self.attach(&rz, &active);

        if rz.wait(waiting.len(), Some(&self.token)) == WaitOutcome::Cancelled {
            let done = self.detach(&waiting);
            debug!(
                rank = self.rank,
                pending = waiting.len() - done.len(),
                "wait_all interrupted"
            );
            return Err(Error::comm("wait_all", ErrorKind::Cancelled));
        }

        self.collect(&active);
        Ok(self.statuses())
    }

    fn cancel_one(&mut self, index: usize) -> Result<()> {
        check_index("cancel_one", index, self.reqs.len())?;
        if self.is_listed_active(index) {
            self.reqs[index].cancel();
            self.deactivate(index);
        }
        Ok(())
    }

    fn cancel_all(&mut self) -> Vec<Status> {
        for i in self.active_indices() {
            self.reqs[i].cancel();
        }
        self.active = 0;
        self.statuses()
    }

    fn clear(&mut self) -> Vec<Status> {
        let statuses = self.cancel_all();
        self.reqs.clear();
        self.iperm.clear();
        self.jperm.clear();
        statuses
    }
}

impl std::fmt::Debug for RequestList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestList")
            .field("rank", &self.rank)
            .field("size", &self.reqs.len())
            .field("active", &self.active)
            .finish()
    }
}
