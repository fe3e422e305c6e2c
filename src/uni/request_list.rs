//! Batch operations over single-participant requests.

use std::rc::Rc;

use super::pool::MessagePool;
use super::request::{deadlock, Request};
use super::endpoint::{new_recv, new_send};
use crate::buffer::{RecvBuffer, SendBuffer};
use crate::error::{check_index, Result};
use crate::request::Request as _;
use crate::scope::Ledger;
use crate::status::Status;

/// Indexed collection of single-participant [`Request`]s.
///
/// The batch waits fail with [`ErrorKind::Deadlock`](crate::ErrorKind::Deadlock)
/// when none of the requests they wait for can complete.
pub struct RequestList<'a> {
    pool: Rc<MessagePool>,
    ledger: &'a Ledger,
    reqs: Vec<Request<'a>>,
}

impl<'a> RequestList<'a> {
    pub(crate) fn new(pool: Rc<MessagePool>, ledger: &'a Ledger) -> Self {
        RequestList {
            pool,
            ledger,
            reqs: Vec::new(),
        }
    }

    /// Request at `index`.
    pub fn get(&self, index: usize) -> Option<&Request<'a>> {
        self.reqs.get(index)
    }

    fn push(&mut self, req: Request<'a>) -> usize {
        self.reqs.push(req);
        self.reqs.len() - 1
    }

    fn validate(&self, op: &'static str, indices: &[usize]) -> Result<()> {
        indices
            .iter()
            .try_for_each(|&i| check_index(op, i, self.reqs.len()))
    }

    fn statuses(&self) -> Vec<Status> {
        self.reqs.iter().map(crate::Request::status).collect()
    }

    fn finish_ready(&mut self, indices: &[usize]) -> (Vec<usize>, Vec<Status>) {
        let ready: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&i| self.reqs[i].is_active() && !self.reqs[i].is_pending())
            .collect();
        let statuses = ready.iter().map(|&i| self.reqs[i].finish()).collect();
        (ready, statuses)
    }
}

impl<'a> crate::RequestList<'a> for RequestList<'a> {
    fn size(&self) -> usize {
        self.reqs.len()
    }

    fn add_send(&mut self, buf: SendBuffer<'a>, dest: i32, tag: i32) -> Result<usize> {
        let req = new_send("add_send", &self.pool, self.ledger, buf, dest, tag)?;
        Ok(self.push(req))
    }

    fn add_recv(&mut self, buf: RecvBuffer<'a>, src: i32, tag: i32) -> Result<usize> {
        let req = new_recv("add_recv", &self.pool, self.ledger, buf, src, tag)?;
        Ok(self.push(req))
    }

    fn start_one(&mut self, index: usize) -> Result<()> {
        check_index("start_one", index, self.reqs.len())?;
        if !self.reqs[index].is_active() {
            self.reqs[index].post();
        }
        Ok(())
    }

    fn start_all(&mut self) {
        for req in self.reqs.iter_mut().filter(|r| !r.is_active()) {
            req.post();
        }
    }

    fn test_one(&mut self, index: usize) -> Result<Option<Status>> {
        check_index("test_one", index, self.reqs.len())?;
        self.reqs[index].test()
    }

    fn test_some(&mut self, indices: &mut Vec<usize>) -> Result<Vec<Status>> {
        self.validate("test_some", indices)?;
        let (ready, statuses) = self.finish_ready(indices);
        *indices = ready;
        Ok(statuses)
    }

    fn test_all(&mut self) -> Result<Option<Vec<Status>>> {
        if self.reqs.iter().any(Request::is_pending) {
            return Ok(None);
        }
        for req in self.reqs.iter_mut().filter(|r| r.is_active()) {
            req.finish();
        }
        Ok(Some(self.statuses()))
    }

    fn wait_one(&mut self, index: usize) -> Result<Status> {
        check_index("wait_one", index, self.reqs.len())?;
        self.reqs[index].wait()
    }

    fn wait_some(&mut self, indices: &mut Vec<usize>) -> Result<Vec<Status>> {
        self.validate("wait_some", indices)?;
        let (ready, statuses) = self.finish_ready(indices);
        if ready.is_empty() {
            if let Some(&blocked) = indices.iter().find(|&&i| self.reqs[i].is_pending()) {
                return Err(deadlock("wait_some", self.reqs[blocked].tag()));
            }
        }
        *indices = ready;
        Ok(statuses)
    }

    fn wait_all(&mut self) -> Result<Vec<Status>> {
        if let Some(blocked) = self.reqs.iter().find(|r| r.is_pending()) {
            return Err(deadlock("wait_all", blocked.tag()));
        }
        for req in self.reqs.iter_mut().filter(|r| r.is_active()) {
            req.finish();
        }
        Ok(self.statuses())
    }

    fn cancel_one(&mut self, index: usize) -> Result<()> {
        check_index("cancel_one", index, self.reqs.len())?;
        self.reqs[index].cancel();
        Ok(())
    }

    fn cancel_all(&mut self) -> Vec<Status> {
        for req in &mut self.reqs {
            req.cancel();
        }
        self.statuses()
    }

    fn clear(&mut self) -> Vec<Status> {
        let statuses = self.cancel_all();
        self.reqs.clear();
        statuses
    }
}

impl std::fmt::Debug for RequestList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestList")
            .field("size", &self.reqs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uni::Endpoint;
    use crate::{scope, Endpoint as _, Error, ErrorKind, RequestList as _, ANY_TAG};

    #[test]
    fn wait_all_after_local_matching() {
        let ep = Endpoint::new();
        let data = [1.0f32, 2.0];
        let mut out = [0.0f32; 2];
        scope(|s| {
            let mut list = ep.new_request_list(s);
            list.add_recv(RecvBuffer::new(&mut out), 0, ANY_TAG).unwrap();
            list.add_send(SendBuffer::new(&data), 0, 6).unwrap();
            list.start_all();

            let statuses = list.wait_all().unwrap();
            assert_eq!(statuses.len(), 2);
            assert_eq!(statuses[0].tag, 6);
            assert_eq!(statuses[1].source, 0);
        });
        assert_eq!(out, data);
    }

    #[test]
    fn waits_without_counterpart_deadlock() {
        let ep = Endpoint::new();
        let mut out = [0u8; 1];
        scope(|s| {
            let mut list = ep.new_request_list(s);
            list.add_recv(RecvBuffer::new(&mut out), 0, 1).unwrap();
            list.start_one(0).unwrap();

            assert_eq!(list.wait_all().unwrap_err().kind(), Some(ErrorKind::Deadlock));
            let mut indices = vec![0];
            assert_eq!(
                list.wait_some(&mut indices).unwrap_err().kind(),
                Some(ErrorKind::Deadlock)
            );
            assert_eq!(list.wait_one(0).unwrap_err().kind(), Some(ErrorKind::Deadlock));
            assert_eq!(list.test_all().unwrap(), None);

            list.cancel_one(0).unwrap();
            assert!(list.wait_one(0).unwrap().cancelled);
        });
    }

    #[test]
    fn index_errors_name_operation() {
        let ep = Endpoint::new();
        let data = [0u8];
        scope(|s| {
            let mut list = ep.new_request_list(s);
            for _ in 0..3 {
                list.add_send(SendBuffer::new(&data), 0, 0).unwrap();
            }
            assert_eq!(
                list.cancel_one(5),
                Err(Error::IllegalIndex {
                    op: "cancel_one",
                    index: 5,
                    size: 3
                })
            );
            let mut indices = vec![1, 3];
            assert!(list.test_some(&mut indices).is_err());
            assert!(list.add_send(SendBuffer::new(&data), 1, 0).is_err());
        });
    }

    #[test]
    fn leaked_list_requests_are_cancelled_with_their_scope() {
        let ep = Endpoint::new();
        let mut out = [0u32; 2];
        scope(|s| {
            let mut list = ep.new_request_list(s);
            list.add_recv(RecvBuffer::new(&mut out), 0, 2).unwrap();
            list.start_all();
            std::mem::forget(list);
        });
        let err = ep.send(SendBuffer::new(&[5u32, 6]), 0, 2).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Deadlock));
        assert_eq!(out, [0, 0]);
    }
}
