//! Single-participant backend.
//!
//! Every operation runs on the caller's thread. Matching happens when a
//! request is started, so a wait either finds its request already complete
//! or fails with [`ErrorKind::Deadlock`](crate::ErrorKind::Deadlock).
//! Endpoints of this backend are neither `Send` nor `Sync`.

mod endpoint;
mod pool;
mod request;
mod request_list;

pub use endpoint::Endpoint;
pub use request::Request;
pub use request_list::RequestList;
