//! Thread-per-rank backend.
//!
//! All ranks of a group share one arena holding a message pool per rank and
//! the reduction trees. Blocking calls park the calling thread on a
//! condition variable until a peer completes the operation or the rank's
//! [`CancelToken`](crate::CancelToken) fires.

mod arena;
mod collective;
mod endpoint;
mod pool;
mod request;
mod request_list;

pub use endpoint::Endpoint;
pub use pool::BUCKET_COUNT;
pub use request::{Canceller, Request};
pub use request_list::RequestList;
