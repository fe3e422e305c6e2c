//! # mprt
//!
//! In-process message passing in the style of MPI.
//!
//! A group of ranks exchanges typed buffers through point-to-point requests
//! and combines them with tree reductions. Two backends implement the same
//! [`Endpoint`] interface:
//!
//! - [`mt`]: one OS thread per rank, blocking waits park on condition variables
//! - [`uni`]: a single participant; waits that could only be satisfied by
//!   another rank fail with [`ErrorKind::Deadlock`]
//!
//! ## Quick Start
//!
//! ```
//! use mprt::{DriverConfig, Endpoint, RecvBuffer, ReduceOp, Result, SendBuffer, Task, ANY_SOURCE};
//!
//! struct Hello;
//!
//! impl Task for Hello {
//!     fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
//!         let (rank, size) = (ep.rank(), ep.size());
//!         if rank != 0 {
//!             ep.send(SendBuffer::new(&[rank as f64]), 0, 7)?;
//!         } else {
//!             for _ in 1..size {
//!                 let mut buf = [0.0f64];
//!                 let status = ep.recv(RecvBuffer::new(&mut buf), ANY_SOURCE, 7)?;
//!                 assert_eq!(buf[0], status.source as f64);
//!             }
//!         }
//!
//!         let mut max = [0i32];
//!         ep.allreduce(SendBuffer::new(&[rank]), RecvBuffer::new(&mut max), ReduceOp::Max)?;
//!         assert_eq!(max[0], size - 1);
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let mut args: Vec<String> = std::env::args().collect();
//!     let config = DriverConfig::from_args(&mut args)?;
//!     mprt::run(&config, &Hello)
//! }
//! ```
//!
//! ## Requests
//!
//! [`Endpoint::init_send`] and [`Endpoint::init_recv`] build idle
//! [`Request`]s that can be started, tested, waited on and cancelled any
//! number of times. A [`RequestList`] tracks many requests by index and
//! waits for any or all of them. Receives may use [`ANY_SOURCE`] and
//! [`ANY_TAG`]; among the compatible sends the oldest one is matched.
//!
//! Requests live in a [`scope()`]. When the scope ends, every request created
//! in it that is still queued is cancelled, so no buffer is written after its
//! borrow ends.
//!
//! ## Reductions
//!
//! [`Endpoint::reduce`] and [`Endpoint::allreduce`] combine one buffer per
//! rank along a fixed binary tree ([`TreeShape`]), so the association order
//! of floating-point results depends only on the group size. The combine
//! function for each ([`ReduceOp`], [`DatatypeTag`]) pair comes from the
//! [`Optable`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

mod buffer;
mod cancel;
mod config;
mod datatype;
mod driver;
mod endpoint;
mod error;
mod message;
mod optable;
mod queue;
mod reduce;
mod request;
mod scope;
mod status;

pub mod mt;
pub mod uni;

pub use buffer::{RecvBuffer, SendBuffer};
pub use cancel::CancelToken;
pub use config::{DriverConfig, NUM_THREADS_ENV, NUM_THREADS_FLAG};
pub use datatype::{Datatype, DatatypeTag, DoubleInt, IntPair};
pub use driver::{run, Task};
pub use endpoint::Endpoint;
pub use error::{Error, ErrorKind, Result};
pub use optable::{dummy_handler, Handler, Optable};
pub use reduce::{combine_tree, ReduceBuffer, TreeShape};
pub use request::{Mode, Request, RequestList, RequestState};
pub use scope::{scope, Scope};
pub use status::Status;

/// Wildcard source rank for receives.
pub const ANY_SOURCE: i32 = -1;

/// Wildcard tag for receives.
pub const ANY_TAG: i32 = -1;

/// Reduction operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReduceOp {
    /// Sum of values
    Sum = 0,
    /// Maximum value
    Max = 1,
    /// Minimum value
    Min = 2,
    /// Product of values
    Prod = 3,
    /// Bitwise or
    Bor = 4,
    /// Bitwise and
    Band = 5,
    /// Logical or
    Lor = 6,
    /// Logical and
    Land = 7,
}

impl ReduceOp {
    /// Number of operations.
    pub const COUNT: usize = 8;

    /// All operations, ordered by [`index`](Self::index).
    pub const ALL: [ReduceOp; Self::COUNT] = [
        ReduceOp::Sum,
        ReduceOp::Max,
        ReduceOp::Min,
        ReduceOp::Prod,
        ReduceOp::Bor,
        ReduceOp::Band,
        ReduceOp::Lor,
        ReduceOp::Land,
    ];

    /// Position of this operation in [`ALL`](Self::ALL).
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_op_indices_match_all() {
        for (i, op) in ReduceOp::ALL.iter().enumerate() {
            assert_eq!(op.index(), i);
        }
    }

    #[test]
    fn wildcards_are_negative() {
        assert!(ANY_SOURCE < 0);
        assert!(ANY_TAG < 0);
    }
}
