//! Reductions through the driver on both backends.

use mprt::{
    combine_tree, uni, DoubleInt, DriverConfig, Endpoint, Error, ErrorKind, IntPair, RecvBuffer, ReduceBuffer,
    ReduceOp, Result, SendBuffer, Task,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run_on(threads: usize, task: &impl Task) -> Result<()> {
    mprt::run(&DriverConfig::new(threads)?, task)
}

struct SumAndMax;

impl Task for SumAndMax {
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
        let (rank, size) = (ep.rank(), ep.size());
        let value = [rank as i64 + 1, -(rank as i64)];

        let mut sum = [0i64; 2];
        ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut sum), ReduceOp::Sum)?;
        let n = size as i64;
        assert_eq!(sum, [n * (n + 1) / 2, -(n * (n - 1) / 2)]);

        let mut max = [0i64; 2];
        ep.reduce(SendBuffer::new(&value), RecvBuffer::new(&mut max), size - 1, ReduceOp::Max)?;
        if rank == size - 1 {
            assert_eq!(max, [n, 0]);
        }
        Ok(())
    }
}

#[test]
fn sum_and_max_for_many_group_sizes() {
    init_logging();
    for threads in 1..=9 {
        run_on(threads, &SumAndMax).unwrap();
    }
}

struct Location;

impl Task for Location {
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
        let rank = ep.rank();
        // Rank 2 holds the smallest value, rank 0 the largest.
        let value = [DoubleInt {
            value: ((rank - 2) * (rank - 2)) as f64 - rank as f64 * 0.5,
            index: rank,
        }];
        let mut min = [DoubleInt::default()];
        ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut min), ReduceOp::Min)?;
        assert_eq!(min[0].index, 2);

        let pair = [IntPair {
            value: -rank,
            index: rank,
        }];
        let mut max = [IntPair::default()];
        ep.reduce(SendBuffer::new(&pair), RecvBuffer::new(&mut max), 0, ReduceOp::Max)?;
        if rank == 0 {
            assert_eq!(max[0], IntPair { value: 0, index: 0 });
        }
        Ok(())
    }
}

#[test]
fn min_and_max_with_location() {
    run_on(4, &Location).unwrap();
}

struct Unsupported;

impl Task for Unsupported {
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
        let value = [1.5f32];
        let mut out = [0.0f32];
        ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut out), ReduceOp::Band)
    }
}

#[test]
fn unsupported_operation_fails_on_every_backend() {
    for threads in [1, 3] {
        let err = run_on(threads, &Unsupported).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::UnsupportedOp));
    }
}

/// Float sums follow the same association order as a sequential reduction
/// over the same number of participants.
struct MatchesSequential;

impl Task for MatchesSequential {
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
        let size = ep.size() as usize;
        let contribution = |r: usize| [1.0e16f64 * (r % 2) as f64 - 0.3 * r as f64, 0.1 + r as f64];

        let mine = contribution(ep.rank() as usize);
        let mut out = [0.0f64; 2];
        ep.allreduce(SendBuffer::new(&mine), RecvBuffer::new(&mut out), ReduceOp::Sum)?;

        let mut copies: Vec<[f64; 2]> = (0..size).map(contribution).collect();
        let bufs: Vec<ReduceBuffer<'_>> = copies
            .iter_mut()
            .enumerate()
            .map(|(r, c)| ReduceBuffer::new(RecvBuffer::new(c), r as i32))
            .collect();
        combine_tree(ReduceOp::Sum, &bufs)?;
        drop(bufs);

        assert_eq!(out[0].to_bits(), copies[0][0].to_bits());
        assert_eq!(out[1].to_bits(), copies[0][1].to_bits());
        Ok(())
    }
}

#[test]
fn concurrent_result_matches_combine_tree() {
    for threads in [2, 3, 5, 8] {
        run_on(threads, &MatchesSequential).unwrap();
    }
}

#[test]
fn uni_reduce_is_a_checked_copy() {
    let ep = uni::Endpoint::new();
    let value = [9u8, 8, 7];
    let mut out = [0u8; 3];
    ep.reduce(SendBuffer::new(&value), RecvBuffer::new(&mut out), 0, ReduceOp::Band)
        .unwrap();
    assert_eq!(out, value);

    let mut wrong = [0i8; 3];
    assert_eq!(
        ep.allreduce(SendBuffer::new(&value), RecvBuffer::new(&mut wrong), ReduceOp::Sum),
        Err(Error::comm("allreduce", ErrorKind::BufferType))
    );
}
