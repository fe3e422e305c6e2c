//! Monte Carlo estimation of π.
//!
//! Every rank samples points in the unit square and counts those inside the
//! quarter circle; an allreduce sums the counts.
//!
//! Run with: cargo run --release --example pi_monte_carlo -- -np 4

use std::time::Instant;

use mprt::{DriverConfig, Endpoint, RecvBuffer, ReduceOp, Result, SendBuffer, Task};
use rand::Rng;

const TOTAL_SAMPLES: u64 = 10_000_000;

struct Pi;

impl Task for Pi {
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
        let rank = ep.rank();
        let size = ep.size();
        let samples = TOTAL_SAMPLES / size as u64;

        let start = Instant::now();
        let mut rng = rand::thread_rng();
        let mut inside: u64 = 0;
        for _ in 0..samples {
            let x: f64 = rng.gen();
            let y: f64 = rng.gen();
            if x * x + y * y <= 1.0 {
                inside += 1;
            }
        }

        let mut total = [0u64];
        ep.allreduce(SendBuffer::new(&[inside]), RecvBuffer::new(&mut total), ReduceOp::Sum)?;

        let elapsed = [start.elapsed().as_secs_f64()];
        let mut max_time = [0.0f64];
        ep.reduce(SendBuffer::new(&elapsed), RecvBuffer::new(&mut max_time), 0, ReduceOp::Max)?;

        let pi = 4.0 * total[0] as f64 / (samples * size as u64) as f64;
        if rank == 0 {
            let error = (pi - std::f64::consts::PI).abs();
            println!("Ranks:       {size}");
            println!("Samples:     {}", samples * size as u64);
            println!("Estimated π: {pi:.10}");
            println!("Error:       {error:.10}");
            println!("Max time:    {:.4}s", max_time[0]);
        }
        assert!((pi - std::f64::consts::PI).abs() < 0.01, "Pi estimate {pi} is too far off");
        Ok(())
    }
}

fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().collect();
    let config = DriverConfig::from_args(&mut args)?;
    mprt::run(&config, &Pi)
}
