//! Ring communication with persistent requests.
//!
//! Each rank passes a value to the next rank in a ring, reusing the same
//! send and receive requests for every lap.
//!
//! Run with: cargo run --example ring -- -np 4

use mprt::{DriverConfig, Endpoint, RecvBuffer, Request, Result, SendBuffer, Task};

const LAPS: usize = 3;

struct Ring;

impl Task for Ring {
    fn run<E: Endpoint>(&self, ep: &E) -> Result<()> {
        let rank = ep.rank();
        let size = ep.size();

        if size < 2 {
            eprintln!("This example requires at least 2 ranks (pass -np N)");
            return Ok(());
        }

        let next = (rank + 1) % size;
        let prev = (rank + size - 1) % size;

        let send_data = [rank as f64 * 100.0 + 1.0, rank as f64 * 100.0 + 2.0];
        let mut recv_data = [0.0f64; 2];
        mprt::scope(|s| -> Result<()> {
            let mut send = ep.init_send(s, SendBuffer::new(&send_data), next, 0)?;
            let mut recv = ep.init_recv(s, RecvBuffer::new(&mut recv_data), prev, 0)?;
            for lap in 0..LAPS {
                recv.start()?;
                send.start()?;
                let status = recv.wait()?;
                send.wait()?;
                status.check("recv")?;
                println!(
                    "Rank {rank}: lap {lap} received {} values from rank {} (tag={})",
                    status.size, status.source, status.tag
                );
            }
            Ok(())
        })?;

        let expected = [prev as f64 * 100.0 + 1.0, prev as f64 * 100.0 + 2.0];
        assert_eq!(recv_data, expected, "Data mismatch!");
        if rank == 0 {
            println!("\nRing communication test passed!");
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().collect();
    let config = DriverConfig::from_args(&mut args)?;
    mprt::run(&config, &Ring)
}
