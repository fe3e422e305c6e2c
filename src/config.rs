//! Driver configuration.
//!
//! The number of rank threads is taken from, in order:
//!
//! | Source | Example |
//! |--------|---------|
//! | program arguments | `-np 4` |
//! | environment | `MPRT_NUM_THREADS=4` |
//! | default | `1` |
//!
//! One thread selects the single-participant backend; more select the
//! thread-per-rank backend.

use std::env;

use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable holding the number of rank threads.
pub const NUM_THREADS_ENV: &str = "MPRT_NUM_THREADS";

/// Argument flag holding the number of rank threads.
pub const NUM_THREADS_FLAG: &str = "-np";

/// Settings for [`run`](crate::run).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    threads: usize,
}

impl DriverConfig {
    /// Configuration with `threads` rank threads.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `threads` is zero or does not fit a rank.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 || threads > i32::MAX as usize {
            return Err(Error::Config(format!("invalid thread count: {threads}")));
        }
        Ok(DriverConfig { threads })
    }

    /// Read the thread count from [`NUM_THREADS_ENV`], defaulting to one.
    pub fn from_env() -> Result<Self> {
        match env::var(NUM_THREADS_ENV) {
            Ok(value) => parse_threads(&value),
            Err(_) => Ok(DriverConfig { threads: 1 }),
        }
    }

    /// Take a `-np <N>` pair out of `args`, falling back to
    /// [`from_env`](Self::from_env) when it is absent.
    ///
    /// The pair is removed so that the remaining arguments can be handed to
    /// the task unchanged.
    pub fn from_args(args: &mut Vec<String>) -> Result<Self> {
        let Some(pos) = args.iter().position(|a| a == NUM_THREADS_FLAG) else {
            return Self::from_env();
        };
        let Some(value) = args.get(pos + 1).cloned() else {
            return Err(Error::Config(format!("missing value after {NUM_THREADS_FLAG}")));
        };
        let config = parse_threads(&value)?;
        args.drain(pos..=pos + 1);
        debug!(threads = config.threads, "thread count taken from arguments");
        Ok(config)
    }

    /// Number of rank threads.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig { threads: 1 }
    }
}

fn parse_threads(value: &str) -> Result<DriverConfig> {
    let threads = value
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Config(format!("invalid thread count: {value:?}")))?;
    DriverConfig::new(threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_rejects_zero() {
        assert!(matches!(DriverConfig::new(0), Err(Error::Config(_))));
        assert_eq!(DriverConfig::new(3).unwrap().threads(), 3);
        assert_eq!(DriverConfig::default().threads(), 1);
    }

    /// Everything that reads or writes the environment lives in one test so
    /// that parallel tests never race on it.
    #[test]
    fn thread_count_sources() {
        env::remove_var(NUM_THREADS_ENV);
        assert_eq!(DriverConfig::from_env().unwrap().threads(), 1);

        let mut argv = args(&["prog", "-np", "4", "input.txt"]);
        assert_eq!(DriverConfig::from_args(&mut argv).unwrap().threads(), 4);
        assert_eq!(argv, args(&["prog", "input.txt"]));

        env::set_var(NUM_THREADS_ENV, "6");
        let mut argv = args(&["prog"]);
        assert_eq!(DriverConfig::from_args(&mut argv).unwrap().threads(), 6);

        // Arguments take priority over the environment.
        let mut argv = args(&["-np", "2"]);
        assert_eq!(DriverConfig::from_args(&mut argv).unwrap().threads(), 2);
        assert!(argv.is_empty());

        env::set_var(NUM_THREADS_ENV, "many");
        assert!(matches!(DriverConfig::from_env(), Err(Error::Config(_))));
        env::set_var(NUM_THREADS_ENV, "0");
        assert!(matches!(DriverConfig::from_env(), Err(Error::Config(_))));
        env::remove_var(NUM_THREADS_ENV);

        let mut argv = args(&["prog", "-np"]);
        assert!(matches!(DriverConfig::from_args(&mut argv), Err(Error::Config(_))));
        assert_eq!(argv.len(), 2);
    }
}
