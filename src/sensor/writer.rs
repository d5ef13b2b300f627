//! File writer worker
//!
//! Simulates persisting each reading with a blocking pause drawn uniformly
//! from the configured range.

use super::messages::WriterCommand;
use crate::chain::Channel;
use crate::config::WriterConfig;
use crate::error::Result;
use crate::worker::receive_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// State of the file-write worker loop
#[derive(Debug)]
pub struct FileWriter {
    rng: StdRng,
    min_pause_ms: u64,
    max_pause_ms: u64,
    written: u64,
}

impl FileWriter {
    pub fn new(config: &WriterConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic pauses, for tests
    pub fn with_seed(config: &WriterConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &WriterConfig, rng: StdRng) -> Self {
        Self {
            rng,
            min_pause_ms: config.min_pause_ms,
            max_pause_ms: config.max_pause_ms.max(config.min_pause_ms),
            written: 0,
        }
    }

    /// Files written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    fn next_pause(&mut self) -> Duration {
        Duration::from_millis(self.rng.random_range(self.min_pause_ms..=self.max_pause_ms))
    }

    /// Handle one command
    pub fn write(&mut self, cmd: WriterCommand) -> Result<()> {
        let pause = self.next_pause();
        tracing::info!(
            "{}: write started (pause:{}ms)",
            cmd.file_name(),
            pause.as_millis()
        );
        std::thread::sleep(pause);
        tracing::info!("{}: write finished", cmd.file_name());
        self.written += 1;
        Ok(())
    }

    /// Write every command until `commands` is closed
    pub fn run(&mut self, commands: &Channel<WriterCommand>) -> Result<u64> {
        receive_all(commands, self, |writer, cmd| writer.write(cmd))
    }
}
