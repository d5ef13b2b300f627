//! Worker loops
//!
//! A worker is one OS thread that blocks on a channel (or a [`Select`]) and runs
//! handlers to completion, one message at a time. Workers never own their
//! channels: the loop ends when the blocking receive reports that the channel
//! was closed from outside.
//!
//! [`Select`]: crate::select::Select

use crate::chain::Channel;
use crate::error::{ChainError, Result};
use std::thread::JoinHandle;

/// Receive from `channel` until it is closed, running `handler` for each message.
///
/// Returns the number of handled messages. A handler error stops the loop and
/// is returned unchanged.
pub fn receive_all<M, S, F>(channel: &Channel<M>, state: &mut S, mut handler: F) -> Result<u64>
where
    F: FnMut(&mut S, M) -> Result<()>,
{
    let mut handled = 0;
    loop {
        match channel.receive(None) {
            Ok(msg) => {
                handler(state, msg)?;
                handled += 1;
            }
            Err(e) if e.is_closed() => return Ok(handled),
            Err(e) => return Err(e),
        }
    }
}

/// How a worker thread ended
#[derive(Debug)]
pub enum WorkerExit {
    /// The loop saw its channel close
    Completed { handled: u64 },
    /// The loop returned an error other than closure
    Failed(ChainError),
    /// The thread panicked
    Panicked,
}

impl WorkerExit {
    /// Whether the worker stopped normally
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerExit::Completed { .. })
    }
}

/// A named worker thread
#[derive(Debug)]
pub struct Worker {
    name: String,
    handle: JoinHandle<Result<u64>>,
}

impl Worker {
    /// Spawn `body` on a new named thread.
    ///
    /// The body returns the number of messages it handled.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce() -> Result<u64> + Send + 'static,
    {
        let name = name.into();
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::info!("Worker '{}' started", thread_name);
                let result = body();
                match &result {
                    Ok(handled) => {
                        tracing::info!("Worker '{}' stopped after {} messages", thread_name, handled)
                    }
                    Err(e) => tracing::warn!("Worker '{}' stopped with error: {}", thread_name, e),
                }
                result
            })?;

        Ok(Self { name, handle })
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread and classify how it ended
    pub fn join(self) -> WorkerExit {
        match self.handle.join() {
            Ok(Ok(handled)) => WorkerExit::Completed { handled },
            Ok(Err(e)) if e.is_closed() => WorkerExit::Completed { handled: 0 },
            Ok(Err(e)) => WorkerExit::Failed(e),
            Err(_) => WorkerExit::Panicked,
        }
    }
}
